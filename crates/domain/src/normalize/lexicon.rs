//! Table-driven lemmatization and overlays

use std::collections::HashMap;
use std::sync::Arc;

/// Longest rewrite chain followed before giving up
const MAX_STEPS: usize = 16;

/// Reduces a word to its dictionary base form
pub trait Lemmatizer: Send + Sync {
    /// `word` is already lowercase; the result must be lowercase too
    fn lemmatize(&self, word: &str) -> String;
}

/// Error from parsing a lexicon
#[derive(Debug, thiserror::Error)]
pub enum LexiconError {
    #[error("Line {line}: expected `form<TAB>lemma`, got {content:?}")]
    Malformed { line: usize, content: String },
}

/// Lemmatizer backed by a form → lemma table
///
/// Unknown words fall back to themselves. Every lemma is also registered as
/// its own form, and chains left behind by later merges are collapsed, so
/// lemmatizing a lemma is a no-op.
#[derive(Debug, Clone, Default)]
pub struct LexiconLemmatizer {
    forms: HashMap<String, String>,
}

impl LexiconLemmatizer {
    /// Empty lexicon: every word is its own lemma
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `form<TAB>lemma` table (blank lines and `#` comments ignored)
    pub fn from_tsv(content: &str) -> Result<Self, LexiconError> {
        let mut lexicon = Self::new();
        lexicon.extend_from_tsv(content)?;
        Ok(lexicon)
    }

    /// Merge another table into this one; later entries win
    pub fn extend_from_tsv(&mut self, content: &str) -> Result<usize, LexiconError> {
        let mut pairs = Vec::new();

        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split('\t').map(str::trim);
            let (Some(form), Some(lemma), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(LexiconError::Malformed {
                    line: index + 1,
                    content: raw_line.to_string(),
                });
            };

            let form = form.to_lowercase();
            let lemma = lemma.to_lowercase();
            if form.is_empty() || !is_word(&lemma) {
                return Err(LexiconError::Malformed {
                    line: index + 1,
                    content: raw_line.to_string(),
                });
            }
            pairs.push((form, lemma));
        }

        let added = pairs.len();
        for (form, lemma) in &pairs {
            self.forms.insert(form.clone(), lemma.clone());
        }
        // Lemmas override any form entry that spells the same word
        for (_, lemma) in pairs {
            self.forms.insert(lemma.clone(), lemma);
        }
        self.resolve_chains();

        Ok(added)
    }

    /// Lemma for a known form
    pub fn lookup(&self, word: &str) -> Option<&str> {
        self.forms.get(word).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }

    /// Point every form straight at the end of its chain
    fn resolve_chains(&mut self) {
        let resolved: HashMap<String, String> = self
            .forms
            .keys()
            .map(|form| {
                let lemma = settle(form, |word| {
                    self.lookup(word).unwrap_or(word).to_string()
                });
                (form.clone(), lemma)
            })
            .collect();
        self.forms = resolved;
    }
}

impl Lemmatizer for LexiconLemmatizer {
    fn lemmatize(&self, word: &str) -> String {
        self.lookup(word).unwrap_or(word).to_string()
    }
}

/// A lexicon consulted before another lemmatizer
///
/// Overlay entries win. Words the overlay does not know go to `base`, and the
/// two are applied alternately until the word stops changing.
pub struct OverlayLemmatizer {
    overlay: LexiconLemmatizer,
    base: Arc<dyn Lemmatizer>,
}

impl OverlayLemmatizer {
    pub fn new(overlay: LexiconLemmatizer, base: Arc<dyn Lemmatizer>) -> Self {
        Self { overlay, base }
    }
}

impl Lemmatizer for OverlayLemmatizer {
    fn lemmatize(&self, word: &str) -> String {
        settle(word, |word| match self.overlay.lookup(word) {
            Some(lemma) => lemma.to_string(),
            None => self.base.lemmatize(word),
        })
    }
}

/// Apply `step` until the word stops changing
///
/// A cycle settles on its smallest member, so the result is itself stable.
pub(crate) fn settle(word: &str, step: impl Fn(&str) -> String) -> String {
    let mut seen: Vec<String> = Vec::new();
    let mut current = word.to_string();

    for _ in 0..MAX_STEPS {
        let next = step(&current);
        if next == current {
            return current;
        }
        if let Some(start) = seen.iter().position(|w| *w == next) {
            let smallest = seen[start..].iter().chain([&current]).min().cloned();
            return smallest.unwrap_or(current);
        }
        seen.push(std::mem::replace(&mut current, next));
    }

    tracing::debug!(word, lemma = %current, "Lemma chain did not settle");
    current
}

fn is_word(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rewrites words through a fixed map, one hop per call
    struct OneHop(HashMap<&'static str, &'static str>);

    impl Lemmatizer for OneHop {
        fn lemmatize(&self, word: &str) -> String {
            self.0.get(word).copied().unwrap_or(word).to_string()
        }
    }

    #[test]
    fn test_unknown_word_is_its_own_lemma() {
        let lexicon = LexiconLemmatizer::from_tsv("новости\tновость\n").unwrap();
        assert_eq!(lexicon.lemmatize("квазар"), "квазар");
    }

    #[test]
    fn test_lemmas_are_fixed_points() {
        let lexicon = LexiconLemmatizer::from_tsv("стали\tстать\nсталь\tсталь\nстать\tстать\n")
            .unwrap();
        let lemma = lexicon.lemmatize("стали");
        assert_eq!(lexicon.lemmatize(&lemma), lemma);
    }

    #[test]
    fn test_lemma_entry_overrides_conflicting_form() {
        // "мир" is both a lemma and (here) a form of something else
        let lexicon = LexiconLemmatizer::from_tsv("мира\tмир\nмир\tмирный\n").unwrap();
        assert_eq!(lexicon.lemmatize("мир"), "мир");
        assert_eq!(lexicon.lemmatize("мирный"), "мирный");
    }

    #[test]
    fn test_malformed_line_is_reported() {
        let err = LexiconLemmatizer::from_tsv("# header\nгода год\n").unwrap_err();
        assert!(matches!(err, LexiconError::Malformed { line: 2, .. }));

        let err = LexiconLemmatizer::from_tsv("из-за\tиз-за\n").unwrap_err();
        assert!(matches!(err, LexiconError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_extend_merges_entries() {
        let mut lexicon = LexiconLemmatizer::from_tsv("года\tгод\n").unwrap();
        let added = lexicon.extend_from_tsv("котиков\tкотик\n").unwrap();
        assert_eq!(added, 1);
        assert_eq!(lexicon.lemmatize("котиков"), "котик");
        assert_eq!(lexicon.lemmatize("года"), "год");
    }

    #[test]
    fn test_later_merge_collapses_chains() {
        let mut lexicon = LexiconLemmatizer::from_tsv("новости\tновость\n").unwrap();
        lexicon.extend_from_tsv("новость\tновинка\n").unwrap();

        assert_eq!(lexicon.lemmatize("новости"), "новинка");
        assert_eq!(lexicon.lemmatize("новость"), "новинка");
        for form in ["новости", "новость", "новинка"] {
            let lemma = lexicon.lemmatize(form);
            assert_eq!(lexicon.lemmatize(&lemma), lemma, "form: {form}");
        }
    }

    #[test]
    fn test_overlay_wins_over_base() {
        let base = OneHop(HashMap::from([("цб", "цбр"), ("новости", "новость")]));
        let overlay = LexiconLemmatizer::from_tsv("цб\tцентробанк\n").unwrap();
        let lemmatizer = OverlayLemmatizer::new(overlay, Arc::new(base));

        assert_eq!(lemmatizer.lemmatize("цб"), "центробанк");
        assert_eq!(lemmatizer.lemmatize("новости"), "новость");
    }

    #[test]
    fn test_overlay_applies_to_base_lemmas() {
        let base = OneHop(HashMap::from([("новости", "новость")]));
        let overlay = LexiconLemmatizer::from_tsv("новость\tновинка\n").unwrap();
        let lemmatizer = OverlayLemmatizer::new(overlay, Arc::new(base));

        let lemma = lemmatizer.lemmatize("новости");
        assert_eq!(lemma, "новинка");
        assert_eq!(lemmatizer.lemmatize(&lemma), lemma);
    }

    #[test]
    fn test_cycle_settles_on_smallest_member() {
        let base = OneHop(HashMap::from([("б", "в"), ("в", "а"), ("а", "б")]));
        let lemmatizer = OverlayLemmatizer::new(LexiconLemmatizer::new(), Arc::new(base));

        for word in ["а", "б", "в"] {
            assert_eq!(lemmatizer.lemmatize(word), "а", "word: {word}");
        }
    }
}
