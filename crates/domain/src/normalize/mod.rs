//! Text normalization pipeline
//!
//! Turns raw post text into space-joined lemmas, or into an empty item when
//! nothing deliverable remains:
//!
//! 1. strip URLs, mentions and hashtags (whole tokens)
//! 2. drop everything from an advertisement marker to the end of the text
//! 3. tokenize, keep alphanumeric non-stopword tokens
//! 4. reduce each token to its lemma

mod lexicon;
mod morph;
pub mod stopwords;

pub use lexicon::{Lemmatizer, LexiconError, LexiconLemmatizer, OverlayLemmatizer};
pub use morph::MorphLemmatizer;

use crate::model::NormalizedItem;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

static URL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(^|\s)(?:[a-z][a-z0-9+.\-]*://|www\.|t\.me/)\S*").expect("valid regex")
});

static MENTION_OR_HASHTAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s)[@#]\w+").expect("valid regex"));

static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+)*|[^\s\p{L}\p{N}]").expect("valid regex")
});

/// Configuration for the normalizer
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Keywords that open an advertisement block when they start a line
    pub ad_markers: Vec<String>,
    /// Stopwords added on top of the built-in list
    pub extra_stopwords: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            ad_markers: vec!["реклама".to_string()],
            extra_stopwords: vec![],
        }
    }
}

/// Error building a normalizer
#[derive(Debug, thiserror::Error)]
pub enum NormalizerError {
    #[error("Invalid advertisement marker pattern: {0}")]
    InvalidMarker(String),
}

/// Pure text normalizer; cheap to share behind an `Arc`
pub struct Normalizer {
    ad_block: Option<Regex>,
    stopwords: HashSet<String>,
    lemmatizer: Arc<dyn Lemmatizer>,
}

impl Normalizer {
    pub fn new(
        config: NormalizerConfig,
        lemmatizer: Arc<dyn Lemmatizer>,
    ) -> Result<Self, NormalizerError> {
        let markers: Vec<String> = config
            .ad_markers
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(regex::escape)
            .collect();

        let ad_block = if markers.is_empty() {
            None
        } else {
            let pattern = format!(r"(?ims)^[ \t]*(?:{})[ \t]*:.*", markers.join("|"));
            Some(Regex::new(&pattern).map_err(|e| NormalizerError::InvalidMarker(e.to_string()))?)
        };

        let stopwords = stopwords::RUSSIAN
            .iter()
            .map(|w| w.to_string())
            .chain(config.extra_stopwords.iter().map(|w| w.trim().to_lowercase()))
            .filter(|w| !w.is_empty())
            .collect();

        Ok(Self {
            ad_block,
            stopwords,
            lemmatizer,
        })
    }

    /// Normalizer with default config and the Russian dictionary
    pub fn russian() -> Self {
        Self {
            ad_block: Regex::new(r"(?ims)^[ \t]*(?:реклама)[ \t]*:.*").ok(),
            stopwords: stopwords::RUSSIAN.iter().map(|w| w.to_string()).collect(),
            lemmatizer: Arc::new(MorphLemmatizer::new()),
        }
    }

    /// Cleaning stage: URLs, mentions, hashtags and ad blocks removed, trimmed
    pub fn clean(&self, raw: &str) -> String {
        let text = URL_TOKEN.replace_all(raw, "${1}");
        let text = MENTION_OR_HASHTAG.replace_all(&text, "${1}");
        let text = match &self.ad_block {
            Some(ad_block) => ad_block.replace(&text, "").into_owned(),
            None => text.into_owned(),
        };
        text.trim().to_string()
    }

    /// Full pipeline; an empty result means the post carries nothing deliverable
    pub fn normalize(&self, raw: &str) -> NormalizedItem {
        let cleaned = self.clean(raw);

        let lemmas: Vec<String> = tokenize(&cleaned)
            .filter(|token| is_alphanumeric(token))
            .map(str::to_lowercase)
            .filter(|token| !self.is_stopword(token))
            .map(|token| self.lemmatizer.lemmatize(&token))
            // A lemma can itself be a stopword; dropping it keeps the pipeline idempotent
            .filter(|lemma| is_alphanumeric(lemma) && !self.is_stopword(lemma))
            .collect();

        NormalizedItem::new(lemmas.join(" "))
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::russian()
    }
}

/// Split text into words and standalone punctuation marks
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    WORD.find_iter(text).map(|m| m.as_str())
}

fn is_alphanumeric(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_strips_ad_block() {
        let normalizer = Normalizer::russian();
        assert_eq!(
            normalizer.clean("Hello world\nРеклама: buy now"),
            "Hello world"
        );
    }

    #[test]
    fn test_clean_ad_marker_is_case_insensitive_and_runs_to_end() {
        let normalizer = Normalizer::russian();
        let cleaned = normalizer.clean("Главное за день\nРЕКЛАМА: скидки\nещё строка\nи ещё");
        assert_eq!(cleaned, "Главное за день");
    }

    #[test]
    fn test_clean_ignores_marker_mid_line() {
        let normalizer = Normalizer::russian();
        let cleaned = normalizer.clean("Рынок рекламы: итоги года");
        assert_eq!(cleaned, "Рынок рекламы: итоги года");
    }

    #[test]
    fn test_clean_strips_urls_mentions_hashtags() {
        let normalizer = Normalizer::russian();
        let cleaned = normalizer.clean("Check http://x.co @bob #news today");

        assert!(cleaned.starts_with("Check"));
        assert!(cleaned.ends_with("today"));
        assert_eq!(
            cleaned.split_whitespace().collect::<Vec<_>>(),
            vec!["Check", "today"]
        );
    }

    #[test]
    fn test_clean_keeps_embedded_at_signs() {
        let normalizer = Normalizer::russian();
        assert_eq!(normalizer.clean("mail me at a@b"), "mail me at a@b");
    }

    #[test]
    fn test_tokenize_splits_punctuation() {
        let tokens: Vec<_> = tokenize("Привет, мир! Из-за дождя.").collect();
        assert_eq!(tokens, vec!["Привет", ",", "мир", "!", "Из-за", "дождя", "."]);
    }

    #[test]
    fn test_normalize_lemmatizes_and_drops_stopwords() {
        let normalizer = Normalizer::russian();
        let item = normalizer.normalize("Президента России заявили о новых ценах на рынке!");
        assert_eq!(item.text, "президент россия заявить новый цена рынок");
    }

    #[test]
    fn test_normalize_empty_when_nothing_left() {
        let normalizer = Normalizer::russian();
        assert!(normalizer.normalize("").is_empty());
        assert!(normalizer.normalize("https://t.me/x @someone #tag").is_empty());
        assert!(normalizer.normalize("и в на, что?!").is_empty());
        assert!(normalizer.normalize("Реклама: всё по 100").is_empty());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = Normalizer::russian();
        for raw in [
            "Президента России заявили о новых ценах на рынке!",
            "Hello world\nРеклама: buy now",
            "Check http://x.co @bob #news today",
            "Курс доллара вырос на 2% за неделю, сообщили власти города",
        ] {
            let once = normalizer.normalize(raw);
            let twice = normalizer.normalize(&once.text);
            assert_eq!(once, twice, "input: {raw}");
        }
    }

    #[test]
    fn test_lemma_that_is_stopword_is_dropped() {
        let lexicon = LexiconLemmatizer::from_tsv("бывшая\tбыть\n").unwrap();
        let normalizer =
            Normalizer::new(NormalizerConfig::default(), Arc::new(lexicon)).unwrap();

        let once = normalizer.normalize("бывшая столица");
        assert_eq!(once.text, "столица");
        assert_eq!(normalizer.normalize(&once.text), once);
    }

    #[test]
    fn test_custom_markers_and_stopwords() {
        let config = NormalizerConfig {
            ad_markers: vec!["Sponsored".to_string(), "#партнёр".to_string()],
            extra_stopwords: vec!["Today".to_string()],
        };
        let normalizer = Normalizer::new(config, Arc::new(LexiconLemmatizer::new())).unwrap();

        assert_eq!(normalizer.clean("Big news\nsponsored: buy"), "Big news");
        assert_eq!(normalizer.normalize("Big news today").text, "big news");
    }

    #[test]
    fn test_no_markers_disables_ad_stripping() {
        let config = NormalizerConfig {
            ad_markers: vec![],
            extra_stopwords: vec![],
        };
        let normalizer = Normalizer::new(config, Arc::new(LexiconLemmatizer::new())).unwrap();
        assert_eq!(normalizer.clean("a\nРеклама: b"), "a\nРеклама: b");
    }
}
