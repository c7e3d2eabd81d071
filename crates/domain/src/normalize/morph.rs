//! Dictionary lemmatization through the OpenCorpora morphological analyzer

use std::sync::LazyLock;

use rsmorphy::prelude::*;

use super::lexicon::{Lemmatizer, settle};

static ANALYZER: LazyLock<MorphAnalyzer> =
    LazyLock::new(|| MorphAnalyzer::from_file(rsmorphy_dict_ru::DICT_PATH));

/// Russian lemmatizer backed by the bundled OpenCorpora dictionary
///
/// Takes the normal form of the most probable parse. Words the dictionary
/// cannot parse are their own lemma. The dictionary is loaded once per
/// process on first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct MorphLemmatizer;

impl MorphLemmatizer {
    pub fn new() -> Self {
        Self
    }

    /// Load the dictionary now rather than on the first post
    pub fn warm_up(&self) {
        LazyLock::force(&ANALYZER);
    }
}

impl Lemmatizer for MorphLemmatizer {
    fn lemmatize(&self, word: &str) -> String {
        settle(word, normal_form)
    }
}

fn normal_form(word: &str) -> String {
    let analyzer = &*ANALYZER;
    analyzer
        .parse(word)
        .first()
        .map(|parsed| parsed.lex.get_normal_form(analyzer).to_lowercase())
        .filter(|lemma| !lemma.is_empty())
        .unwrap_or_else(|| word.to_string())
}
