//! Normalize command - one-shot text normalization

use anyhow::{Context, Result};
use news_digest_domain::normalize::{
    Lemmatizer, LexiconLemmatizer, MorphLemmatizer, Normalizer, NormalizerConfig,
    OverlayLemmatizer,
};
use serde::Serialize;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use crate::args::NormalizeArgs;
use crate::config::AppConfig;

#[derive(Debug, Serialize)]
struct NormalizeOutput<'a> {
    cleaned: &'a str,
    normalized: &'a str,
    empty: bool,
}

pub async fn execute(args: NormalizeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).unwrap_or_default();

    let text = get_input_text(&args)?;
    let normalizer = build_normalizer(&config)?;

    tracing::debug!(text_length = text.len(), "Normalizing text");

    let cleaned = normalizer.clean(&text);
    let item = normalizer.normalize(&text);

    if args.json {
        let output = NormalizeOutput {
            cleaned: &cleaned,
            normalized: &item.text,
            empty: item.is_empty(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if item.is_empty() {
        println!("(nothing left to deliver)");
    } else {
        println!("{}", item.text);
    }

    Ok(())
}

/// Normalizer from config: Russian dictionary under the optional TSV overlay
pub(crate) fn build_normalizer(config: &AppConfig) -> Result<Normalizer> {
    let morph = MorphLemmatizer::new();
    morph.warm_up();

    let lemmatizer: Arc<dyn Lemmatizer> = match config.normalizer.lexicon_path {
        Some(ref path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read lexicon: {}", path.display()))?;
            let overlay = LexiconLemmatizer::from_tsv(&content)
                .with_context(|| format!("Invalid lexicon: {}", path.display()))?;
            tracing::debug!(path = %path.display(), entries = overlay.len(), "Loaded lexicon overlay");
            Arc::new(OverlayLemmatizer::new(overlay, Arc::new(morph)))
        }
        None => Arc::new(morph),
    };

    let normalizer_config = NormalizerConfig {
        ad_markers: config.normalizer.ad_markers.clone(),
        extra_stopwords: config.normalizer.extra_stopwords.clone(),
    };

    Normalizer::new(normalizer_config, lemmatizer).context("Failed to build normalizer")
}

fn get_input_text(args: &NormalizeArgs) -> Result<String> {
    if let Some(ref text) = args.text {
        return Ok(text.clone());
    }

    if let Some(ref path) = args.file {
        if path.as_os_str() == "-" {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read from stdin")?;
            return Ok(text);
        }

        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()));
    }

    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("Failed to read from stdin")?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_normalizer_applies_lexicon_overlay() {
        let dir = TempDir::new().unwrap();
        let lexicon_path = dir.path().join("extra.tsv");
        fs::write(&lexicon_path, "# abbreviations\nцб\tцентробанк\n").unwrap();

        let mut config = AppConfig::default();
        config.normalizer.lexicon_path = Some(lexicon_path);

        let normalizer = build_normalizer(&config).unwrap();
        assert_eq!(
            normalizer.normalize("Решения ЦБ на биржах").text,
            "решение центробанк биржа"
        );
    }

    #[test]
    fn test_build_normalizer_rejects_malformed_lexicon() {
        let dir = TempDir::new().unwrap();
        let lexicon_path = dir.path().join("broken.tsv");
        fs::write(&lexicon_path, "цб центробанк\n").unwrap();

        let mut config = AppConfig::default();
        config.normalizer.lexicon_path = Some(lexicon_path);

        let error = build_normalizer(&config).err().unwrap();
        assert!(format!("{:#}", error).contains("Line 1"));
    }

    #[test]
    fn test_build_normalizer_reports_missing_lexicon() {
        let mut config = AppConfig::default();
        config.normalizer.lexicon_path = Some(PathBuf::from("/nonexistent/lexicon.tsv"));

        let error = build_normalizer(&config).err().unwrap();
        assert!(error.to_string().contains("Failed to read lexicon"));
    }

    #[test]
    fn test_build_normalizer_uses_configured_markers() {
        let mut config = AppConfig::default();
        config.normalizer.ad_markers = vec!["партнёр".to_string()];

        let normalizer = build_normalizer(&config).unwrap();
        assert!(normalizer.normalize("Партнёр: скидки").is_empty());
    }
}
