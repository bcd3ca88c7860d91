//! Text tokenization (C1).
//!
//! Both indexing and querying run text through the same tokenizer, so BM25
//! term statistics stay self-consistent regardless of which variant is
//! active. The tokenizer is a capability (a trait), not a fixed type: a
//! caller may supply any implementation in place of the default.

use std::fmt;

/// `tokenize` must be deterministic and side-effect-free: the same input
/// yields the same token sequence every time within a process, and the
/// output never contains empty tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

#[derive(Debug)]
pub enum TokenizerError {
    Unavailable(String),
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizerError::Unavailable(msg) => write!(f, "tokenizer unavailable: {msg}"),
        }
    }
}

impl std::error::Error for TokenizerError {}

/// Lowercase whitespace split. Always constructible; never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|s| s.to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Mixed Latin + CJK morphological tokenizer, backed by `lindera` with the
/// IPADIC dictionary. Splits CJK runs at morpheme boundaries and Latin runs
/// at whitespace, so `"chromadbconfirm確認"` yields independent tokens for
/// the Latin and CJK substrings.
#[cfg(feature = "morphological-tokenizer")]
pub struct MorphologicalTokenizer {
    inner: lindera::tokenizer::Tokenizer,
}

#[cfg(feature = "morphological-tokenizer")]
impl MorphologicalTokenizer {
    pub fn new() -> Result<Self, TokenizerError> {
        use lindera::dictionary::{DictionaryConfig, DictionaryKind};
        use lindera::mode::Mode;
        use lindera::tokenizer::{Tokenizer as LinderaTokenizer, TokenizerConfig};

        let dictionary = DictionaryConfig {
            kind: Some(DictionaryKind::IPADIC),
            path: None,
        };
        let config = TokenizerConfig {
            dictionary,
            user_dictionary: None,
            mode: Mode::Normal,
        };
        let inner = LinderaTokenizer::from_config(config)
            .map_err(|e| TokenizerError::Unavailable(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[cfg(feature = "morphological-tokenizer")]
impl Tokenizer for MorphologicalTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let Ok(tokens) = self.inner.tokenize(text) else {
            return Vec::new();
        };
        tokens
            .into_iter()
            .map(|t| t.text.to_string())
            .filter(|s| !s.trim().is_empty())
            .collect()
    }
}

/// Construct the default morphological tokenizer, or fail with
/// `TokenizerUnavailable` when the backend cannot initialize and no custom
/// tokenizer has been supplied. Unlike `WhitespaceTokenizer`, this is never
/// guaranteed to succeed, and is never silently substituted — callers that
/// want a fallback must construct `WhitespaceTokenizer` explicitly.
pub fn default_tokenizer() -> Result<Box<dyn Tokenizer>, TokenizerError> {
    #[cfg(feature = "morphological-tokenizer")]
    {
        MorphologicalTokenizer::new().map(|t| Box::new(t) as Box<dyn Tokenizer>)
    }
    #[cfg(not(feature = "morphological-tokenizer"))]
    {
        Err(TokenizerError::Unavailable(
            "morphological tokenizer backend not compiled in".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_tokenizer_lowercases_and_splits() {
        let t = WhitespaceTokenizer;
        let tokens = t.tokenize("Hello   World");
        assert_eq!(tokens, vec!["hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn whitespace_tokenizer_never_empty_tokens() {
        let t = WhitespaceTokenizer;
        assert!(t.tokenize("   \t\n  ").is_empty());
    }

    #[cfg(feature = "morphological-tokenizer")]
    #[test]
    fn morphological_tokenizer_splits_mixed_script() {
        let t = MorphologicalTokenizer::new().expect("lindera backend available in test build");
        let tokens = t.tokenize("chromadbconfirm確認");
        assert!(tokens.len() >= 2);
        assert!(tokens
            .iter()
            .any(|tok| tok.to_lowercase().contains("chromadbconfirm") || tok.to_lowercase().contains("chromadb")));
        assert!(tokens.iter().any(|tok| tok.contains('確') || tok.contains("確認")));
    }

    #[cfg(feature = "morphological-tokenizer")]
    #[test]
    fn morphological_tokenizer_mixed_script_scenario_8() {
        let t = MorphologicalTokenizer::new().expect("lindera backend available in test build");
        let tokens = t.tokenize("chromadb確認");
        assert!(tokens.len() >= 2);
        assert!(tokens.iter().any(|tok| tok.to_lowercase().contains("chromadb")));
        assert!(tokens.iter().any(|tok| tok.contains("確認")));
    }
}
