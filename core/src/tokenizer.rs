use crate::Token;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^a-z0-9 ]").expect("valid regex");
    static ref ENGLISH: EnglishStemmer = EnglishStemmer::default();
}

/// Word stemming capability. Must be pure and total: input it cannot stem comes
/// back unchanged.
pub trait TokenStemmer: Send + Sync {
    fn stem(&self, word: &str) -> String;
}

/// Snowball English stemmer.
pub struct EnglishStemmer(Stemmer);

impl Default for EnglishStemmer {
    fn default() -> Self { Self(Stemmer::create(Algorithm::English)) }
}

impl TokenStemmer for EnglishStemmer {
    fn stem(&self, word: &str) -> String { self.0.stem(word).into_owned() }
}

/// NFKC, lowercase, then everything outside `[a-z0-9 ]` becomes a space.
pub fn normalize(text: &str) -> String {
    let lowered = text.nfkc().collect::<String>().to_lowercase();
    NON_WORD.replace_all(&lowered, " ").into_owned()
}

/// Distinct stemmed tokens of `text`, in first-occurrence order.
pub fn tokenize_with(text: &str, stemmer: &dyn TokenStemmer) -> Vec<Token> {
    let normalized = normalize(text);
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for word in normalized.split_whitespace() {
        if word.len() <= 1 { continue; }
        let stem = stemmer.stem(word);
        if seen.insert(stem.clone()) {
            tokens.push(Token::new(stem));
        }
    }
    tokens
}

/// [`tokenize_with`] using the shared English stemmer.
pub fn tokenize(text: &str) -> Vec<Token> {
    tokenize_with(text, &*ENGLISH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apostrophes_split_and_leave_single_letters_behind() {
        // "o'clock" -> "o clock", "don't" -> "don t"; the lone letters go
        let words: Vec<String> = tokenize("o'clock don't x-ray").into_iter().map(|t| t.to_string()).collect();
        assert_eq!(words, vec!["clock", "don", "ray"]);
    }

    #[test]
    fn strips_punctuation_into_separators() {
        assert_eq!(normalize("Hello, World!\tok"), "hello  world  ok");
    }

    struct Identity;
    impl TokenStemmer for Identity {
        fn stem(&self, word: &str) -> String { word.to_string() }
    }

    #[test]
    fn custom_stemmer_is_used() {
        let t = tokenize_with("Running running RUNNING", &Identity);
        assert_eq!(t, vec![Token::from("running")]);
    }
}
