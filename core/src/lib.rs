pub mod dictionary;
pub mod flat;
pub mod index;
pub mod persist;
pub mod postings;
pub mod reader;
pub mod tokenizer;
pub mod trie;

use std::fmt;
use url::Url;

pub use dictionary::DocIdDictionary;
pub use index::InvertedIndex;

pub type DocId = u32;

/// A normalized absolute http(s) URL. Fragments are stripped so `page#a` and
/// `page#b` collapse to the same address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let url = Url::parse(s.trim()).map_err(|e| AddressError::Parse(s.to_string(), e))?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> Result<Self, AddressError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AddressError::Scheme(url.to_string()));
        }
        let mut u = url.clone();
        u.set_fragment(None);
        Ok(Self(u.into()))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    pub fn to_url(&self) -> Option<Url> { Url::parse(&self.0).ok() }

    pub fn host(&self) -> Option<String> {
        self.to_url()?.host_str().map(str::to_string)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("invalid url {0:?}: {1}")]
    Parse(String, url::ParseError),
    #[error("unsupported scheme in {0}")]
    Scheme(String),
}

/// A normalized, stemmed word. Ordering is byte-wise, which is what every
/// dictionary view and the trie sort by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(String);

impl Token {
    pub fn new(s: impl Into<String>) -> Self { Self(s.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn as_bytes(&self) -> &[u8] { self.0.as_bytes() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_drops_fragment() {
        let a = Address::parse("http://localhost:8080/page1.html#top").unwrap();
        let b = Address::parse("http://localhost:8080/page1.html").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "http://localhost:8080/page1.html");
    }

    #[test]
    fn address_rejects_non_http() {
        assert!(matches!(Address::parse("mailto:a@b.c"), Err(AddressError::Scheme(_))));
        assert!(Address::parse("not a url").is_err());
    }

    #[test]
    fn tokens_order_by_bytes() {
        let mut v = vec![Token::from("b"), Token::from("ab"), Token::from("a")];
        v.sort();
        assert_eq!(v, vec![Token::from("a"), Token::from("ab"), Token::from("b")]);
    }
}
