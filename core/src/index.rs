use crate::{DocId, Token};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Token -> set of documents containing it. Safe for concurrent inserts from
/// the process workers; read once by a writer after the crawl settles.
#[derive(Default)]
pub struct InvertedIndex {
    postings: RwLock<HashMap<Token, HashSet<DocId>>>,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    /// Records `doc_id` under every token, taking the lock once.
    pub fn add_document<'a>(&self, doc_id: DocId, tokens: impl IntoIterator<Item = &'a Token>) {
        let mut postings = self.postings.write();
        for token in tokens {
            match postings.get_mut(token) {
                Some(set) => { set.insert(doc_id); }
                None => { postings.insert(token.clone(), HashSet::from([doc_id])); }
            }
        }
    }

    pub fn add(&self, token: Token, doc_id: DocId) {
        self.postings.write().entry(token).or_default().insert(doc_id);
    }

    /// Sorted doc ids for `token`.
    pub fn postings(&self, token: &str) -> Option<Vec<DocId>> {
        let postings = self.postings.read();
        let set = postings.get(&Token::from(token))?;
        let mut ids: Vec<DocId> = set.iter().copied().collect();
        ids.sort_unstable();
        Some(ids)
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.postings.read().contains_key(&Token::from(token))
    }

    pub fn len(&self) -> usize { self.postings.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Every posting list, tokens ascending and ids ascending within each list.
    pub fn sorted_postings(&self) -> Vec<(Token, Vec<DocId>)> {
        let postings = self.postings.read();
        let mut out: Vec<(Token, Vec<DocId>)> = postings
            .iter()
            .map(|(token, set)| {
                let mut ids: Vec<DocId> = set.iter().copied().collect();
                ids.sort_unstable();
                (token.clone(), ids)
            })
            .collect();
        out.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
