//! Prefix tree over token bytes, stored as an arena of nodes.
//!
//! On disk (`token_dict_trie.bin`) nodes are written pre-order:
//! `u8 label, u8 terminal, [u64 offset if terminal], u32 child_count, children...`.
//! Children are written in creation order, which for byte-sorted input is
//! ascending label order.

use crate::Token;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};

pub type NodeId = u32;

pub const ROOT: NodeId = 0;
pub const ROOT_LABEL: u8 = b'-';
/// Written for a terminal node that has no postings entry (the root of an
/// empty trie).
pub const NO_OFFSET: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieNode {
    pub label: u8,
    pub terminal: bool,
    pub offset: Option<u64>,
    children: Vec<(u8, NodeId)>,
}

impl TrieNode {
    fn new(label: u8) -> Self {
        Self { label, terminal: false, offset: None, children: Vec::new() }
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().map(|(_, id)| *id)
    }

    pub fn child_count(&self) -> usize { self.children.len() }

    fn child(&self, label: u8) -> Option<NodeId> {
        self.children.iter().find(|(l, _)| *l == label).map(|(_, id)| *id)
    }

    pub(crate) fn decoded(label: u8, terminal: bool, offset: Option<u64>) -> Self {
        Self { label, terminal, offset, children: Vec::new() }
    }

    pub(crate) fn push_child(&mut self, label: u8, id: NodeId) {
        self.children.push((label, id));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTrie {
    nodes: Vec<TrieNode>,
}

impl TokenTrie {
    /// Builds the trie from `(token, postings offset)` pairs. Input order does
    /// not matter; tokens are inserted in ascending byte order.
    pub fn build<'a>(entries: impl IntoIterator<Item = (&'a Token, u64)>) -> Self {
        let mut sorted: Vec<(&Token, u64)> = entries.into_iter().collect();
        sorted.sort_unstable_by(|a, b| a.0.cmp(b.0));

        let mut trie = Self { nodes: vec![TrieNode::new(ROOT_LABEL)] };
        if sorted.is_empty() {
            trie.nodes[ROOT as usize].terminal = true;
            return trie;
        }
        for (token, offset) in sorted {
            trie.insert(token.as_bytes(), offset);
        }
        trie
    }

    fn insert(&mut self, key: &[u8], offset: u64) {
        let mut current = ROOT;
        for &byte in key {
            current = match self.nodes[current as usize].child(byte) {
                Some(next) => next,
                None => {
                    let next = self.nodes.len() as NodeId;
                    self.nodes.push(TrieNode::new(byte));
                    let parent = &mut self.nodes[current as usize];
                    debug_assert!(parent.children.last().map_or(true, |(l, _)| *l < byte));
                    parent.children.push((byte, next));
                    next
                }
            };
        }
        let node = &mut self.nodes[current as usize];
        node.terminal = true;
        node.offset = Some(offset);
    }

    pub fn root(&self) -> &TrieNode { &self.nodes[ROOT as usize] }

    pub fn node(&self, id: NodeId) -> &TrieNode { &self.nodes[id as usize] }

    /// Node count including the root.
    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.root().child_count() == 0 }

    /// Follows `path` byte by byte from the root.
    pub fn walk(&self, path: &[u8]) -> Option<NodeId> {
        let mut current = ROOT;
        for &byte in path {
            current = self.nodes[current as usize].child(byte)?;
        }
        Some(current)
    }

    /// Postings offset for `token`, if it was inserted.
    pub fn lookup(&self, token: &str) -> Option<u64> {
        if token.is_empty() {
            return None;
        }
        let node = self.node(self.walk(token.as_bytes())?);
        if node.terminal { node.offset } else { None }
    }

    /// Serializes pre-order with an explicit stack so deep tries cannot blow
    /// the call stack.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            writer.write_u8(node.label)?;
            writer.write_u8(node.terminal as u8)?;
            if node.terminal {
                writer.write_u64::<BigEndian>(node.offset.unwrap_or(NO_OFFSET))?;
            }
            writer.write_u32::<BigEndian>(node.children.len() as u32)?;
            stack.extend(node.children.iter().rev().map(|(_, child)| *child));
        }
        Ok(())
    }

    pub(crate) fn from_nodes(nodes: Vec<TrieNode>) -> Self { Self { nodes } }
}
