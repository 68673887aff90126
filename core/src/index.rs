use serde::{Deserialize, Serialize};

pub type ArticleId = u32;
type NodeId = u32;

const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub article: ArticleId,
    pub weight: f64,
}

#[derive(Debug, Default)]
struct Node {
    /// Sorted by byte.
    children: Vec<(u8, NodeId)>,
    postings: Vec<Posting>,
}

impl Node {
    fn child(&self, byte: u8) -> Option<NodeId> {
        self.children
            .binary_search_by_key(&byte, |&(b, _)| b)
            .ok()
            .map(|i| self.children[i].1)
    }
}

/// Exact-match token index: a byte trie whose nodes live in one arena and
/// refer to each other by position.
///
/// Postings under a token keep insertion order and are never removed; the
/// only way to drop content is to build a new index.
#[derive(Debug)]
pub struct TokenIndex {
    nodes: Vec<Node>,
    tokens: usize,
    postings: usize,
}

impl Default for TokenIndex {
    fn default() -> Self { Self::new() }
}

impl TokenIndex {
    pub fn new() -> Self {
        Self { nodes: vec![Node::default()], tokens: 0, postings: 0 }
    }

    /// Append a posting for `token`, creating its path if absent. The empty
    /// token is a valid key and lives on the root.
    pub fn insert(&mut self, token: impl AsRef<[u8]>, article: ArticleId, weight: f64) {
        let mut pos = ROOT;
        for &byte in token.as_ref() {
            let node = &self.nodes[pos as usize];
            pos = match node.children.binary_search_by_key(&byte, |&(b, _)| b) {
                Ok(i) => node.children[i].1,
                Err(i) => {
                    let next = self.nodes.len() as NodeId;
                    self.nodes.push(Node::default());
                    self.nodes[pos as usize].children.insert(i, (byte, next));
                    next
                }
            };
        }
        let postings = &mut self.nodes[pos as usize].postings;
        if postings.is_empty() {
            self.tokens += 1;
        }
        postings.push(Posting { article, weight });
        self.postings += 1;
    }

    /// Postings recorded under exactly `token`, empty if it was never inserted.
    pub fn query(&self, token: impl AsRef<[u8]>) -> &[Posting] {
        let mut pos = ROOT;
        for &byte in token.as_ref() {
            match self.nodes[pos as usize].child(byte) {
                Some(next) => pos = next,
                None => return &[],
            }
        }
        &self.nodes[pos as usize].postings
    }

    /// Number of distinct tokens that carry at least one posting.
    pub fn token_count(&self) -> usize { self.tokens }

    pub fn posting_count(&self) -> usize { self.postings }

    pub fn node_count(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.postings == 0 }
}
