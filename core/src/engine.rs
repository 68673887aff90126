//! The search engine: owns the article table and the token index, and is the
//! only thing that mutates them.
//!
//! Scoring is a partial cosine similarity. For every article the dot product
//! of the query keyword weights with the article's stored weights for the
//! matching tokens is divided by the article's own norm, computed once at
//! insertion. The query side is not normalized.
//!
//! Deletes are tombstones. After `rebuild_threshold` of them the whole corpus
//! is reloaded from the store into a fresh index and swapped in.

use crate::error::{EngineError, Result};
use crate::index::{ArticleId, TokenIndex};
use crate::persist::{ArticleRow, ArticleStore, RowKey, StoreError, StoredArticle};
use crate::tokenizer::{Keyword, Tokenizer};
use parking_lot::RwLock;
use serde::Serialize;
use std::cmp::Ordering;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

pub const REBUILD_THRESHOLD: usize = 1000;
pub const MAX_RESULTS: usize = 20;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of deletes after which the index is rebuilt from the store.
    pub rebuild_threshold: usize,
    pub max_results: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { rebuild_threshold: REBUILD_THRESHOLD, max_results: MAX_RESULTS }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: ArticleId,
    pub content: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// The query as the tokenizer saw it.
    pub keywords: Vec<Keyword>,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Tombstoned,
    AlreadyDeleted,
    /// The delete filled the tombstone budget and the index was rebuilt.
    Compacted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub articles: usize,
    pub live: usize,
    pub pending_deletions: usize,
    pub tokens: usize,
    pub postings: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticleView {
    pub id: ArticleId,
    pub content: String,
    pub norm: f64,
    pub deleted: bool,
}

#[derive(Debug)]
struct Article {
    /// `None` when the store rejected the insert, and for placeholder slots.
    key: Option<RowKey>,
    content: String,
    norm: f64,
    deleted: bool,
}

#[derive(Debug, Default)]
struct Corpus {
    articles: Vec<Article>,
    index: TokenIndex,
    pending_deletions: usize,
}

impl Corpus {
    /// Every row goes back to the id it was stored under. Tombstoned rows keep
    /// their slot but their keywords are not indexed. Ids with no row (inserts
    /// the store rejected) become deleted placeholders, and the list is padded
    /// to at least `min_len` so no id handed out before is ever reused.
    fn load(rows: Vec<StoredArticle>, min_len: usize) -> Result<Self, StoreError> {
        let mut corpus = Corpus::default();
        for StoredArticle { key, row } in rows {
            let slot = row.id as usize;
            if corpus.articles.get(slot).is_some_and(|a| a.key.is_some()) {
                warn!(id = row.id, key, "duplicate article id in store, keeping the first row");
                continue;
            }
            corpus.pad_to(slot + 1);
            if !row.deleted {
                for kw in row.decode_keywords()? {
                    corpus.index.insert(&kw.word, row.id, kw.weight);
                }
            }
            corpus.articles[slot] = Article {
                key: Some(key),
                content: row.content,
                norm: row.weight,
                deleted: row.deleted,
            };
        }
        corpus.pad_to(min_len);
        Ok(corpus)
    }

    fn pad_to(&mut self, len: usize) {
        while self.articles.len() < len {
            self.articles.push(Article { key: None, content: String::new(), norm: 0.0, deleted: true });
        }
    }

    fn push(&mut self, content: String, norm: f64, keywords: &[Keyword]) -> ArticleId {
        let id = self.articles.len() as ArticleId;
        self.articles.push(Article { key: None, content, norm, deleted: false });
        for kw in keywords {
            self.index.insert(&kw.word, id, kw.weight);
        }
        id
    }

    fn rank(&self, keywords: &[Keyword], limit: usize) -> Vec<SearchHit> {
        if keywords.is_empty() || self.articles.is_empty() {
            return Vec::new();
        }
        let mut dots = vec![0.0f64; self.articles.len()];
        for kw in keywords {
            for p in self.index.query(&kw.word) {
                dots[p.article as usize] += p.weight * kw.weight;
            }
        }
        let mut ranked: Vec<(usize, f64)> = dots
            .into_iter()
            .enumerate()
            .filter_map(|(id, dot)| {
                let art = &self.articles[id];
                // norm == 0 means no keywords were indexed, so nothing to score
                if art.deleted || art.norm <= 0.0 {
                    return None;
                }
                let score = dot / art.norm;
                (score > 0.0).then_some((id, score))
            })
            .collect();
        // stable: equal scores keep insertion order
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked.truncate(limit);
        ranked
            .into_iter()
            .map(|(id, score)| SearchHit { id: id as ArticleId, content: self.articles[id].content.clone(), score })
            .collect()
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            articles: self.articles.len(),
            live: self.articles.iter().filter(|a| !a.deleted).count(),
            pending_deletions: self.pending_deletions,
            tokens: self.index.token_count(),
            postings: self.index.posting_count(),
        }
    }
}

/// Euclidean norm of the keyword weight vector.
pub fn norm_weight(keywords: &[Keyword]) -> f64 {
    keywords.iter().map(|k| k.weight * k.weight).sum::<f64>().sqrt()
}

pub struct Engine {
    store: Box<dyn ArticleStore>,
    tokenizer: Box<dyn Tokenizer>,
    config: EngineConfig,
    corpus: RwLock<Corpus>,
}

impl Engine {
    /// Build an engine over `store`, loading every row it already holds.
    pub fn open(
        store: impl ArticleStore + 'static,
        tokenizer: impl Tokenizer + 'static,
        config: EngineConfig,
    ) -> Result<Self> {
        let corpus = Corpus::load(store.load_all()?, 0)?;
        info!(
            articles = corpus.articles.len(),
            tokens = corpus.index.token_count(),
            "engine loaded from store"
        );
        Ok(Self {
            store: Box::new(store),
            tokenizer: Box::new(tokenizer),
            config,
            corpus: RwLock::new(corpus),
        })
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Tokenize, index and persist `content`. A store failure is returned but
    /// the article stays searchable in this process.
    #[instrument(skip(self, content), fields(len = content.len()))]
    pub fn add_entry(&self, content: &str) -> Result<ArticleId> {
        let keywords = self.tokenizer.keywords(content)?;
        let norm = norm_weight(&keywords);

        let mut corpus = self.corpus.write();
        let row = ArticleRow::new(corpus.articles.len() as ArticleId, content, norm, &keywords)?;
        let id = corpus.push(content.to_owned(), norm, &keywords);
        let key = self.store.insert(&row).map_err(|e| {
            warn!(id, error = %e, "article indexed but not persisted");
            e
        })?;
        corpus.articles[id as usize].key = Some(key);
        debug!(id, keywords = keywords.len(), norm, "article added");
        Ok(id)
    }

    pub fn search(&self, query: &str) -> Result<SearchOutcome> {
        let keywords = self.tokenizer.keywords(query)?;
        let hits = self.corpus.read().rank(&keywords, self.config.max_results);
        debug!(query_keywords = keywords.len(), hits = hits.len(), "search");
        Ok(SearchOutcome { keywords, hits })
    }

    /// Tombstone an article. The flag is persisted before memory changes, so
    /// a store failure leaves everything as it was.
    #[instrument(skip(self))]
    pub fn delete(&self, id: ArticleId) -> Result<Deletion> {
        let mut corpus = self.corpus.write();
        let (key, deleted) = match corpus.articles.get(id as usize) {
            Some(a) => (a.key, a.deleted),
            None => return Err(EngineError::NotFound(id)),
        };
        if deleted {
            return Ok(Deletion::AlreadyDeleted);
        }
        if let Some(key) = key {
            self.store.mark_deleted(key)?;
        }
        corpus.articles[id as usize].deleted = true;
        corpus.pending_deletions += 1;

        if corpus.pending_deletions < self.config.rebuild_threshold.max(1) {
            return Ok(Deletion::Tombstoned);
        }
        // on failure the counter stays full so the next delete retries
        self.rebuild_locked(&mut corpus)?;
        Ok(Deletion::Compacted)
    }

    /// Discard the in-memory corpus and reload it from the store.
    pub fn rebuild(&self) -> Result<()> {
        let mut corpus = self.corpus.write();
        self.rebuild_locked(&mut corpus)
    }

    fn rebuild_locked(&self, corpus: &mut Corpus) -> Result<()> {
        let started = Instant::now();
        let min_len = corpus.articles.len();
        let fresh = match self.store.load_all().and_then(|rows| Corpus::load(rows, min_len)) {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(error = %e, "rebuild aborted, keeping previous index");
                return Err(e.into());
            }
        };
        let dropped = corpus.articles.iter().filter(|a| a.key.is_none() && !a.deleted).count();
        if dropped > 0 {
            warn!(dropped, "unpersisted articles dropped by rebuild, their ids stay retired");
        }
        *corpus = fresh;
        info!(
            articles = corpus.articles.len(),
            tokens = corpus.index.token_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index rebuilt"
        );
        Ok(())
    }

    pub fn get(&self, id: ArticleId) -> Option<ArticleView> {
        let corpus = self.corpus.read();
        corpus.articles.get(id as usize).map(|a| ArticleView {
            id,
            content: a.content.clone(),
            norm: a.norm,
            deleted: a.deleted,
        })
    }

    pub fn stats(&self) -> EngineStats { self.corpus.read().stats() }
}
