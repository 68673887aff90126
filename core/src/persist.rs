use crate::index::ArticleId;
use crate::tokenizer::Keyword;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub type RowKey = u64;

const ARTS_TREE: &str = "ARTS";

/// One persisted article. `keywords` holds the JSON array of `{word, weight}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRow {
    /// Engine-assigned id, restored verbatim on reload.
    pub id: ArticleId,
    pub content: String,
    pub weight: f64,
    pub keywords: String,
    pub deleted: bool,
}

impl ArticleRow {
    pub fn new(
        id: ArticleId,
        content: impl Into<String>,
        weight: f64,
        keywords: &[Keyword],
    ) -> Result<Self, StoreError> {
        Ok(Self {
            id,
            content: content.into(),
            weight,
            keywords: serde_json::to_string(keywords)?,
            deleted: false,
        })
    }

    pub fn decode_keywords(&self) -> Result<Vec<Keyword>, StoreError> {
        Ok(serde_json::from_str(&self.keywords)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredArticle {
    pub key: RowKey,
    pub row: ArticleRow,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend: {0}")]
    Sled(#[from] sled::Error),
    #[error("row encoding: {0}")]
    Codec(#[from] bincode::Error),
    #[error("keyword column: {0}")]
    Keywords(#[from] serde_json::Error),
    #[error("no row with key {0}")]
    MissingRow(RowKey),
    #[error("{0}")]
    Unavailable(String),
}

/// Durable article table.
pub trait ArticleStore: Send + Sync {
    fn insert(&self, row: &ArticleRow) -> Result<RowKey, StoreError>;

    /// Persist the tombstone for `key`.
    fn mark_deleted(&self, key: RowKey) -> Result<(), StoreError>;

    /// Every row, in insertion order, tombstoned ones included.
    fn load_all(&self) -> Result<Vec<StoredArticle>, StoreError>;
}

impl<S: ArticleStore + ?Sized> ArticleStore for Arc<S> {
    fn insert(&self, row: &ArticleRow) -> Result<RowKey, StoreError> { (**self).insert(row) }

    fn mark_deleted(&self, key: RowKey) -> Result<(), StoreError> { (**self).mark_deleted(key) }

    fn load_all(&self) -> Result<Vec<StoredArticle>, StoreError> { (**self).load_all() }
}

/// sled-backed store. Keys are big-endian ids from `generate_id`, so a tree
/// scan yields rows in insertion order.
pub struct SledStore {
    db: sled::Db,
    arts: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A store that lives only as long as the process.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let arts = db.open_tree(ARTS_TREE)?;
        Ok(Self { db, arts })
    }
}

impl ArticleStore for SledStore {
    fn insert(&self, row: &ArticleRow) -> Result<RowKey, StoreError> {
        let key = self.db.generate_id()?;
        let bytes = bincode::serialize(row)?;
        self.arts.insert(key.to_be_bytes(), bytes)?;
        self.arts.flush()?;
        Ok(key)
    }

    fn mark_deleted(&self, key: RowKey) -> Result<(), StoreError> {
        let raw = self.arts.get(key.to_be_bytes())?.ok_or(StoreError::MissingRow(key))?;
        let mut row: ArticleRow = bincode::deserialize(&raw)?;
        if row.deleted {
            return Ok(());
        }
        row.deleted = true;
        self.arts.insert(key.to_be_bytes(), bincode::serialize(&row)?)?;
        self.arts.flush()?;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<StoredArticle>, StoreError> {
        let mut out = Vec::with_capacity(self.arts.len());
        for entry in self.arts.iter() {
            let (k, v) = entry?;
            let mut key = [0u8; 8];
            key.copy_from_slice(&k);
            out.push(StoredArticle { key: RowKey::from_be_bytes(key), row: bincode::deserialize(&v)? });
        }
        Ok(out)
    }
}

/// In-process store for tests and throwaway engines.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<StoredArticle>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.rows.lock().len() }

    pub fn is_empty(&self) -> bool { self.rows.lock().is_empty() }
}

impl ArticleStore for MemoryStore {
    fn insert(&self, row: &ArticleRow) -> Result<RowKey, StoreError> {
        let mut rows = self.rows.lock();
        let key = rows.len() as RowKey;
        rows.push(StoredArticle { key, row: row.clone() });
        Ok(key)
    }

    fn mark_deleted(&self, key: RowKey) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        let stored = rows.get_mut(key as usize).ok_or(StoreError::MissingRow(key))?;
        stored.row.deleted = true;
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<StoredArticle>, StoreError> {
        Ok(self.rows.lock().clone())
    }
}
