pub mod engine;
pub mod error;
pub mod index;
pub mod ingest;
pub mod persist;
pub mod tokenizer;

pub use engine::{ArticleView, Deletion, Engine, EngineConfig, EngineStats, SearchHit, SearchOutcome};
pub use error::EngineError;
pub use index::{ArticleId, Posting, TokenIndex};
pub use persist::{ArticleRow, ArticleStore, MemoryStore, SledStore, StoreError};
pub use tokenizer::{Keyword, KeywordExtractor, Tokenizer, WhitespaceTokenizer};
