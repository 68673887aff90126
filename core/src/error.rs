use crate::index::ArticleId;
use crate::persist::StoreError;
use crate::tokenizer::TokenizeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("article {0} not found")]
    NotFound(ArticleId),
    /// The store rejected a write or could not be read. In-memory state
    /// reflects whatever was accepted before the failure.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
    #[error(transparent)]
    Tokenizer(#[from] TokenizeError),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
