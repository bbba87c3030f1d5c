//! Shared error taxonomy: Transient, Input validity, State violation,
//! Resource exhaustion, External service unavailability. Each component
//! defines its own `thiserror` enum and tags each variant with the
//! [`ErrorKind`] it belongs to via `kind()`, rather than a single giant enum.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    InputValidity,
    StateViolation,
    ResourceExhaustion,
    ExternalUnavailable,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("price for {coin} is stale (age {age_ms}ms > {threshold_ms}ms)")]
    Stale {
        coin: String,
        age_ms: u64,
        threshold_ms: u64,
    },
    #[error("insufficient kline history for {coin}: have {have}, need {need}")]
    InsufficientHistory {
        coin: String,
        have: usize,
        need: usize,
    },
    #[error("unknown coin {0}")]
    UnknownCoin(String),
}

impl FeedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedError::Stale { .. } => ErrorKind::Transient,
            FeedError::InsufficientHistory { .. } => ErrorKind::Transient,
            FeedError::UnknownCoin(_) => ErrorKind::InputValidity,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProposerError {
    #[error("reasoning service timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("reasoning service returned malformed output: {0}")]
    MalformedOutput(String),
}

impl ProposerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProposerError::Timeout(_) => ErrorKind::Transient,
            ProposerError::MalformedOutput(_) => ErrorKind::InputValidity,
        }
    }
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("durable write failed: {0}")]
    WriteFailed(String),
    #[error("trade {0} not found")]
    NotFound(uuid::Uuid),
}

impl JournalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JournalError::WriteFailed(_) => ErrorKind::Transient,
            JournalError::NotFound(_) => ErrorKind::InputValidity,
        }
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("unknown target: {0}")]
    UnknownTarget(String),
}

impl KnowledgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KnowledgeError::Invariant(_) => ErrorKind::StateViolation,
            KnowledgeError::Storage(_) => ErrorKind::Transient,
            KnowledgeError::UnknownTarget(_) => ErrorKind::InputValidity,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("response timed out")]
    Timeout,
    #[error("response was not valid JSON: {0}")]
    InvalidJson(String),
}

impl ReasoningError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReasoningError::Request(_) => ErrorKind::ExternalUnavailable,
            ReasoningError::Timeout => ErrorKind::Transient,
            ReasoningError::InvalidJson(_) => ErrorKind::InputValidity,
        }
    }
}
