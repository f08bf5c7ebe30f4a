use shared::{domain::ItemId, error::RecordError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("a page fetch is already in flight (offset {offset})")]
    InProgress { offset: u32 },
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog returned HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("malformed catalog record: {0}")]
    Malformed(#[from] RecordError),
    #[error("invalid catalog url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("catalog backend unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    /// Single-flight rejections are coalesced silently rather than shown.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::InProgress { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("index {index} is out of range for a collection of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("item {0} is not in the collection")]
    UnknownItem(ItemId),
}
