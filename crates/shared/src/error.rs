use thiserror::Error;

/// Raised when a remote detail record cannot be mapped onto a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record {id} is missing stat '{stat}'")]
    MissingStat { id: i64, stat: &'static str },
    #[error("record has an empty name")]
    EmptyName,
    #[error("record id {0} is not positive")]
    InvalidId(i64),
}
