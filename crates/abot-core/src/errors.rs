use std::fmt;

use crate::domain::RecordSet;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can tell user mistakes (not found, bad input) apart from backend faults.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("backend unavailable: {0}")]
    Backend(String),

    #[error("transfer failed: {0}")]
    PartialTransfer(TransferFailure),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Errors caused by what the user typed rather than by the system.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidArgument(_))
    }
}

/// Which step of a move between record sets went wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferStage {
    DestinationOccupied,
    Insert,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferFailure {
    pub key: String,
    pub from: RecordSet,
    pub to: RecordSet,
    pub stage: TransferStage,
    /// `true` when the record is in `from` only, exactly as before the move.
    pub source_intact: bool,
    pub reason: String,
}

impl fmt::Display for TransferFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self.stage {
            TransferStage::DestinationOccupied => "destination already holds the record",
            TransferStage::Insert => "insert into destination failed",
            TransferStage::Delete => "delete from source failed",
        };
        write!(
            f,
            "{} ({} -> {}): {stage}: {}",
            self.key,
            self.from.label(),
            self.to.label(),
            self.reason
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
