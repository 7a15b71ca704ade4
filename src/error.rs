use crate::{
    adapter::TxRef,
    lifecycle::SpinId,
};

pub type Result<T, E = SpinError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum SpinError {
    #[error("malformed bet key: {0}")]
    MalformedKey(String),

    #[error("invalid reel data: {0}")]
    InvalidReelData(String),

    #[error("invalid game configuration: {0}")]
    InvalidConfig(String),

    #[error("game configuration has not been loaded")]
    ConfigNotLoaded,

    #[error("spin controller has not been initialized")]
    NotInitialized,

    #[error("insufficient balance: bet requires {required}, {available} available")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("invalid bet: {0}")]
    InvalidBet(String),

    #[error("spin submission failed: {0}")]
    SubmissionFailed(String),

    #[error("claim verification failed: {0}")]
    ClaimVerificationFailed(String),

    #[error("no replay data recoverable for transaction {0}")]
    ReconstructionNotFound(TxRef),

    #[error("unknown spin {0}")]
    UnknownSpin(SpinId),

    #[error(transparent)]
    Chain(#[from] anyhow::Error),
}

impl SpinError {
    /// Whether the caller may retry, possibly with different parameters.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SpinError::InsufficientBalance { .. }
                | SpinError::InvalidBet(_)
                | SpinError::SubmissionFailed(_)
        )
    }
}
