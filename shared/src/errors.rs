use thiserror::Error;

#[derive(Error, Debug)]
pub enum MinerError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),
    #[error("hash computation failed on worker {worker}: {reason}")]
    HashComputation { worker: usize, reason: String },
    #[error("worker {0} stopped unexpectedly")]
    WorkerFailed(usize),
    #[error("proof rejected: {0}")]
    SubmissionRejected(String),
    #[error("insufficient balance: {balance} < {required}")]
    InsufficientBalance { balance: u64, required: u64 },
    #[error("account unavailable: {0}")]
    AccountUnavailable(String),
    #[error("chain request failed: {0}")]
    Chain(String),
    #[error("mining engine stopped")]
    EngineStopped,
}

impl MinerError {
    /// identity level problems that skip a wallet instead of stopping the batch
    pub fn is_preflight(&self) -> bool {
        matches!(self, MinerError::InsufficientBalance { .. } | MinerError::AccountUnavailable(_))
    }
}

pub type MinerResult<T> = Result<T, MinerError>;
