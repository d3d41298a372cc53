/// Error type for participant state machine rejections
#[derive(Debug, PartialEq, Eq)]
pub enum ParticipantError {
    /// Lock not acquired within the retry budget.
    LockBusy,
    /// Commit referenced an id that does not hold the lock.
    WrongTransaction,
    /// Apply referenced an id with no pending commit entry.
    NotPending,
}

impl std::fmt::Display for ParticipantError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantError::LockBusy => write!(f, "lock busy after retries"),
            ParticipantError::WrongTransaction => write!(f, "transaction does not hold the lock"),
            ParticipantError::NotPending => write!(f, "no pending commit entry for transaction"),
        }
    }
}

impl std::error::Error for ParticipantError {}

/// Error type for coordinator write failures
#[derive(Debug)]
pub enum CoordinatorError {
    /// Vote broadcast stopped at a rejecting or unreachable peer.
    VoteRejected,
    /// Commit broadcast stopped at a rejecting or unreachable peer.
    CommitRejected,
    /// Apply broadcast exhausted its retry ceiling on some peer.
    ApplyIncomplete,
    /// HTTP client could not be constructed.
    Client(reqwest::Error),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorError::VoteRejected => write!(f, "vote broadcast failed"),
            CoordinatorError::CommitRejected => write!(f, "commit broadcast failed"),
            CoordinatorError::ApplyIncomplete => write!(f, "apply broadcast incomplete"),
            CoordinatorError::Client(e) => write!(f, "HTTP client error: {}", e),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<reqwest::Error> for CoordinatorError {
    fn from(err: reqwest::Error) -> Self {
        CoordinatorError::Client(err)
    }
}
