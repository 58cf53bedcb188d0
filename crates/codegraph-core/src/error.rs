use thiserror::Error;

/// Closed error taxonomy shared across the workspace. Every variant maps to
/// exactly one stable wire code in the tool-call envelope (see
/// `error_code`/`hint`).
#[derive(Error, Debug)]
pub enum CodeGraphError {
    #[error("session not bound to a workspace")]
    SessionUnbound,

    #[error("graph not ready: {0}")]
    NotReady(String),

    #[error("rebuild already in progress")]
    RebuildInProgress,

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, CodeGraphError>;

impl CodeGraphError {
    /// Stable machine-readable code, as carried in the `errorCode` envelope field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionUnbound => "SESSION_UNBOUND",
            Self::NotReady(_) => "NOT_READY",
            Self::RebuildInProgress => "REBUILD_IN_PROGRESS",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            Self::AlreadyClaimed(_) => "ALREADY_CLAIMED",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) | Self::Io(_) | Self::Serialization(_) | Self::Configuration(_) => {
                "INTERNAL"
            }
        }
    }

    /// User-actionable remediation hint, as carried in the `hint` envelope field.
    pub fn hint(&self) -> String {
        match self {
            Self::SessionUnbound => "call bind_workspace".into(),
            Self::NotReady(_) => "run graph_rebuild then poll graph_health".into(),
            Self::RebuildInProgress => "retry later".into(),
            Self::StoreUnavailable(_) => "check infra".into(),
            Self::ConstraintViolation(_) => "report; likely bug".into(),
            Self::AlreadyClaimed(_) => "wait or coordinate with the holder".into(),
            Self::ValidationFailed(msg) => format!("fix input: {msg}"),
            Self::NotImplemented(_) => "use an alternative tool".into(),
            Self::Timeout(_) => "retry".into(),
            Self::Internal(_) | Self::Io(_) | Self::Serialization(_) | Self::Configuration(_) => {
                "report bug".into()
            }
        }
    }
}
