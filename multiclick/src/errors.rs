use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("No controls match pattern: {0}")]
    NoMatch(String),

    #[error("Automation already running for pattern: {0}")]
    AlreadyRunning(String),

    #[error("Activation rejected by host: {0}")]
    ActivationFailed(String),

    #[error("Host unavailable: {0}")]
    HostUnavailable(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
