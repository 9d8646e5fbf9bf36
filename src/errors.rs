use thiserror::Error;

/// Error taxonomy for discovery and access-control operations
#[derive(Error, Debug)]
pub enum NetGuardError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Cannot kick {0}: MAC address unknown")]
    MissingMac(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sweep Error: {0}")]
    Sweep(String),

    #[error("Enforcement Error: {0}")]
    Enforcement(String),

    #[error("Counter Error: {0}")]
    Counters(String),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

impl NetGuardError {
    /// True when the failure means "no such device" rather than "operation failed".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DeviceNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, NetGuardError>;
