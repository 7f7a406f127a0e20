use thiserror::Error;

/// Failures reported by the bus transaction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("device did not acknowledge")]
    Nack,
    #[error("bus transaction timed out")]
    Timeout,
    #[error("bus returned fewer bytes than requested")]
    ShortRead,
}

/// Failures reported by a device driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
    #[error("identity mismatch: expected {expected:#04x}, found {found:#04x}")]
    IdentityMismatch { expected: u8, found: u8 },
    #[error("sensor channel not initialized")]
    NotInitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("sensor registry is full ({0} slots)")]
    Full(usize),
}
