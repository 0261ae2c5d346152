use thiserror::Error;

/// Error kinds surfaced by the driver, per the abstract set the host
/// framework maps to its own status codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("out of memory")]
    OutOfMemory,

    #[error("file not found")]
    FileNotFound,

    #[error("object invalid")]
    ObjectInvalid,

    #[error("invalid arguments")]
    InvalidArguments,

    #[error("incorrect parameters")]
    IncorrectParameters,

    #[error("not supported")]
    NotSupported,

    #[error("APDU transmit failed: {0}")]
    ApduTransmitFailed(String),

    #[error("card returned error {sw1:02X}{sw2:02X}")]
    CardError { sw1: u8, sw2: u8 },
}

pub type Result<T> = std::result::Result<T, Error>;
