use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },
    #[error("requested capacity overflows the addressable range")]
    CapacityOverflow,
    #[error("unsupported serialization version `{0}`")]
    UnsupportedVersion(u32),
    #[error("serialized input ended early")]
    Truncated,
    #[error("serialized length `{0}` exceeds the addressable range")]
    LengthOverflow(u64),
    #[error("serialized string is not valid UTF-8")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, Error>;
