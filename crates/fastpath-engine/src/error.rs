//! Engine-wide error taxonomy.

/// Errors returned by table and registration operations.
///
/// Structural errors are always surfaced to the caller: the learning table
/// and the connection tracker decide retry-as-update vs. insert based on
/// them. When an engine instance is constructed disabled, its operations
/// return neutral values instead of errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("entry already exists")]
    DuplicateKey,

    #[error("entry not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("device not registered: {0}")]
    DeviceNotRegistered(u64),
}

/// Convenience result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Distinguished forwarding outcome: the registered forwarding hook vetoed
/// the packet. Not a structural error — the caller must discard the packet
/// and must not fall back to slow-path transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropPacket;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(CacheError::DuplicateKey.to_string(), "entry already exists");
        assert_eq!(
            CacheError::DeviceNotRegistered(7).to_string(),
            "device not registered: 7"
        );
        assert_eq!(
            CacheError::InvalidArgument("zero MAC".into()).to_string(),
            "invalid argument: zero MAC"
        );
    }
}
