use jmsbus_codec::destination::BlockedError;
use jmsbus_codec::error::{DecodeError, DestinationError, EncodeError};

use crate::spi::CoreError;

pub type Result<T, E = JmsError> = std::result::Result<T, E>;

/// Errors surfaced to JMS applications.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JmsError {
    #[error("Illegal state, {0}")]
    IllegalState(String),
    #[error("Invalid destination, {0}")]
    InvalidDestination(String),
    #[error("Message format error, {0}")]
    MessageFormat(String),
    #[error("Unsupported operation, {0}")]
    UnsupportedOperation(String),
    #[error("Security error, {0}")]
    Security(String),
    #[error("Resource allocation error, {0}")]
    ResourceAllocation(String),
    #[error("Transaction rolled back, {0}")]
    TransactionRolledBack(String),
    #[error("{0}")]
    Jms(String),
    /// A defect in this library rather than a problem with the caller's input.
    #[error("Internal error, {0}")]
    Internal(String),
}

impl JmsError {
    #[inline]
    pub(crate) fn closed(what: &str) -> Self {
        JmsError::IllegalState(format!("{what} is closed"))
    }

    #[inline]
    pub fn is_internal(&self) -> bool {
        matches!(self, JmsError::Internal(_))
    }
}

impl From<DestinationError> for JmsError {
    #[inline]
    fn from(e: DestinationError) -> Self {
        JmsError::InvalidDestination(e.to_string())
    }
}

impl From<EncodeError> for JmsError {
    #[inline]
    fn from(e: EncodeError) -> Self {
        JmsError::Internal(e.to_string())
    }
}

impl From<DecodeError> for JmsError {
    #[inline]
    fn from(e: DecodeError) -> Self {
        if e.is_internal() {
            JmsError::Internal(e.to_string())
        } else {
            JmsError::Jms(e.to_string())
        }
    }
}

impl From<BlockedError> for JmsError {
    #[inline]
    fn from(e: BlockedError) -> Self {
        JmsError::Jms(e.to_string())
    }
}

impl From<CoreError> for JmsError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::ConnectionLost(msg) => JmsError::IllegalState(format!("connection lost, {msg}")),
            CoreError::NotAuthorized(msg) => JmsError::Security(msg),
            CoreError::NotFound(msg) => JmsError::InvalidDestination(msg),
            CoreError::LimitExceeded(msg) | CoreError::Resource(msg) => JmsError::ResourceAllocation(msg),
            CoreError::RolledBack(msg) => JmsError::TransactionRolledBack(msg),
            CoreError::Other(msg) => JmsError::Jms(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_errors() {
        let e: JmsError = DecodeError::UnknownWireName("zz".into()).into();
        assert!(matches!(e, JmsError::Jms(_)));
        let e: JmsError = DecodeError::InvalidLength.into();
        assert!(e.is_internal());
        let e: JmsError = EncodeError::UnknownProperty("colour".into()).into();
        assert!(e.is_internal());
        let e: JmsError = DestinationError::ReservedPrefix("_x".into()).into();
        assert!(matches!(e, JmsError::InvalidDestination(_)));
    }

    #[test]
    fn test_core_errors() {
        assert!(matches!(JmsError::from(CoreError::NotAuthorized("u".into())), JmsError::Security(_)));
        assert!(matches!(JmsError::from(CoreError::NotFound("q".into())), JmsError::InvalidDestination(_)));
        assert!(matches!(JmsError::from(CoreError::LimitExceeded("q".into())), JmsError::ResourceAllocation(_)));
        assert!(matches!(JmsError::from(CoreError::ConnectionLost("x".into())), JmsError::IllegalState(_)));
        assert!(matches!(
            JmsError::from(CoreError::RolledBack("tx".into())),
            JmsError::TransactionRolledBack(_)
        ));
    }
}
