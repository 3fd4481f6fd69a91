//! The messaging core this layer sits on.
//!
//! A core implementation supplies connections; this crate drives them from
//! sessions and producers and translates their failures into [`JmsError`](crate::JmsError).

use jmsbus_codec::{DestinationAddress, DestinationKind};

use crate::message::Message;

pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
    #[error("Resource error: {0}")]
    Resource(String),
    #[error("Rolled back: {0}")]
    RolledBack(String),
    #[error("{0}")]
    Other(String),
}

/// A unit of work on the core. Consumed by `commit` or `rollback`.
pub trait CoreTransaction: Send + Sync {
    fn commit(&self) -> CoreResult<()>;

    fn rollback(&self) -> CoreResult<()>;
}

/// A producer bound to one address.
pub trait ProducerSession: Send + Sync {
    fn send(&self, message: &Message, transaction: Option<&dyn CoreTransaction>) -> CoreResult<()>;

    fn close(&self) -> CoreResult<()>;
}

pub trait CoreConnection: Send + Sync {
    fn create_producer_session(&self, address: &DestinationAddress) -> CoreResult<Box<dyn ProducerSession>>;

    /// Sends without a bound producer.
    fn send(
        &self,
        address: &DestinationAddress,
        message: &Message,
        transaction: Option<&dyn CoreTransaction>,
    ) -> CoreResult<()>;

    fn create_transaction(&self) -> CoreResult<Box<dyn CoreTransaction>>;

    /// Creates a destination that lives no longer than this connection.
    fn create_temporary_destination(&self, kind: DestinationKind, address: &DestinationAddress) -> CoreResult<()>;

    fn delete_temporary_destination(&self, address: &DestinationAddress) -> CoreResult<()>;

    fn close(&self) -> CoreResult<()>;
}
