#![deny(unsafe_code)]

//! JMS 2.0 adaptation layer over a messaging bus core
//!
//! ## Core Features:
//! - **Destinations**: Queues and topics with bus-specific properties, in binary and URI form (see [`jmsbus_codec`])
//! - **Producers**: Synchronous and asynchronous sends, with destination settings overriding producer defaults
//! - **Async Send Coordination**: Synchronous operations wait until the producer's outstanding asynchronous sends drain
//! - **Exception Delivery**: Per-connection FIFO delivery to the exception listener on a shared thread pool
//! - **Transactions**: Lazily started core transactions per transacted session
//! - **Temporary Destinations**: Connection-scoped queues and topics in the reserved `_` name space
//!
//! ## Architecture Components:
//! - `connection::Connection`: Sessions, client id, exception listener and lifecycle
//! - `session::Session`: Producers, destinations, transactions and the asynchronous send worker
//! - `producer::MessageProducer`: Send variants and header population
//! - `context::JmsContext`: The simplified API
//! - `spi`: The core this layer drives
//!
//! ## Usage Example:
//! ```rust,ignore
//! use std::sync::Arc;
//! use jmsbus::{AckMode, Connection, Message};
//!
//! let conn = Connection::new(Arc::new(core));
//! let session = conn.create_session(false, AckMode::Auto)?;
//! let queue = session.create_queue("queue://orders?priority=7")?;
//! let producer = session.create_producer(Some(&queue))?;
//! producer.send(&mut Message::text("hello"))?;
//! conn.close()?;
//! ```

pub use jmsbus_codec as codec;
pub use jmsbus_conf as conf;
pub use jmsbus_utils as utils;

pub use jmsbus_codec::{Destination, DestinationAddress, DestinationKind, EncodingLevel, QueueManagerPolicy};

/// Connections and their lifecycle
pub mod connection;

/// Simplified API
pub mod context;

/// Error types
pub mod error;

/// Connection exception delivery
pub mod exception;

mod executor;

/// Log facade to slog bridge
#[cfg(feature = "logger")]
pub mod logger;

/// Messages and their headers
pub mod message;

/// Message producers
pub mod producer;

/// Sessions
pub mod session;

/// Interfaces implemented by the messaging core
pub mod spi;

/// Common types
pub mod types;

#[cfg(test)]
mod testing;

pub use connection::{Connection, ConnectionState};
pub use context::{JmsContext, JmsProducer};
pub use error::{JmsError, Result};
pub use exception::ConnectionListener;
pub use message::Message;
pub use producer::MessageProducer;
pub use session::Session;
pub use types::{AckMode, CompletionListener, DeliveryMode, ExceptionListener};
