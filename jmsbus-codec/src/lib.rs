#![deny(unsafe_code)]

//! Codec for JMS destinations
//!
//! ## Core Features:
//! - **Property Registry**: Build-once table of every wire-encodable destination property
//! - **Binary Form**: Compact, byte-stable encoding embedded in messages, at three encoding levels
//! - **URI Form**: `queue://` / `topic://` parsing and printing with backslash escaping
//! - **Cached Derivations**: Encoded forms are cached per destination and invalidated by a generation counter
//!
//! ## Architecture Components:
//! - `property::Registry`: Long name, short wire name, type, default and coder of each property
//! - `destination::Destination`: Queue or topic, with validated setters
//! - `encode` / `decode`: Binary form
//! - `uri::UriParser`: Textual form with configurable queue-manager handling
//!

#[macro_use]
mod utils;

/// Error types for destinations and their encodings
pub mod error;

/// Destination property registry
pub mod property;

/// Queue and topic destinations
pub mod destination;

/// Binary encoder
pub mod encode;

mod decode;

/// URI parsing, printing and escaping
pub mod uri;

pub use destination::{Destination, DestinationAddress, DestinationKind};
pub use encode::EncodingLevel;
pub use uri::{QueueManagerPolicy, UriParser};
