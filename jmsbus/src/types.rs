use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use jmsbus_codec::property::values;

use crate::error::{JmsError, Result};
use crate::message::Message;

pub type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;

pub type SessionId = u64;
pub type ProducerId = u64;
pub type Priority = i32;
pub type TimeToLive = i64;
pub use jmsbus_utils::TimestampMillis;

pub const DEFAULT_PRIORITY: Priority = 4;
pub const DEFAULT_TIME_TO_LIVE: TimeToLive = 0;
pub const DEFAULT_DELIVERY_DELAY: i64 = 0;

#[inline]
pub(crate) fn next_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryMode {
    #[default]
    Persistent,
    NonPersistent,
}

impl DeliveryMode {
    /// The override a destination's `deliveryMode` property asks for, if any.
    pub fn from_destination(mode: &str) -> Option<Self> {
        match mode {
            values::DELIVERY_MODE_PERSISTENT => Some(DeliveryMode::Persistent),
            values::DELIVERY_MODE_NONPERSISTENT => Some(DeliveryMode::NonPersistent),
            _ => None,
        }
    }

    /// JMS integer form: 2 persistent, 1 non persistent.
    #[inline]
    pub fn as_i32(&self) -> i32 {
        match self {
            DeliveryMode::Persistent => 2,
            DeliveryMode::NonPersistent => 1,
        }
    }
}

impl TryFrom<i32> for DeliveryMode {
    type Error = JmsError;

    fn try_from(mode: i32) -> Result<Self> {
        match mode {
            2 => Ok(DeliveryMode::Persistent),
            1 => Ok(DeliveryMode::NonPersistent),
            _ => Err(JmsError::Jms(format!("invalid delivery mode {mode}"))),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Persistent => write!(f, "{}", values::DELIVERY_MODE_PERSISTENT),
            DeliveryMode::NonPersistent => write!(f, "{}", values::DELIVERY_MODE_NONPERSISTENT),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckMode {
    #[default]
    Auto,
    Client,
    DupsOk,
    /// Set for transacted sessions.
    Transacted,
}

/// Delivery parameters applied to a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendParams {
    pub delivery_mode: DeliveryMode,
    pub priority: Priority,
    pub time_to_live: TimeToLive,
}

impl Default for SendParams {
    #[inline]
    fn default() -> Self {
        Self { delivery_mode: DeliveryMode::default(), priority: DEFAULT_PRIORITY, time_to_live: DEFAULT_TIME_TO_LIVE }
    }
}

impl SendParams {
    pub(crate) fn validate(&self) -> Result<()> {
        if !(0..=9).contains(&self.priority) {
            return Err(JmsError::Jms(format!("invalid priority {}", self.priority)));
        }
        if self.time_to_live < 0 {
            return Err(JmsError::Jms(format!("invalid time to live {}", self.time_to_live)));
        }
        Ok(())
    }
}

/// Receives the outcome of an asynchronous send.
pub trait CompletionListener: Send + Sync {
    fn on_completion(&self, message: &Message);

    fn on_exception(&self, message: &Message, err: &JmsError);
}

/// Receives problems that the connection could not report to any caller.
pub trait ExceptionListener: Send + Sync {
    fn on_exception(&self, err: &JmsError);
}

impl<F> ExceptionListener for F
where
    F: Fn(&JmsError) + Send + Sync,
{
    #[inline]
    fn on_exception(&self, err: &JmsError) {
        self(err)
    }
}

pub type CompletionListenerRef = Arc<dyn CompletionListener>;
pub type ExceptionListenerRef = Arc<dyn ExceptionListener>;
