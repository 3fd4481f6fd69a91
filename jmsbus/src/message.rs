//! JMS messages as seen by producers.
//!
//! The destination and reply-to headers are carried in their binary form,
//! together with the few fields that the chosen encoding level leaves out.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

use jmsbus_codec::{Destination, EncodingLevel};

use crate::error::{JmsError, Result};
use crate::types::{DeliveryMode, Priority, TimeToLive, TimestampMillis, DEFAULT_PRIORITY};

pub const MESSAGE_ID_PREFIX: &str = "ID:";

/// Value of an application property.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// JMSDestination in minimal binary form plus the name fields that form omits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationHeader {
    pub bytes: Bytes,
    pub name: Option<String>,
    pub discrim: Option<String>,
    pub bus_name: Option<String>,
}

/// JMSReplyTo in partial binary form plus the reply routing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyToHeader {
    pub bytes: Bytes,
    pub priority: Option<Priority>,
    pub time_to_live: Option<TimeToLive>,
    pub routing_path: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct Message {
    body: Bytes,
    properties: BTreeMap<String, Value>,

    message_id: Option<String>,
    timestamp: TimestampMillis,
    correlation_id: Option<String>,
    jms_type: Option<String>,
    delivery_mode: DeliveryMode,
    priority: Priority,
    expiration: TimestampMillis,
    delivery_time: TimestampMillis,
    destination: Option<DestinationHeader>,
    reply_to: Option<ReplyToHeader>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            body: Bytes::new(),
            properties: BTreeMap::new(),
            message_id: None,
            timestamp: 0,
            correlation_id: None,
            jms_type: None,
            delivery_mode: DeliveryMode::default(),
            priority: DEFAULT_PRIORITY,
            expiration: 0,
            delivery_time: 0,
            destination: None,
            reply_to: None,
        }
    }
}

impl Message {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_body<B: Into<Bytes>>(body: B) -> Self {
        Self { body: body.into(), ..Default::default() }
    }

    #[inline]
    pub fn text(text: &str) -> Self {
        Self::with_body(Bytes::copy_from_slice(text.as_bytes()))
    }

    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    #[inline]
    pub fn set_body<B: Into<Bytes>>(&mut self, body: B) {
        self.body = body.into();
    }

    pub fn body_text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body).map_err(|e| JmsError::MessageFormat(e.to_string()))
    }

    pub fn set_property<V: Into<Value>>(&mut self, name: &str, value: V) -> Result<()> {
        if name.is_empty() {
            return Err(JmsError::Jms("property name must not be empty".into()));
        }
        self.properties.insert(name.to_owned(), value.into());
        Ok(())
    }

    #[inline]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn string_property(&self, name: &str) -> Option<String> {
        self.properties.get(name).map(|v| v.to_string())
    }

    pub fn int_property(&self, name: &str) -> Result<Option<i32>> {
        match self.properties.get(name) {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(*i)),
            Some(Value::Str(s)) => s.parse().map(Some).map_err(|_| format_error(name, "int")),
            Some(_) => Err(format_error(name, "int")),
        }
    }

    pub fn long_property(&self, name: &str) -> Result<Option<i64>> {
        match self.properties.get(name) {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(i64::from(*i))),
            Some(Value::Long(l)) => Ok(Some(*l)),
            Some(Value::Str(s)) => s.parse().map(Some).map_err(|_| format_error(name, "long")),
            Some(_) => Err(format_error(name, "long")),
        }
    }

    pub fn bool_property(&self, name: &str) -> Result<Option<bool>> {
        match self.properties.get(name) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::Str(s)) => Ok(Some(s.eq_ignore_ascii_case("true"))),
            Some(_) => Err(format_error(name, "boolean")),
        }
    }

    #[inline]
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    #[inline]
    pub fn clear_properties(&mut self) {
        self.properties.clear();
    }

    #[inline]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    #[inline]
    pub(crate) fn set_message_id(&mut self, id: Option<String>) {
        self.message_id = id;
    }

    #[inline]
    pub fn timestamp(&self) -> TimestampMillis {
        self.timestamp
    }

    #[inline]
    pub(crate) fn set_timestamp(&mut self, timestamp: TimestampMillis) {
        self.timestamp = timestamp;
    }

    #[inline]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    #[inline]
    pub fn set_correlation_id(&mut self, id: Option<&str>) {
        self.correlation_id = id.map(ToOwned::to_owned);
    }

    #[inline]
    pub fn jms_type(&self) -> Option<&str> {
        self.jms_type.as_deref()
    }

    #[inline]
    pub fn set_jms_type(&mut self, jms_type: Option<&str>) {
        self.jms_type = jms_type.map(ToOwned::to_owned);
    }

    #[inline]
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery_mode
    }

    #[inline]
    pub(crate) fn set_delivery_mode(&mut self, mode: DeliveryMode) {
        self.delivery_mode = mode;
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    #[inline]
    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    /// Zero when the message never expires.
    #[inline]
    pub fn expiration(&self) -> TimestampMillis {
        self.expiration
    }

    #[inline]
    pub(crate) fn set_expiration(&mut self, expiration: TimestampMillis) {
        self.expiration = expiration;
    }

    #[inline]
    pub fn delivery_time(&self) -> TimestampMillis {
        self.delivery_time
    }

    #[inline]
    pub(crate) fn set_delivery_time(&mut self, delivery_time: TimestampMillis) {
        self.delivery_time = delivery_time;
    }

    #[inline]
    pub fn destination_header(&self) -> Option<&DestinationHeader> {
        self.destination.as_ref()
    }

    pub(crate) fn set_destination(&mut self, dest: &Destination) -> Result<()> {
        self.destination = Some(DestinationHeader {
            bytes: dest.to_bytes(EncodingLevel::Minimal)?,
            name: dest.dest_name(),
            discrim: dest.dest_discrim(),
            bus_name: dest.bus_name(),
        });
        Ok(())
    }

    /// The destination this message was last sent to.
    pub fn destination(&self) -> Result<Option<Destination>> {
        let Some(header) = self.destination.as_ref() else {
            return Ok(None);
        };
        let dest = Destination::from_bytes(&header.bytes)?;
        if let Some(name) = header.name.as_deref() {
            dest.set_dest_name(name)?;
        }
        dest.set_dest_discrim(header.discrim.as_deref());
        dest.set_bus_name(header.bus_name.as_deref());
        Ok(Some(dest))
    }

    #[inline]
    pub fn reply_to_header(&self) -> Option<&ReplyToHeader> {
        self.reply_to.as_ref()
    }

    pub fn set_reply_to(&mut self, dest: Option<&Destination>) -> Result<()> {
        self.reply_to = match dest {
            None => None,
            Some(dest) => Some(ReplyToHeader {
                bytes: dest.to_bytes(EncodingLevel::Partial)?,
                priority: dest.priority(),
                time_to_live: dest.time_to_live(),
                routing_path: dest.forward_routing_path(),
            }),
        };
        Ok(())
    }

    /// Rebuilds the reply destination, restoring the fields its partial
    /// encoding dropped.
    pub fn reply_to(&self) -> Result<Option<Destination>> {
        let Some(header) = self.reply_to.as_ref() else {
            return Ok(None);
        };
        let dest = Destination::from_bytes(&header.bytes)?;
        if let Some(priority) = header.priority {
            dest.set_priority(priority)?;
        }
        if let Some(ttl) = header.time_to_live {
            dest.set_time_to_live(ttl)?;
        }
        dest.set_forward_routing_path(header.routing_path.clone());
        Ok(Some(dest))
    }
}

#[inline]
fn format_error(name: &str, to: &str) -> JmsError {
    JmsError::MessageFormat(format!("property `{name}` cannot be read as {to}"))
}
