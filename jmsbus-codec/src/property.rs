//! Destination property metadata.
//!
//! The registry is built once, on first use, and never changes afterwards.
//! Every property that can appear in the binary form of a destination is
//! registered here together with its wire name, value type, default value
//! and the coder that writes and reads it.

use std::collections::BTreeMap;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::destination::DestinationKind;
use crate::error::{DecodeError, DestinationError, EncodeError};
use crate::utils::{Decode, Encode};

type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;

/// Property names.
pub mod names {
    pub const PRIORITY: &str = "priority";
    pub const DELIVERY_MODE: &str = "deliveryMode";
    pub const TIME_TO_LIVE: &str = "timeToLive";
    pub const READ_AHEAD: &str = "readAhead";
    pub const TOPIC_NAME: &str = "topicName";
    pub const TOPIC_SPACE: &str = "topicSpace";
    pub const QUEUE_NAME: &str = "queueName";
    pub const BUS_NAME: &str = "busName";
    pub const BLOCKED_DESTINATION: &str = "blockedDestinationCode";
    pub const DEST_NAME: &str = "destName";
    pub const DEST_DISCRIM: &str = "destDiscrim";
    pub const SCOPE_TO_LOCAL_QP: &str = "scopeToLocalQP";
    pub const PRODUCER_PREFER_LOCAL: &str = "producerPreferLocal";
    pub const PRODUCER_BIND: &str = "producerBind";
    pub const GATHER_MESSAGES: &str = "gatherMessages";

    // Held on a destination but never part of its binary form.
    pub const FORWARD_ROUTING_PATH: &str = "forwardRoutingPath";
    pub const REVERSE_ROUTING_PATH: &str = "reverseRoutingPath";

    // Legacy names accepted by the URI parser.
    pub const EXPIRY: &str = "expiry";
    pub const PERSISTENCE: &str = "persistence";
}

/// Property value vocabularies.
pub mod values {
    pub const DELIVERY_MODE_APP: &str = "Application";
    pub const DELIVERY_MODE_PERSISTENT: &str = "Persistent";
    pub const DELIVERY_MODE_NONPERSISTENT: &str = "NonPersistent";

    pub const READ_AHEAD_AS_CONNECTION: &str = "AsConnection";
    pub const READ_AHEAD_ON: &str = "AlwaysOn";
    pub const READ_AHEAD_OFF: &str = "AlwaysOff";

    pub const ON: &str = "On";
    pub const OFF: &str = "Off";

    pub const DEFAULT_TOPIC_SPACE: &str = "Default.Topic.Space";

    pub const DELIVERY_MODES: [&str; 3] = [DELIVERY_MODE_APP, DELIVERY_MODE_PERSISTENT, DELIVERY_MODE_NONPERSISTENT];
    pub const READ_AHEAD_MODES: [&str; 3] = [READ_AHEAD_AS_CONNECTION, READ_AHEAD_ON, READ_AHEAD_OFF];
    pub const ON_OFF: [&str; 2] = [ON, OFF];
}

/// Marker that introduces an entry whose property has no short wire name.
pub const LONG_NAME_MARKER: u8 = b'*';

/// Separator between the segments of a routing path.
pub const PATH_SEPARATOR: &str = "<#>";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyValue {
    Str(String),
    Int(i32),
    Long(i64),
    Bool(bool),
    Path(Vec<String>),
}

impl PropertyValue {
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_path(&self) -> Option<&[String]> {
        match self {
            PropertyValue::Path(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => f.write_str(s),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Path(p) => f.write_str(&p.join(PATH_SEPARATOR)),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Str,
    Int,
    Long,
}

/// Selects the typed setter a decoded or parsed property is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseTag {
    Priority,
    DeliveryMode,
    TimeToLive,
    ReadAhead,
    TopicName,
    TopicSpace,
    QueueName,
    BusName,
    BlockedCode,
    DestName,
    DestDiscrim,
    ScopeToLocalQp,
    ProducerPreferLocal,
    ProducerBind,
    GatherMessages,
}

/// How a single property is written to and read from the binary form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyCoder {
    /// Two byte short name, then the length-prefixed UTF-8 value.
    ShortString { long: &'static str, short: &'static str },
    /// `*`, the length-prefixed long name, then the length-prefixed value.
    PlainString { long: &'static str },
    /// An integer carried as its decimal string.
    Integer { long: &'static str, short: &'static str },
    /// `On` or `Off`.
    OnOff { long: &'static str, short: &'static str },
    /// One of the three read-ahead tokens.
    ReadAhead { long: &'static str, short: &'static str },
    /// Carried in the header bytes, never as an entry.
    Phantom { long: &'static str, short: &'static str },
}

impl PropertyCoder {
    #[inline]
    pub fn long_name(&self) -> &'static str {
        match *self {
            PropertyCoder::ShortString { long, .. }
            | PropertyCoder::PlainString { long }
            | PropertyCoder::Integer { long, .. }
            | PropertyCoder::OnOff { long, .. }
            | PropertyCoder::ReadAhead { long, .. }
            | PropertyCoder::Phantom { long, .. } => long,
        }
    }

    #[inline]
    pub fn short_name(&self) -> Option<&'static str> {
        match *self {
            PropertyCoder::PlainString { .. } => None,
            PropertyCoder::ShortString { short, .. }
            | PropertyCoder::Integer { short, .. }
            | PropertyCoder::OnOff { short, .. }
            | PropertyCoder::ReadAhead { short, .. }
            | PropertyCoder::Phantom { short, .. } => Some(short),
        }
    }

    /// Appends the `(name, value)` entry for this property.
    pub(crate) fn encode(&self, value: &PropertyValue, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let long = self.long_name();
        let text = match (self, value) {
            (PropertyCoder::Phantom { .. }, _) => return Err(EncodeError::UnknownProperty(long.into())),
            (PropertyCoder::ShortString { .. } | PropertyCoder::PlainString { .. }, PropertyValue::Str(s)) => {
                s.clone()
            }
            (PropertyCoder::Integer { .. }, PropertyValue::Int(v)) => v.to_string(),
            (PropertyCoder::OnOff { .. }, PropertyValue::Str(s)) if values::ON_OFF.contains(&s.as_str()) => {
                s.clone()
            }
            (PropertyCoder::ReadAhead { .. }, PropertyValue::Str(s))
                if values::READ_AHEAD_MODES.contains(&s.as_str()) =>
            {
                s.clone()
            }
            (_, v) => return Err(EncodeError::InvalidValue { name: long, value: v.to_string() }),
        };

        match self.short_name() {
            Some(short) => buf.put_slice(short.as_bytes()),
            None => {
                buf.put_u8(LONG_NAME_MARKER);
                long.encode(buf)?;
            }
        }
        text.encode(buf)
    }

    /// Reads the value part of an entry; the name has already been consumed.
    pub(crate) fn decode(&self, src: &mut Bytes) -> Result<PropertyValue, DecodeError> {
        let long = self.long_name();
        match self {
            PropertyCoder::Phantom { .. } => Err(DecodeError::UnexpectedPhantom(long)),
            PropertyCoder::ShortString { .. } | PropertyCoder::PlainString { .. } => {
                Ok(PropertyValue::Str(String::decode(src)?))
            }
            PropertyCoder::Integer { .. } => {
                let text = String::decode(src)?;
                let v = text.parse::<i32>().map_err(|_| DestinationError::invalid(long, &text))?;
                Ok(PropertyValue::Int(v))
            }
            PropertyCoder::OnOff { .. } => {
                let text = String::decode(src)?;
                ensure!(values::ON_OFF.contains(&text.as_str()), DestinationError::invalid(long, text).into());
                Ok(PropertyValue::Str(text))
            }
            PropertyCoder::ReadAhead { .. } => {
                let text = String::decode(src)?;
                ensure!(values::READ_AHEAD_MODES.contains(&text.as_str()), DestinationError::invalid(long, text).into());
                Ok(PropertyValue::Str(text))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyEntry {
    pub tag: CaseTag,
    pub ty: PropertyType,
    pub default: Option<PropertyValue>,
    pub coder: PropertyCoder,
}

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::build);

/// The table of every property that can be wire encoded.
pub struct Registry {
    entries: HashMap<&'static str, PropertyEntry>,
    // wire name (short name, or long name for `*` entries) -> long name
    reverse: HashMap<&'static str, &'static str>,
    jndi_defaults: HashMap<(DestinationKind, &'static str), PropertyValue>,
}

impl Registry {
    #[inline]
    pub fn instance() -> &'static Registry {
        &REGISTRY
    }

    fn build() -> Registry {
        use self::names::*;
        use self::values::*;
        use DestinationKind::{Queue, Topic};

        let mut r = Registry {
            entries: HashMap::default(),
            reverse: HashMap::default(),
            jndi_defaults: HashMap::default(),
        };

        r.register(
            PropertyCoder::Phantom { long: PRIORITY, short: "pr" },
            CaseTag::Priority,
            PropertyType::Int,
            None,
            &[],
        );
        r.register(
            PropertyCoder::Phantom { long: DELIVERY_MODE, short: "dm" },
            CaseTag::DeliveryMode,
            PropertyType::Str,
            Some(DELIVERY_MODE_APP.into()),
            &[Queue, Topic],
        );
        r.register(
            PropertyCoder::Phantom { long: TIME_TO_LIVE, short: "tl" },
            CaseTag::TimeToLive,
            PropertyType::Long,
            None,
            &[],
        );
        r.register(
            PropertyCoder::ReadAhead { long: READ_AHEAD, short: "ra" },
            CaseTag::ReadAhead,
            PropertyType::Str,
            Some(READ_AHEAD_AS_CONNECTION.into()),
            &[Queue, Topic],
        );
        r.register(
            PropertyCoder::ShortString { long: TOPIC_NAME, short: "tn" },
            CaseTag::TopicName,
            PropertyType::Str,
            None,
            &[],
        );
        r.register(
            PropertyCoder::ShortString { long: TOPIC_SPACE, short: "ts" },
            CaseTag::TopicSpace,
            PropertyType::Str,
            Some(DEFAULT_TOPIC_SPACE.into()),
            &[Topic],
        );
        r.register(
            PropertyCoder::ShortString { long: QUEUE_NAME, short: "qn" },
            CaseTag::QueueName,
            PropertyType::Str,
            None,
            &[],
        );
        r.register(PropertyCoder::PlainString { long: BUS_NAME }, CaseTag::BusName, PropertyType::Str, None, &[]);
        r.register(
            PropertyCoder::Integer { long: BLOCKED_DESTINATION, short: "bc" },
            CaseTag::BlockedCode,
            PropertyType::Int,
            None,
            &[],
        );
        r.register(
            PropertyCoder::ShortString { long: DEST_NAME, short: "dn" },
            CaseTag::DestName,
            PropertyType::Str,
            None,
            &[],
        );
        r.register(
            PropertyCoder::ShortString { long: DEST_DISCRIM, short: "dd" },
            CaseTag::DestDiscrim,
            PropertyType::Str,
            None,
            &[],
        );
        r.register(
            PropertyCoder::OnOff { long: SCOPE_TO_LOCAL_QP, short: "sl" },
            CaseTag::ScopeToLocalQp,
            PropertyType::Str,
            Some(OFF.into()),
            &[Queue],
        );
        r.register(
            PropertyCoder::OnOff { long: PRODUCER_PREFER_LOCAL, short: "pl" },
            CaseTag::ProducerPreferLocal,
            PropertyType::Str,
            Some(ON.into()),
            &[Queue],
        );
        r.register(
            PropertyCoder::OnOff { long: PRODUCER_BIND, short: "pb" },
            CaseTag::ProducerBind,
            PropertyType::Str,
            Some(OFF.into()),
            &[Queue],
        );
        r.register(
            PropertyCoder::OnOff { long: GATHER_MESSAGES, short: "gm" },
            CaseTag::GatherMessages,
            PropertyType::Str,
            Some(OFF.into()),
            &[Queue],
        );
        r
    }

    fn register(
        &mut self,
        coder: PropertyCoder,
        tag: CaseTag,
        ty: PropertyType,
        default: Option<PropertyValue>,
        suppress_for: &[DestinationKind],
    ) {
        let long = coder.long_name();
        for kind in suppress_for {
            if let Some(default) = default.as_ref() {
                self.jndi_defaults.insert((*kind, long), default.clone());
            }
        }
        self.reverse.insert(coder.short_name().unwrap_or(long), long);
        self.entries.insert(long, PropertyEntry { tag, ty, default, coder });
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[inline]
    pub fn entry(&self, name: &str) -> Result<&PropertyEntry, DestinationError> {
        self.entries.get(name).ok_or_else(|| DestinationError::UnknownProperty(name.into()))
    }

    /// Default of a registered property; `None` for unregistered names and
    /// for properties whose default is "unset".
    #[inline]
    pub fn default_value_of(&self, name: &str) -> Option<&PropertyValue> {
        self.entries.get(name).and_then(|e| e.default.as_ref())
    }

    #[inline]
    pub fn type_of(&self, name: &str) -> Result<PropertyType, DestinationError> {
        self.entry(name).map(|e| e.ty)
    }

    /// Converts the textual form of a property value to its registered type.
    pub fn convert(&self, name: &str, text: &str) -> Result<PropertyValue, DestinationError> {
        match self.type_of(name)? {
            PropertyType::Str => Ok(PropertyValue::Str(text.to_owned())),
            PropertyType::Int => {
                text.trim().parse::<i32>().map(PropertyValue::Int).map_err(|_| DestinationError::invalid(name, text))
            }
            PropertyType::Long => {
                text.trim().parse::<i64>().map(PropertyValue::Long).map_err(|_| DestinationError::invalid(name, text))
            }
        }
    }

    /// Resolves the name found in an encoded entry to the long property name.
    #[inline]
    pub fn long_name_for(&self, wire_name: &str) -> Option<&'static str> {
        self.reverse.get(wire_name).copied()
    }

    /// Properties omitted from a naming-service reference when they hold
    /// their default value, and re-inserted when the reference is loaded.
    pub fn default_jndi_properties(&self, kind: DestinationKind) -> BTreeMap<String, PropertyValue> {
        self.jndi_defaults
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, name), v)| ((*name).to_owned(), v.clone()))
            .collect()
    }
}
