use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::encode::{self, EncodingLevel};
use crate::error::{DecodeError, DestinationError, EncodeError};
use crate::property::{names, values, CaseTag, PropertyValue, Registry, PATH_SEPARATOR};
use crate::uri;

/// Upper bound of a destination time to live, in milliseconds.
pub const MAX_TIME_TO_LIVE: i64 = 290_000_000_000_000;

/// Passing this to the priority or time-to-live setters clears the property.
pub const USE_DEFAULT: i64 = -2;

pub const MAX_PRIORITY: i32 = 9;

/// Blocked code set by the core when the reply data of a routing path is missing.
pub const BLOCKED_REPLY_DATA_MISSING: i32 = 1;

pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DestinationKind {
    Queue,
    Topic,
}

impl DestinationKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::Queue => "queue",
            DestinationKind::Topic => "topic",
        }
    }

    /// Whether a property selected by `tag` is meaningful for this kind.
    #[inline]
    pub(crate) fn accepts(&self, tag: CaseTag) -> bool {
        match tag {
            CaseTag::TopicName | CaseTag::TopicSpace => *self == DestinationKind::Topic,
            CaseTag::QueueName
            | CaseTag::ScopeToLocalQp
            | CaseTag::ProducerPreferLocal
            | CaseTag::ProducerBind
            | CaseTag::GatherMessages => *self == DestinationKind::Queue,
            _ => true,
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The address the core uses to route messages sent to a destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationAddress {
    pub name: String,
    pub local_only: bool,
    pub bus_name: Option<String>,
}

impl fmt::Display for DestinationAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.bus_name {
            Some(bus) => write!(f, "{}:{}", bus, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone)]
struct Cached<T> {
    generation: u64,
    value: T,
}

#[derive(Debug, Default, Clone)]
struct Caches {
    full: Option<Cached<Bytes>>,
    partial: Option<Cached<Bytes>>,
    minimal: Option<Cached<Bytes>>,
    uri: Option<Cached<String>>,
    partial_uri: Option<Cached<String>>,
    producer_address: Option<Cached<DestinationAddress>>,
}

#[derive(Debug, Clone)]
struct State {
    props: Properties,
    generation: u64,
    caches: Caches,
}

impl State {
    fn update(&mut self, name: &str, value: Option<PropertyValue>) {
        let changed = match value {
            Some(v) => {
                if self.props.get(name) == Some(&v) {
                    false
                } else {
                    self.props.insert(name.to_owned(), v);
                    true
                }
            }
            None => self.props.remove(name).is_some(),
        };
        if changed {
            self.generation += 1;
        }
    }

    #[inline]
    fn str(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(|v| v.as_str())
    }
}

/// Returns the cached value from `slot` if it was computed at the current
/// generation, otherwise computes and stores it.
fn cached<T, E, F>(slot: &mut Option<Cached<T>>, generation: u64, f: F) -> Result<T, E>
where
    T: Clone,
    F: FnOnce() -> Result<T, E>,
{
    if let Some(c) = slot.as_ref() {
        if c.generation == generation {
            return Ok(c.value.clone());
        }
    }
    let value = f()?;
    *slot = Some(Cached { generation, value: value.clone() });
    Ok(value)
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A JMS queue or topic, described by its property set.
///
/// All access goes through one lock so that a property change and the
/// invalidation of everything derived from it are atomic. Derived forms are
/// recomputed lazily when the generation they were cached at is stale.
pub struct Destination {
    id: u64,
    kind: DestinationKind,
    state: Mutex<State>,
}

impl Destination {
    fn with_defaults(kind: DestinationKind) -> Self {
        let mut props = Properties::new();
        props.insert(names::DELIVERY_MODE.into(), values::DELIVERY_MODE_APP.into());
        props.insert(names::READ_AHEAD.into(), values::READ_AHEAD_AS_CONNECTION.into());
        if kind == DestinationKind::Topic {
            props.insert(names::DEST_NAME.into(), values::DEFAULT_TOPIC_SPACE.into());
        }
        Self::from_parts(kind, props)
    }

    fn from_parts(kind: DestinationKind, props: Properties) -> Self {
        Destination {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            state: Mutex::new(State { props, generation: 0, caches: Caches::default() }),
        }
    }

    /// An unnamed destination of the given kind holding only default properties.
    #[inline]
    pub fn new(kind: DestinationKind) -> Self {
        Self::with_defaults(kind)
    }

    pub fn queue(name: &str) -> Result<Self, DestinationError> {
        let d = Self::with_defaults(DestinationKind::Queue);
        d.set_dest_name(name)?;
        Ok(d)
    }

    /// A topic in the default topic space.
    pub fn topic(name: &str) -> Result<Self, DestinationError> {
        let d = Self::with_defaults(DestinationKind::Topic);
        d.set_topic_name(Some(name))?;
        Ok(d)
    }

    /// Rebuilds a destination from its binary form.
    #[inline]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        crate::decode::decode(bytes)
    }

    #[inline]
    pub fn kind(&self) -> DestinationKind {
        self.kind
    }

    #[inline]
    pub fn is_queue(&self) -> bool {
        self.kind == DestinationKind::Queue
    }

    #[inline]
    pub fn is_topic(&self) -> bool {
        self.kind == DestinationKind::Topic
    }

    /// Snapshot of the property set.
    #[inline]
    pub fn properties(&self) -> Properties {
        self.state.lock().props.clone()
    }

    #[inline]
    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.state.lock().props.get(name).cloned()
    }

    /// Stores `value` under `name`, or removes it when `value` is `None`.
    /// Derived forms are invalidated only if the stored value changes.
    #[inline]
    fn update_property(&self, name: &str, value: Option<PropertyValue>) {
        self.state.lock().update(name, value);
    }

    fn on_off(&self, name: &'static str, value: &str) -> Result<(), DestinationError> {
        if !values::ON_OFF.contains(&value) {
            return Err(DestinationError::invalid(name, value));
        }
        self.update_property(name, Some(value.into()));
        Ok(())
    }

    #[inline]
    pub fn dest_name(&self) -> Option<String> {
        self.state.lock().str(names::DEST_NAME).map(ToOwned::to_owned)
    }

    /// True for names in the reserved space used by temporary destinations.
    #[inline]
    pub fn is_temporary(&self) -> bool {
        self.state.lock().str(names::DEST_NAME).is_some_and(|n| n.starts_with(uri::RESERVED_PREFIX))
    }

    pub fn set_dest_name(&self, name: &str) -> Result<(), DestinationError> {
        if name.is_empty() {
            return Err(DestinationError::invalid(names::DEST_NAME, name));
        }
        self.update_property(names::DEST_NAME, Some(name.into()));
        Ok(())
    }

    #[inline]
    pub fn dest_discrim(&self) -> Option<String> {
        self.state.lock().str(names::DEST_DISCRIM).map(ToOwned::to_owned)
    }

    pub fn set_dest_discrim(&self, discrim: Option<&str>) {
        let value = discrim.filter(|d| !d.is_empty()).map(PropertyValue::from);
        self.update_property(names::DEST_DISCRIM, value);
    }

    /// The queue name; `None` for a topic.
    #[inline]
    pub fn queue_name(&self) -> Option<String> {
        if self.is_queue() {
            self.dest_name()
        } else {
            None
        }
    }

    pub fn set_queue_name(&self, name: &str) -> Result<(), DestinationError> {
        self.expect_kind(DestinationKind::Queue, names::QUEUE_NAME)?;
        self.set_dest_name(name)
    }

    #[inline]
    pub fn topic_space(&self) -> Option<String> {
        if self.is_topic() {
            self.dest_name()
        } else {
            None
        }
    }

    /// Sets the topic space; an empty or absent value selects the default space.
    pub fn set_topic_space(&self, space: Option<&str>) -> Result<(), DestinationError> {
        self.expect_kind(DestinationKind::Topic, names::TOPIC_SPACE)?;
        let space = space.filter(|s| !s.is_empty()).unwrap_or(values::DEFAULT_TOPIC_SPACE);
        self.set_dest_name(space)
    }

    #[inline]
    pub fn topic_name(&self) -> Option<String> {
        if self.is_topic() {
            self.dest_discrim()
        } else {
            None
        }
    }

    pub fn set_topic_name(&self, name: Option<&str>) -> Result<(), DestinationError> {
        self.expect_kind(DestinationKind::Topic, names::TOPIC_NAME)?;
        self.set_dest_discrim(name);
        Ok(())
    }

    #[inline]
    pub fn delivery_mode(&self) -> String {
        self.state.lock().str(names::DELIVERY_MODE).unwrap_or(values::DELIVERY_MODE_APP).to_owned()
    }

    pub fn set_delivery_mode(&self, mode: &str) -> Result<(), DestinationError> {
        if !values::DELIVERY_MODES.contains(&mode) {
            return Err(DestinationError::invalid(names::DELIVERY_MODE, mode));
        }
        self.update_property(names::DELIVERY_MODE, Some(mode.into()));
        Ok(())
    }

    #[inline]
    pub fn priority(&self) -> Option<i32> {
        self.state.lock().props.get(names::PRIORITY).and_then(|v| v.as_int())
    }

    /// Accepts `0..=9`, or [`USE_DEFAULT`] to clear the override.
    pub fn set_priority(&self, priority: i32) -> Result<(), DestinationError> {
        let value = match priority {
            p if i64::from(p) == USE_DEFAULT => None,
            p if (0..=MAX_PRIORITY).contains(&p) => Some(PropertyValue::Int(p)),
            p => return Err(DestinationError::invalid(names::PRIORITY, p)),
        };
        self.update_property(names::PRIORITY, value);
        Ok(())
    }

    #[inline]
    pub fn time_to_live(&self) -> Option<i64> {
        self.state.lock().props.get(names::TIME_TO_LIVE).and_then(|v| v.as_long())
    }

    /// Accepts `0..=MAX_TIME_TO_LIVE`, or [`USE_DEFAULT`] to clear the override.
    pub fn set_time_to_live(&self, ttl: i64) -> Result<(), DestinationError> {
        let value = match ttl {
            USE_DEFAULT => None,
            t if (0..=MAX_TIME_TO_LIVE).contains(&t) => Some(PropertyValue::Long(t)),
            t => return Err(DestinationError::invalid(names::TIME_TO_LIVE, t)),
        };
        self.update_property(names::TIME_TO_LIVE, value);
        Ok(())
    }

    #[inline]
    pub fn read_ahead(&self) -> String {
        self.state.lock().str(names::READ_AHEAD).unwrap_or(values::READ_AHEAD_AS_CONNECTION).to_owned()
    }

    pub fn set_read_ahead(&self, value: &str) -> Result<(), DestinationError> {
        if !values::READ_AHEAD_MODES.contains(&value) {
            return Err(DestinationError::invalid(names::READ_AHEAD, value));
        }
        self.update_property(names::READ_AHEAD, Some(value.into()));
        Ok(())
    }

    #[inline]
    pub fn bus_name(&self) -> Option<String> {
        self.state.lock().str(names::BUS_NAME).map(ToOwned::to_owned)
    }

    /// An empty bus name is the same as no bus name.
    pub fn set_bus_name(&self, bus: Option<&str>) {
        let value = bus.filter(|b| !b.is_empty()).map(PropertyValue::from);
        self.update_property(names::BUS_NAME, value);
    }

    #[inline]
    pub fn blocked_destination_code(&self) -> Option<i32> {
        self.state.lock().props.get(names::BLOCKED_DESTINATION).and_then(|v| v.as_int())
    }

    pub fn set_blocked_destination_code(&self, code: Option<i32>) {
        self.update_property(names::BLOCKED_DESTINATION, code.map(PropertyValue::Int));
    }

    fn on_off_value(&self, name: &'static str) -> Option<String> {
        let st = self.state.lock();
        st.str(name)
            .or_else(|| Registry::instance().default_value_of(name).and_then(|v| v.as_str()))
            .map(ToOwned::to_owned)
    }

    pub fn scope_to_local_qp(&self) -> Option<String> {
        self.is_queue().then(|| self.on_off_value(names::SCOPE_TO_LOCAL_QP)).flatten()
    }

    pub fn set_scope_to_local_qp(&self, value: &str) -> Result<(), DestinationError> {
        self.expect_kind(DestinationKind::Queue, names::SCOPE_TO_LOCAL_QP)?;
        self.on_off(names::SCOPE_TO_LOCAL_QP, value)
    }

    pub fn producer_prefer_local(&self) -> Option<String> {
        self.is_queue().then(|| self.on_off_value(names::PRODUCER_PREFER_LOCAL)).flatten()
    }

    pub fn set_producer_prefer_local(&self, value: &str) -> Result<(), DestinationError> {
        self.expect_kind(DestinationKind::Queue, names::PRODUCER_PREFER_LOCAL)?;
        self.on_off(names::PRODUCER_PREFER_LOCAL, value)
    }

    pub fn producer_bind(&self) -> Option<String> {
        self.is_queue().then(|| self.on_off_value(names::PRODUCER_BIND)).flatten()
    }

    pub fn set_producer_bind(&self, value: &str) -> Result<(), DestinationError> {
        self.expect_kind(DestinationKind::Queue, names::PRODUCER_BIND)?;
        self.on_off(names::PRODUCER_BIND, value)
    }

    pub fn gather_messages(&self) -> Option<String> {
        self.is_queue().then(|| self.on_off_value(names::GATHER_MESSAGES)).flatten()
    }

    pub fn set_gather_messages(&self, value: &str) -> Result<(), DestinationError> {
        self.expect_kind(DestinationKind::Queue, names::GATHER_MESSAGES)?;
        self.on_off(names::GATHER_MESSAGES, value)
    }

    #[inline]
    pub fn forward_routing_path(&self) -> Option<Vec<String>> {
        self.state.lock().props.get(names::FORWARD_ROUTING_PATH).and_then(|v| v.as_path()).map(|p| p.to_vec())
    }

    /// An empty path is the same as no path.
    pub fn set_forward_routing_path(&self, path: Option<Vec<String>>) {
        let value = path.filter(|p| !p.is_empty()).map(PropertyValue::Path);
        self.update_property(names::FORWARD_ROUTING_PATH, value);
    }

    #[inline]
    pub fn reverse_routing_path(&self) -> Option<Vec<String>> {
        self.state.lock().props.get(names::REVERSE_ROUTING_PATH).and_then(|v| v.as_path()).map(|p| p.to_vec())
    }

    pub fn set_reverse_routing_path(&self, path: Option<Vec<String>>) {
        let value = path.filter(|p| !p.is_empty()).map(PropertyValue::Path);
        self.update_property(names::REVERSE_ROUTING_PATH, value);
    }

    fn expect_kind(&self, kind: DestinationKind, name: &str) -> Result<(), DestinationError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(DestinationError::UnknownProperty(name.into()))
        }
    }

    /// Sets a registered property by name, through the typed setter selected
    /// by its case tag.
    pub fn set_destination_property(&self, name: &str, value: PropertyValue) -> Result<(), DestinationError> {
        let entry = Registry::instance().entry(name)?;
        if !self.kind.accepts(entry.tag) {
            return Err(DestinationError::UnknownProperty(name.into()));
        }
        self.set_by_tag(entry.tag, name, value)
    }

    pub(crate) fn set_by_tag(&self, tag: CaseTag, name: &str, value: PropertyValue) -> Result<(), DestinationError> {
        let bad = |v: &PropertyValue| DestinationError::invalid(name, v);
        match (tag, &value) {
            (CaseTag::Priority, PropertyValue::Int(p)) => self.set_priority(*p),
            (CaseTag::TimeToLive, PropertyValue::Long(t)) => self.set_time_to_live(*t),
            (CaseTag::TimeToLive, PropertyValue::Int(t)) => self.set_time_to_live(i64::from(*t)),
            (CaseTag::BlockedCode, PropertyValue::Int(c)) => {
                self.set_blocked_destination_code(Some(*c));
                Ok(())
            }
            (_, PropertyValue::Str(s)) => match tag {
                CaseTag::DeliveryMode => self.set_delivery_mode(s),
                CaseTag::ReadAhead => self.set_read_ahead(s),
                CaseTag::TopicName => self.set_topic_name(Some(s)),
                CaseTag::TopicSpace => self.set_topic_space(Some(s)),
                CaseTag::QueueName => self.set_queue_name(s),
                CaseTag::BusName => {
                    self.set_bus_name(Some(s));
                    Ok(())
                }
                CaseTag::DestName => self.set_dest_name(s),
                CaseTag::DestDiscrim => {
                    self.set_dest_discrim(Some(s));
                    Ok(())
                }
                CaseTag::ScopeToLocalQp => self.set_scope_to_local_qp(s),
                CaseTag::ProducerPreferLocal => self.set_producer_prefer_local(s),
                CaseTag::ProducerBind => self.set_producer_bind(s),
                CaseTag::GatherMessages => self.set_gather_messages(s),
                CaseTag::Priority | CaseTag::TimeToLive | CaseTag::BlockedCode => Err(bad(&value)),
            },
            _ => Err(bad(&value)),
        }
    }

    /// The binary form at `level`.
    pub fn to_bytes(&self, level: EncodingLevel) -> Result<Bytes, EncodeError> {
        let kind = self.kind;
        let mut st = self.state.lock();
        let State { props, generation, caches } = &mut *st;
        let slot = match level {
            EncodingLevel::Full => &mut caches.full,
            EncodingLevel::Partial => &mut caches.partial,
            EncodingLevel::Minimal => &mut caches.minimal,
        };
        cached(slot, *generation, || encode::encode(kind, props, level))
    }

    /// The `queue://` or `topic://` form carrying every non-default property.
    pub fn to_uri(&self) -> String {
        let kind = self.kind;
        let mut st = self.state.lock();
        let State { props, generation, caches } = &mut *st;
        cached::<_, (), _>(&mut caches.uri, *generation, || Ok(uri::to_uri(kind, props, false)))
            .unwrap_or_default()
    }

    /// As [`Destination::to_uri`], without the name, discriminator, priority,
    /// time to live and routing paths.
    pub fn partial_uri(&self) -> String {
        let kind = self.kind;
        let mut st = self.state.lock();
        let State { props, generation, caches } = &mut *st;
        cached::<_, (), _>(&mut caches.partial_uri, *generation, || Ok(uri::to_uri(kind, props, true)))
            .unwrap_or_default()
    }

    /// Where producers send. The first element of a forward routing path
    /// takes precedence over the destination's own name.
    pub fn producer_address(&self) -> Result<DestinationAddress, DestinationError> {
        let kind = self.kind;
        let mut st = self.state.lock();
        let State { props, generation, caches } = &mut *st;
        cached(&mut caches.producer_address, *generation, || {
            let first_hop =
                props.get(names::FORWARD_ROUTING_PATH).and_then(|v| v.as_path()).and_then(|p| p.first()).cloned();
            let bus_name = props.get(names::BUS_NAME).and_then(|v| v.as_str()).map(ToOwned::to_owned);
            if let Some(name) = first_hop {
                return Ok(DestinationAddress { name, local_only: false, bus_name: None });
            }
            let name = props
                .get(names::DEST_NAME)
                .and_then(|v| v.as_str())
                .ok_or_else(|| DestinationError::invalid(names::DEST_NAME, ""))?
                .to_owned();
            let local_only = kind == DestinationKind::Queue
                && props.get(names::SCOPE_TO_LOCAL_QP).and_then(|v| v.as_str()) == Some(values::ON);
            Ok(DestinationAddress { name, local_only, bus_name })
        })
    }

    /// Fails if the core has marked this destination as blocked.
    pub fn check_blocked_status(&self) -> Result<(), BlockedError> {
        match self.blocked_destination_code() {
            None => Ok(()),
            Some(BLOCKED_REPLY_DATA_MISSING) => Err(BlockedError::ReplyDataMissing(self.to_string())),
            Some(code) => Err(BlockedError::Blocked(code)),
        }
    }

    /// Properties to store in a naming-service reference; those holding the
    /// default for this kind are left out.
    pub fn reference_properties(&self) -> Properties {
        let defaults = jndi_defaults(self.kind);
        self.properties().into_iter().filter(|(k, v)| defaults.get(k) != Some(v)).collect()
    }

    /// Loads a destination from a naming-service reference, restoring the
    /// properties that were left out because they held their default.
    ///
    /// Registered properties go through their typed setters, converting
    /// textual values first. Names the registry does not know are kept on
    /// the destination but never written to its binary or URI form.
    pub fn from_reference_properties(kind: DestinationKind, props: Properties) -> Result<Self, DestinationError> {
        let dest = Self::from_parts(kind, jndi_defaults(kind));
        let registry = Registry::instance();
        for (name, value) in props {
            match name.as_str() {
                names::FORWARD_ROUTING_PATH | names::REVERSE_ROUTING_PATH => {
                    let path = match value {
                        PropertyValue::Path(p) => p,
                        PropertyValue::Str(s) => s.split(PATH_SEPARATOR).map(ToOwned::to_owned).collect(),
                        v => return Err(DestinationError::invalid(&name, v)),
                    };
                    if name == names::FORWARD_ROUTING_PATH {
                        dest.set_forward_routing_path(Some(path));
                    } else {
                        dest.set_reverse_routing_path(Some(path));
                    }
                }
                n if registry.contains(n) => {
                    let value = match value {
                        PropertyValue::Str(s) => registry.convert(n, &s)?,
                        v => v,
                    };
                    dest.set_destination_property(n, value)?;
                }
                _ => {
                    log::debug!("keeping unregistered property {name} on a {kind} loaded from a reference");
                    dest.update_property(&name, Some(value));
                }
            }
        }
        Ok(dest)
    }
}

/// The registry's suppressed defaults, keyed the way a destination stores
/// them: a topic keeps its topic space under `destName`.
fn jndi_defaults(kind: DestinationKind) -> Properties {
    Registry::instance()
        .default_jndi_properties(kind)
        .into_iter()
        .map(|(k, v)| if k == names::TOPIC_SPACE { (names::DEST_NAME.to_owned(), v) } else { (k, v) })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockedError {
    #[error("Destination {0} is blocked because its reply routing data is missing")]
    ReplyDataMissing(String),
    #[error("Destination is blocked, code {0}")]
    Blocked(i32),
}

impl Clone for Destination {
    fn clone(&self) -> Self {
        Self::from_parts(self.kind, self.properties())
    }
}

impl PartialEq for Destination {
    fn eq(&self, other: &Self) -> bool {
        if self.id == other.id {
            return true;
        }
        self.kind == other.kind && self.properties() == other.properties()
    }
}

impl Eq for Destination {}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination").field("kind", &self.kind).field("properties", &self.properties()).finish()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let q = Destination::queue("q1").unwrap();
        assert_eq!(q.delivery_mode(), values::DELIVERY_MODE_APP);
        assert_eq!(q.read_ahead(), values::READ_AHEAD_AS_CONNECTION);
        assert_eq!(q.queue_name().as_deref(), Some("q1"));
        assert_eq!(q.topic_space(), None);
        assert_eq!(q.producer_prefer_local().as_deref(), Some(values::ON));

        let t = Destination::topic("a/b").unwrap();
        assert_eq!(t.topic_space().as_deref(), Some(values::DEFAULT_TOPIC_SPACE));
        assert_eq!(t.topic_name().as_deref(), Some("a/b"));
        assert_eq!(t.gather_messages(), None);

        assert!(!q.is_temporary());
        assert!(Destination::queue("_Q1f2e").unwrap().is_temporary());
        let tt = Destination::new(DestinationKind::Topic);
        tt.set_topic_space(Some("_T9a0b")).unwrap();
        assert!(tt.is_temporary());
    }

    #[test]
    fn test_priority_and_ttl_validation() {
        let q = Destination::queue("q").unwrap();
        q.set_priority(9).unwrap();
        assert_eq!(q.priority(), Some(9));
        assert!(q.set_priority(10).is_err());
        assert!(q.set_priority(-1).is_err());
        q.set_priority(USE_DEFAULT as i32).unwrap();
        assert_eq!(q.priority(), None);

        q.set_time_to_live(MAX_TIME_TO_LIVE).unwrap();
        assert!(q.set_time_to_live(MAX_TIME_TO_LIVE + 1).is_err());
        q.set_time_to_live(USE_DEFAULT).unwrap();
        assert_eq!(q.time_to_live(), None);
    }

    #[test]
    fn test_name_rules() {
        let q = Destination::queue("q").unwrap();
        assert!(q.set_dest_name("").is_err());
        assert!(Destination::queue("").is_err());

        q.set_bus_name(Some(""));
        assert_eq!(q.bus_name(), None);
        q.set_bus_name(Some("bus1"));
        assert_eq!(q.bus_name().as_deref(), Some("bus1"));

        let t = Destination::topic("x").unwrap();
        t.set_topic_space(Some("")).unwrap();
        assert_eq!(t.topic_space().as_deref(), Some(values::DEFAULT_TOPIC_SPACE));
        assert!(t.set_queue_name("q").is_err());
        assert!(q.set_topic_space(Some("ts")).is_err());
    }

    #[test]
    fn test_token_validation() {
        let q = Destination::queue("q").unwrap();
        assert!(q.set_delivery_mode("Sometimes").is_err());
        assert!(q.set_read_ahead("On").is_err());
        assert!(q.set_producer_bind("Yes").is_err());
        q.set_producer_bind(values::ON).unwrap();
        assert_eq!(q.producer_bind().as_deref(), Some(values::ON));
    }

    #[test]
    fn test_generic_setter() {
        let q = Destination::queue("q").unwrap();
        q.set_destination_property(names::PRIORITY, PropertyValue::Int(3)).unwrap();
        q.set_destination_property(names::TIME_TO_LIVE, PropertyValue::Long(1000)).unwrap();
        q.set_destination_property(names::DELIVERY_MODE, "Persistent".into()).unwrap();
        assert_eq!(q.priority(), Some(3));
        assert_eq!(q.time_to_live(), Some(1000));
        assert_eq!(q.delivery_mode(), "Persistent");

        assert_eq!(
            q.set_destination_property("colour", "red".into()),
            Err(DestinationError::UnknownProperty("colour".into()))
        );
        assert!(q.set_destination_property(names::PRIORITY, "high".into()).is_err());
        assert!(q.set_destination_property(names::TOPIC_SPACE, "ts".into()).is_err());
    }

    #[test]
    fn test_cache_invalidation() {
        let q = Destination::queue("q").unwrap();
        let before = q.to_bytes(EncodingLevel::Full).unwrap();
        let gen = q.state.lock().generation;

        // same value, nothing changes
        q.set_dest_name("q").unwrap();
        assert_eq!(q.state.lock().generation, gen);
        assert_eq!(q.to_bytes(EncodingLevel::Full).unwrap(), before);

        q.set_priority(5).unwrap();
        assert_eq!(q.state.lock().generation, gen + 1);
        let after = q.to_bytes(EncodingLevel::Full).unwrap();
        assert_ne!(before, after);
        assert_eq!(after[1], 0x50);
        assert_eq!(q.to_string(), "queue://q?priority=5");
    }

    #[test]
    fn test_producer_address() {
        let q = Destination::queue("q").unwrap();
        q.set_bus_name(Some("bus"));
        q.set_scope_to_local_qp(values::ON).unwrap();
        let addr = q.producer_address().unwrap();
        assert_eq!(addr, DestinationAddress { name: "q".into(), local_only: true, bus_name: Some("bus".into()) });

        q.set_forward_routing_path(Some(vec!["hop1".into(), "hop2".into()]));
        assert_eq!(q.producer_address().unwrap().name, "hop1");

        q.set_forward_routing_path(Some(vec![]));
        assert_eq!(q.forward_routing_path(), None);
        assert_eq!(q.producer_address().unwrap().name, "q");
    }

    #[test]
    fn test_blocked_status() {
        let q = Destination::queue("q").unwrap();
        assert!(q.check_blocked_status().is_ok());
        q.set_blocked_destination_code(Some(BLOCKED_REPLY_DATA_MISSING));
        assert!(matches!(q.check_blocked_status(), Err(BlockedError::ReplyDataMissing(_))));
        q.set_blocked_destination_code(Some(7));
        assert_eq!(q.check_blocked_status(), Err(BlockedError::Blocked(7)));
    }

    #[test]
    fn test_reference_properties() {
        let q = Destination::queue("q").unwrap();
        q.set_read_ahead(values::READ_AHEAD_ON).unwrap();
        let refs = q.reference_properties();
        assert!(!refs.contains_key(names::DELIVERY_MODE));
        assert_eq!(refs.get(names::READ_AHEAD), Some(&PropertyValue::from(values::READ_AHEAD_ON)));

        let loaded = Destination::from_reference_properties(DestinationKind::Queue, refs).unwrap();
        assert_eq!(loaded.delivery_mode(), values::DELIVERY_MODE_APP);
        assert_eq!(loaded.read_ahead(), values::READ_AHEAD_ON);
        assert_eq!(loaded.queue_name().as_deref(), Some("q"));
    }

    #[test]
    fn test_reference_properties_validated() {
        let mut refs = Properties::new();
        refs.insert(names::DEST_NAME.into(), "q".into());
        refs.insert(names::PRIORITY.into(), "4".into());
        refs.insert(names::FORWARD_ROUTING_PATH.into(), "hop1<#>q".into());
        refs.insert("colour".into(), "red".into());
        let loaded = Destination::from_reference_properties(DestinationKind::Queue, refs).unwrap();
        assert_eq!(loaded.priority(), Some(4));
        assert_eq!(loaded.forward_routing_path(), Some(vec!["hop1".to_owned(), "q".to_owned()]));
        // kept, but never on the wire
        assert_eq!(loaded.property("colour"), Some(PropertyValue::from("red")));
        assert_eq!(loaded.to_bytes(EncodingLevel::Full).unwrap().as_ref(), b"\x00\x40qn\x00\x01q");
        assert!(!loaded.to_uri().contains("colour"));

        let mut refs = Properties::new();
        refs.insert(names::PRIORITY.into(), "high".into());
        assert!(matches!(
            Destination::from_reference_properties(DestinationKind::Queue, refs),
            Err(DestinationError::InvalidValue { .. })
        ));

        let mut refs = Properties::new();
        refs.insert(names::GATHER_MESSAGES.into(), values::ON.into());
        assert_eq!(
            Destination::from_reference_properties(DestinationKind::Topic, refs),
            Err(DestinationError::UnknownProperty(names::GATHER_MESSAGES.into()))
        );
    }

    #[test]
    fn test_equality() {
        let a = Destination::queue("q").unwrap();
        let b = a.clone();
        assert_eq!(a, b);
        b.set_priority(1).unwrap();
        assert_ne!(a, b);
        assert_ne!(Destination::new(DestinationKind::Queue), Destination::new(DestinationKind::Topic));
    }
}
