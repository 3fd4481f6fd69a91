//! Textual `queue://` and `topic://` destination forms.
//!
//! Grammar:
//!
//! ```text
//! queue://[qmgr/]name[?nvp[&nvp]...]
//! topic://name[?nvp[&nvp]...]
//! name                  (queue, short form)
//! [topicspace:]name     (topic, short form)
//! nvp = property=value
//! ```
//!
//! A delimiter that belongs to a name or value is escaped with `\`, and `\`
//! itself is written as `\\`.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::destination::{Destination, DestinationKind, Properties};
use crate::error::DestinationError;
use crate::property::{names, values, Registry, PATH_SEPARATOR};

pub const QUEUE_PREFIX: &str = "queue://";
pub const TOPIC_PREFIX: &str = "topic://";

/// Names starting with this prefix belong to destinations created by the core.
pub const RESERVED_PREFIX: &str = "_";

const ESCAPE: char = '\\';

const QUEUE_NAME_DELIMS: &[char] = &['?', '/'];
const TOPIC_NAME_DELIMS: &[char] = &['?'];
const SHORT_TOPIC_DELIMS: &[char] = &[':'];
const VALUE_DELIMS: &[char] = &['&'];

/// What to do with the queue-manager segment of `queue://qmgr/name`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueManagerPolicy {
    /// Refuse the URI.
    #[default]
    Error,
    /// Drop the segment.
    Discard,
    /// Name the queue `name@qmgr`.
    Transform,
    /// Use the segment as the bus name.
    BusName,
}

/// Builds destinations from their textual form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UriParser {
    policy: QueueManagerPolicy,
}

impl UriParser {
    #[inline]
    pub fn new(policy: QueueManagerPolicy) -> Self {
        Self { policy }
    }

    #[inline]
    pub fn policy(&self) -> QueueManagerPolicy {
        self.policy
    }

    /// Parses a `queue://` or `topic://` URI, or a short form naming a
    /// destination of `short_kind`.
    pub fn parse(&self, text: &str, short_kind: DestinationKind) -> Result<Destination, DestinationError> {
        if text.starts_with(RESERVED_PREFIX) {
            return Err(DestinationError::ReservedPrefix(text.into()));
        }

        if let Some(rest) = text.strip_prefix(QUEUE_PREFIX) {
            self.parse_queue_uri(text, rest)
        } else if let Some(rest) = text.strip_prefix(TOPIC_PREFIX) {
            self.parse_topic_uri(rest)
        } else {
            match short_kind {
                DestinationKind::Queue => Destination::queue(text),
                DestinationKind::Topic => parse_short_topic(text),
            }
        }
    }

    #[inline]
    pub fn parse_queue(&self, text: &str) -> Result<Destination, DestinationError> {
        self.parse(text, DestinationKind::Queue)
    }

    #[inline]
    pub fn parse_topic(&self, text: &str) -> Result<Destination, DestinationError> {
        self.parse(text, DestinationKind::Topic)
    }

    fn parse_queue_uri(&self, uri: &str, rest: &str) -> Result<Destination, DestinationError> {
        let (name_part, nvps) = split_once_on_non_escaped_char(rest, '?').unwrap_or((rest, ""));

        let (qmgr, name) = match split_once_on_non_escaped_char(name_part, '/') {
            Some((qmgr, name)) if !qmgr.is_empty() => (Some(unescape(qmgr, QUEUE_NAME_DELIMS)?), name),
            Some((_, name)) => (None, name),
            None => (None, name_part),
        };
        let mut name = unescape(name, QUEUE_NAME_DELIMS)?;

        let mut bus_name = None;
        if let Some(qmgr) = qmgr {
            match self.policy {
                QueueManagerPolicy::Error => {
                    return Err(DestinationError::QueueManagerNotSupported { qmgr, uri: uri.into() })
                }
                QueueManagerPolicy::Discard => log::debug!("discarding queue manager {qmgr} in {uri}"),
                QueueManagerPolicy::Transform => name = format!("{name}@{qmgr}"),
                QueueManagerPolicy::BusName => bus_name = Some(qmgr),
            }
        }

        let dest = Destination::queue(&name)?;
        if let Some(bus) = bus_name {
            dest.set_bus_name(Some(&bus));
        }
        apply_nvps(&dest, nvps)?;
        Ok(dest)
    }

    fn parse_topic_uri(&self, rest: &str) -> Result<Destination, DestinationError> {
        let (name, nvps) = split_once_on_non_escaped_char(rest, '?').unwrap_or((rest, ""));
        let dest = Destination::new(DestinationKind::Topic);
        let name = unescape(name, TOPIC_NAME_DELIMS)?;
        dest.set_topic_name(Some(&name))?;
        apply_nvps(&dest, nvps)?;
        Ok(dest)
    }
}

fn parse_short_topic(text: &str) -> Result<Destination, DestinationError> {
    let dest = Destination::new(DestinationKind::Topic);
    let name = match split_once_on_non_escaped_char(text, ':') {
        Some((space, name)) => {
            dest.set_topic_space(Some(&unescape(space, SHORT_TOPIC_DELIMS)?))?;
            name
        }
        None => text,
    };
    dest.set_topic_name(Some(&unescape(name, SHORT_TOPIC_DELIMS)?))?;
    Ok(dest)
}

/// Applies the `name=value` pairs of a URI query to `dest`.
///
/// A pair without `=`, or with nothing after it, is logged and skipped.
/// Names the registry does not know are ignored. Every other failure is
/// returned.
fn apply_nvps(dest: &Destination, nvps: &str) -> Result<(), DestinationError> {
    let registry = Registry::instance();
    for nvp in split_on_non_escaped_char(nvps, '&') {
        if nvp.is_empty() {
            continue;
        }
        let (name, raw) = match nvp.split_once('=') {
            Some((_, "")) | None => {
                log::warn!("{}", DestinationError::malformed(nvp, "expected name=value"));
                continue;
            }
            Some(pair) => pair,
        };
        let value = unescape(raw, VALUE_DELIMS)?;

        let (name, value) = match name {
            names::EXPIRY => (names::TIME_TO_LIVE, value),
            names::PERSISTENCE => {
                let mode = match value.trim() {
                    "-1" => values::DELIVERY_MODE_APP,
                    "1" => values::DELIVERY_MODE_NONPERSISTENT,
                    "2" => values::DELIVERY_MODE_PERSISTENT,
                    _ => return Err(DestinationError::invalid(names::PERSISTENCE, &value)),
                };
                (names::DELIVERY_MODE, mode.to_owned())
            }
            names::FORWARD_ROUTING_PATH => {
                dest.set_forward_routing_path(Some(parse_path(&value)));
                continue;
            }
            names::REVERSE_ROUTING_PATH => {
                dest.set_reverse_routing_path(Some(parse_path(&value)));
                continue;
            }
            other => (other, value),
        };

        if !registry.contains(name) {
            log::debug!("ignoring unknown destination property {name}={value}");
            continue;
        }
        let value = registry.convert(name, &value)?;
        dest.set_destination_property(name, value)?;
    }
    Ok(())
}

fn parse_path(value: &str) -> Vec<String> {
    value.split(PATH_SEPARATOR).filter(|s| !s.is_empty()).map(ToOwned::to_owned).collect()
}

/// Writes the URI form of a property set. With `partial`, the name,
/// discriminator, priority, time to live and routing paths are left out.
pub(crate) fn to_uri(kind: DestinationKind, props: &Properties, partial: bool) -> String {
    let registry = Registry::instance();
    let str_of = |name: &str| props.get(name).and_then(|v| v.as_str()).unwrap_or_default();

    let mut out = String::with_capacity(64);
    let mut nvps: Vec<(&str, String)> = Vec::new();
    match kind {
        DestinationKind::Queue => {
            out.push_str(QUEUE_PREFIX);
            if !partial {
                out.push_str(&escape(str_of(names::DEST_NAME), QUEUE_NAME_DELIMS));
            }
        }
        DestinationKind::Topic => {
            out.push_str(TOPIC_PREFIX);
            if !partial {
                out.push_str(&escape(str_of(names::DEST_DISCRIM), TOPIC_NAME_DELIMS));
            }
            let space = str_of(names::DEST_NAME);
            if !space.is_empty() && space != values::DEFAULT_TOPIC_SPACE {
                nvps.push((names::TOPIC_SPACE, space.to_owned()));
            }
        }
    }

    for (name, value) in props.iter() {
        let name = name.as_str();
        let skip = match name {
            names::DEST_NAME | names::BUS_NAME => true,
            names::DEST_DISCRIM => partial || kind == DestinationKind::Topic,
            names::PRIORITY | names::TIME_TO_LIVE | names::FORWARD_ROUTING_PATH | names::REVERSE_ROUTING_PATH => {
                partial
            }
            _ if !registry.contains(name) => true,
            _ => registry.default_value_of(name) == Some(value),
        };
        if !skip {
            nvps.push((name, value.to_string()));
        }
    }

    for (i, (name, value)) in nvps.iter().enumerate() {
        out.push(if i == 0 { '?' } else { '&' });
        let _ = write!(out, "{}={}", name, escape(value, VALUE_DELIMS));
    }
    out
}

/// Whether the character at byte offset `idx` is escaped, that is preceded
/// by an odd number of consecutive backslashes.
pub fn is_escaped(s: &str, idx: usize) -> bool {
    s.as_bytes()[..idx].iter().rev().take_while(|b| **b == ESCAPE as u8).count() % 2 == 1
}

/// Splits `s` at every occurrence of `delim` that is not escaped.
pub fn split_on_non_escaped_char(s: &str, delim: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        if c == delim && !is_escaped(s, idx) {
            parts.push(&s[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Splits `s` at the first occurrence of `delim` that is not escaped.
pub fn split_once_on_non_escaped_char(s: &str, delim: char) -> Option<(&str, &str)> {
    s.char_indices()
        .find(|(idx, c)| *c == delim && !is_escaped(s, *idx))
        .map(|(idx, c)| (&s[..idx], &s[idx + c.len_utf8()..]))
}

/// Escapes every backslash and every character in `delims`.
pub fn escape(s: &str, delims: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == ESCAPE || delims.contains(&c) {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out
}

/// Reverses [`escape`]. A backslash must be followed by another backslash
/// or by one of `delims`.
pub fn unescape(s: &str, delims: &[char]) -> Result<String, DestinationError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(n) if n == ESCAPE || delims.contains(&n) => out.push(n),
            _ => return Err(DestinationError::malformed(s, "unmatched escape character")),
        }
    }
    Ok(out)
}
