use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::destination::{DestinationKind, Properties};
use crate::error::EncodeError;
use crate::property::{names, values, PropertyValue, Registry};

pub(crate) const TOPIC_FLAG: u8 = 0x10;
pub(crate) const PRIORITY_UNSET: u8 = 0x0F;
pub(crate) const TTL_FLAG: u8 = 0x01;

/// How much of a destination is written to its binary form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingLevel {
    /// Everything.
    Full,
    /// Reply destinations; drops priority, time to live, local scoping and
    /// message gathering.
    Partial,
    /// Additionally drops the discriminator, name and bus name, which the
    /// message carries elsewhere.
    Minimal,
}

impl EncodingLevel {
    fn omitted(&self) -> &'static [&'static str] {
        const PARTIAL: [&str; 4] =
            [names::PRIORITY, names::TIME_TO_LIVE, names::SCOPE_TO_LOCAL_QP, names::GATHER_MESSAGES];
        const MINIMAL: [&str; 7] = [
            names::PRIORITY,
            names::TIME_TO_LIVE,
            names::SCOPE_TO_LOCAL_QP,
            names::GATHER_MESSAGES,
            names::DEST_DISCRIM,
            names::DEST_NAME,
            names::BUS_NAME,
        ];
        match self {
            EncodingLevel::Full => &[],
            EncodingLevel::Partial => &PARTIAL,
            EncodingLevel::Minimal => &MINIMAL,
        }
    }
}

#[inline]
pub(crate) fn delivery_mode_code(mode: Option<&str>) -> Result<u8, EncodeError> {
    match mode {
        None | Some(values::DELIVERY_MODE_APP) => Ok(0),
        Some(values::DELIVERY_MODE_PERSISTENT) => Ok(1),
        Some(values::DELIVERY_MODE_NONPERSISTENT) => Ok(2),
        Some(other) => Err(EncodeError::InvalidValue { name: names::DELIVERY_MODE, value: other.into() }),
    }
}

/// Writes the binary form of a destination's property set.
///
/// The set is copied first. Routing paths and the properties excluded by
/// `level` are dropped, the name and discriminator are renamed to their
/// queue or topic specific names, and the remaining entries are written in
/// name order so the output is stable for a given set.
pub(crate) fn encode(kind: DestinationKind, props: &Properties, level: EncodingLevel) -> Result<Bytes, EncodeError> {
    let mut props = props.clone();
    props.remove(names::FORWARD_ROUTING_PATH);
    props.remove(names::REVERSE_ROUTING_PATH);
    for name in level.omitted() {
        props.remove(*name);
    }

    let renames: &[(&str, &str)] = match kind {
        DestinationKind::Topic => &[(names::DEST_NAME, names::TOPIC_SPACE), (names::DEST_DISCRIM, names::TOPIC_NAME)],
        DestinationKind::Queue => &[(names::DEST_NAME, names::QUEUE_NAME)],
    };
    for (from, to) in renames {
        if let Some(v) = props.remove(*from) {
            props.insert((*to).to_owned(), v);
        }
    }

    let mut buf = BytesMut::with_capacity(64);

    let dm = props.remove(names::DELIVERY_MODE);
    let dm = delivery_mode_code(dm.as_ref().and_then(|v| v.as_str()))?;
    let kind_bits = if kind == DestinationKind::Topic { TOPIC_FLAG } else { 0 };
    buf.put_u8(kind_bits | dm);

    let priority = match props.remove(names::PRIORITY) {
        Some(PropertyValue::Int(p)) if (0..=9).contains(&p) => p as u8,
        Some(v) => return Err(EncodeError::InvalidValue { name: names::PRIORITY, value: v.to_string() }),
        None => PRIORITY_UNSET,
    };
    let ttl = match props.remove(names::TIME_TO_LIVE) {
        Some(PropertyValue::Long(t)) => Some(t),
        Some(v) => return Err(EncodeError::InvalidValue { name: names::TIME_TO_LIVE, value: v.to_string() }),
        None => None,
    };
    buf.put_u8((priority << 4) | if ttl.is_some() { TTL_FLAG } else { 0 });
    if let Some(ttl) = ttl {
        buf.put_i64(ttl);
    }

    let registry = Registry::instance();
    for (name, value) in props.iter() {
        //Unregistered names stay local to the destination.
        let Ok(entry) = registry.entry(name) else {
            log::trace!("not encoding unregistered property {name}");
            continue;
        };
        if entry.default.as_ref() == Some(value) {
            continue;
        }
        entry.coder.encode(value, &mut buf)?;
    }

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::Destination;

    #[test]
    fn test_basic_queue() {
        let q = Destination::queue("myQueue").unwrap();
        let bytes = q.to_bytes(EncodingLevel::Full).unwrap();
        assert_eq!(bytes.as_ref(), b"\x00\xF0qn\x00\x07myQueue");
    }

    #[test]
    fn test_defaults_give_header_only() {
        let t = Destination::new(DestinationKind::Topic);
        assert_eq!(t.to_bytes(EncodingLevel::Full).unwrap().as_ref(), &[0x10, 0xF0]);

        let q = Destination::new(DestinationKind::Queue);
        q.set_producer_prefer_local(values::ON).unwrap();
        q.set_gather_messages(values::OFF).unwrap();
        q.set_read_ahead(values::READ_AHEAD_AS_CONNECTION).unwrap();
        assert_eq!(q.to_bytes(EncodingLevel::Full).unwrap().as_ref(), &[0x00, 0xF0]);

        q.set_time_to_live(0).unwrap();
        assert_eq!(q.to_bytes(EncodingLevel::Full).unwrap().as_ref(), &[0x00, 0xF1, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_header_bits() {
        let t = Destination::topic("news").unwrap();
        t.set_delivery_mode(values::DELIVERY_MODE_NONPERSISTENT).unwrap();
        t.set_priority(7).unwrap();
        t.set_time_to_live(0x0102).unwrap();
        let bytes = t.to_bytes(EncodingLevel::Full).unwrap();
        assert_eq!(&bytes[..10], &[0x12, 0x71, 0, 0, 0, 0, 0, 0, 0x01, 0x02]);
        assert_eq!(&bytes[10..], b"tn\x00\x04news");
    }

    #[test]
    fn test_topic_renames() {
        let t = Destination::topic("a/b").unwrap();
        t.set_topic_space(Some("sports")).unwrap();
        let bytes = t.to_bytes(EncodingLevel::Full).unwrap();
        assert_eq!(&bytes[2..], b"tn\x00\x03a/bts\x00\x06sports");
    }

    #[test]
    fn test_level_filtering() {
        let q = Destination::queue("q").unwrap();
        q.set_priority(4).unwrap();
        q.set_time_to_live(1000).unwrap();
        q.set_scope_to_local_qp(values::ON).unwrap();
        q.set_gather_messages(values::ON).unwrap();
        q.set_dest_discrim(Some("d"));
        q.set_bus_name(Some("b"));
        q.set_producer_bind(values::ON).unwrap();

        let full = q.to_bytes(EncodingLevel::Full).unwrap();
        assert_eq!(full[1], 0x41);
        assert_eq!(
            &full[10..],
            &b"*\x00\x07busName\x00\x01bdd\x00\x01dgm\x00\x02Onpb\x00\x02Onqn\x00\x01qsl\x00\x02On"[..]
        );

        let partial = q.to_bytes(EncodingLevel::Partial).unwrap();
        assert_eq!(&partial[..], &b"\x00\xF0*\x00\x07busName\x00\x01bdd\x00\x01dpb\x00\x02Onqn\x00\x01q"[..]);

        let minimal = q.to_bytes(EncodingLevel::Minimal).unwrap();
        assert_eq!(&minimal[..], &b"\x00\xF0pb\x00\x02On"[..]);
    }

    #[test]
    fn test_routing_paths_not_encoded() {
        let q = Destination::queue("q").unwrap();
        let plain = q.to_bytes(EncodingLevel::Full).unwrap();
        q.set_forward_routing_path(Some(vec!["a".into(), "b".into()]));
        q.set_reverse_routing_path(Some(vec!["c".into()]));
        assert_eq!(q.to_bytes(EncodingLevel::Full).unwrap(), plain);
    }

    #[test]
    fn test_unregistered_property_not_encoded() {
        let mut props = Properties::new();
        props.insert(names::DEST_NAME.into(), "q".into());
        props.insert("colour".into(), "red".into());
        assert_eq!(
            encode(DestinationKind::Queue, &props, EncodingLevel::Full).unwrap().as_ref(),
            b"\x00\xF0qn\x00\x01q"
        );
    }

    #[test]
    fn test_invalid_registered_value_is_error() {
        let mut props = Properties::new();
        props.insert(names::GATHER_MESSAGES.into(), "Maybe".into());
        assert!(matches!(
            encode(DestinationKind::Queue, &props, EncodingLevel::Full),
            Err(EncodeError::InvalidValue { .. })
        ));
    }
}
