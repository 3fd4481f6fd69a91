use bytes::{Buf, Bytes};

use crate::destination::{Destination, DestinationKind};
use crate::encode::{PRIORITY_UNSET, TOPIC_FLAG, TTL_FLAG};
use crate::error::DecodeError;
use crate::property::{values, Registry, LONG_NAME_MARKER};
use crate::utils::{decode_fixed_str, Decode};

fn delivery_mode(code: u8) -> Result<&'static str, DecodeError> {
    match code {
        0 => Ok(values::DELIVERY_MODE_APP),
        1 => Ok(values::DELIVERY_MODE_PERSISTENT),
        2 => Ok(values::DELIVERY_MODE_NONPERSISTENT),
        c => Err(DecodeError::InvalidDeliveryMode(c)),
    }
}

/// Rebuilds a destination from the binary form written by the encoder.
pub(crate) fn decode(bytes: &[u8]) -> Result<Destination, DecodeError> {
    let mut src = Bytes::copy_from_slice(bytes);

    let b0 = u8::decode(&mut src)?;
    let b1 = u8::decode(&mut src)?;

    let kind = if b0 & TOPIC_FLAG != 0 { DestinationKind::Topic } else { DestinationKind::Queue };
    let dest = Destination::new(kind);
    dest.set_delivery_mode(delivery_mode(b0 & 0x0F)?)?;

    let priority = b1 >> 4;
    if priority != PRIORITY_UNSET {
        dest.set_priority(i32::from(priority))?;
    }
    if b1 & TTL_FLAG != 0 {
        dest.set_time_to_live(i64::decode(&mut src)?)?;
    }

    let registry = Registry::instance();
    while src.has_remaining() {
        let wire_name = if src[0] == LONG_NAME_MARKER {
            src.advance(1);
            String::decode(&mut src)?
        } else {
            decode_fixed_str(&mut src, 2)?
        };

        let long = registry.long_name_for(&wire_name).ok_or(DecodeError::UnknownWireName(wire_name))?;
        let entry = registry.entry(long)?;
        if !kind.accepts(entry.tag) {
            return Err(DecodeError::KindMismatch { property: long, kind: kind.as_str() });
        }
        let value = entry.coder.decode(&mut src)?;
        log::trace!("decoded {long}={value} for {kind}");
        dest.set_by_tag(entry.tag, long, value)?;
    }

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::EncodingLevel;
    use crate::property::{names, PropertyValue};

    #[test]
    fn test_basic_queue() {
        let d = Destination::from_bytes(b"\x00\xF0qn\x00\x07myQueue").unwrap();
        assert!(d.is_queue());
        assert_eq!(d.queue_name().as_deref(), Some("myQueue"));
        assert_eq!(d.priority(), None);
        assert_eq!(d.time_to_live(), None);
        assert_eq!(d.delivery_mode(), values::DELIVERY_MODE_APP);
    }

    #[test]
    fn test_round_trip_full() {
        let q = Destination::queue("orders").unwrap();
        q.set_delivery_mode(values::DELIVERY_MODE_PERSISTENT).unwrap();
        q.set_priority(0).unwrap();
        q.set_time_to_live(86_400_000).unwrap();
        q.set_read_ahead(values::READ_AHEAD_OFF).unwrap();
        q.set_bus_name(Some("bus1"));
        q.set_blocked_destination_code(Some(42));
        q.set_dest_discrim(Some("sel"));
        q.set_scope_to_local_qp(values::ON).unwrap();
        q.set_producer_prefer_local(values::OFF).unwrap();
        q.set_producer_bind(values::ON).unwrap();
        q.set_gather_messages(values::ON).unwrap();

        let bytes = q.to_bytes(EncodingLevel::Full).unwrap();
        let d = Destination::from_bytes(&bytes).unwrap();
        assert_eq!(d, q);
        assert_eq!(d.to_bytes(EncodingLevel::Full).unwrap(), bytes);
    }

    #[test]
    fn test_round_trip_topic() {
        let t = Destination::topic("stock/ibm").unwrap();
        t.set_topic_space(Some("prices")).unwrap();
        t.set_delivery_mode(values::DELIVERY_MODE_NONPERSISTENT).unwrap();
        t.set_priority(9).unwrap();

        let d = Destination::from_bytes(&t.to_bytes(EncodingLevel::Full).unwrap()).unwrap();
        assert!(d.is_topic());
        assert_eq!(d.topic_name().as_deref(), Some("stock/ibm"));
        assert_eq!(d.topic_space().as_deref(), Some("prices"));
        assert_eq!(d, t);
    }

    #[test]
    fn test_partial_keeps_reply_fields() {
        let q = Destination::queue("reply").unwrap();
        q.set_priority(2).unwrap();
        q.set_read_ahead(values::READ_AHEAD_ON).unwrap();
        let d = Destination::from_bytes(&q.to_bytes(EncodingLevel::Partial).unwrap()).unwrap();
        assert_eq!(d.queue_name().as_deref(), Some("reply"));
        assert_eq!(d.read_ahead(), values::READ_AHEAD_ON);
        assert_eq!(d.priority(), None);
    }

    #[test]
    fn test_unknown_wire_name() {
        let err = Destination::from_bytes(b"\x00\xF0zz\x00\x01x").unwrap_err();
        assert_eq!(err, DecodeError::UnknownWireName("zz".into()));
        assert!(!err.is_internal());

        let err = Destination::from_bytes(b"\x00\xF0*\x00\x05color\x00\x03red").unwrap_err();
        assert_eq!(err, DecodeError::UnknownWireName("color".into()));
    }

    #[test]
    fn test_truncated_is_internal() {
        for bad in [&b"\x00"[..], &b"\x00\xF1\x00\x00"[..], &b"\x00\xF0qn\x00\x09short"[..], &b"\x00\xF0q"[..]] {
            let err = Destination::from_bytes(bad).unwrap_err();
            assert_eq!(err, DecodeError::InvalidLength);
            assert!(err.is_internal());
        }
    }

    #[test]
    fn test_malformed_header() {
        assert_eq!(Destination::from_bytes(&[0x05, 0xF0]).unwrap_err(), DecodeError::InvalidDeliveryMode(5));
        // priority nibble 12 is out of range
        assert!(matches!(Destination::from_bytes(&[0x00, 0xC0]).unwrap_err(), DecodeError::Property(_)));
    }

    #[test]
    fn test_kind_mismatch_and_phantom() {
        let err = Destination::from_bytes(b"\x10\xF0qn\x00\x01q").unwrap_err();
        assert_eq!(err, DecodeError::KindMismatch { property: names::QUEUE_NAME, kind: "topic" });

        let err = Destination::from_bytes(b"\x00\xF0pr\x00\x011").unwrap_err();
        assert_eq!(err, DecodeError::UnexpectedPhantom(names::PRIORITY));
        assert!(err.is_internal());
    }

    #[test]
    fn test_integer_entry() {
        let d = Destination::from_bytes(b"\x00\xF0bc\x00\x011").unwrap();
        assert_eq!(d.blocked_destination_code(), Some(1));
        assert_eq!(d.property(names::BLOCKED_DESTINATION), Some(PropertyValue::Int(1)));

        let d = Destination::from_bytes(b"\x00\xF0bc\x00\x0242").unwrap();
        assert_eq!(d.blocked_destination_code(), Some(42));
        // the length covers only the first digit
        assert!(Destination::from_bytes(b"\x00\xF0bc\x00\x0142").is_err());
        assert!(Destination::from_bytes(b"\x00\xF0bc\x00\x02xx").is_err());
    }
}
