use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, EncodeError};

macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            return Err($e);
        }
    };
}

pub(crate) trait Decode: Sized {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError>;
}

impl Decode for u8 {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        ensure!(src.has_remaining(), DecodeError::InvalidLength);
        Ok(src.get_u8())
    }
}

impl Decode for u16 {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        ensure!(src.remaining() >= 2, DecodeError::InvalidLength);
        Ok(src.get_u16())
    }
}

impl Decode for i64 {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        ensure!(src.remaining() >= 8, DecodeError::InvalidLength);
        Ok(src.get_i64())
    }
}

impl Decode for Bytes {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        let len = u16::decode(src)? as usize;
        ensure!(src.remaining() >= len, DecodeError::InvalidLength);
        Ok(src.split_to(len))
    }
}

impl Decode for String {
    fn decode(src: &mut Bytes) -> Result<Self, DecodeError> {
        let raw = Bytes::decode(src)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::Utf8Error)
    }
}

/// Reads exactly `n` raw bytes (no length prefix) as UTF-8.
pub(crate) fn decode_fixed_str(src: &mut Bytes, n: usize) -> Result<String, DecodeError> {
    ensure!(src.remaining() >= n, DecodeError::InvalidLength);
    let raw = src.split_to(n);
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::Utf8Error)
}

pub(crate) trait Encode {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError>;
}

impl Encode for &str {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let len = u16::try_from(self.len()).map_err(|_| EncodeError::InvalidLength)?;
        buf.put_u16(len);
        buf.extend_from_slice(self.as_bytes());
        Ok(())
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        self.as_str().encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_length_prefix() {
        let mut buf = BytesMut::new();
        "myQueue".encode(&mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"\x00\x07myQueue");

        let mut src = buf.freeze();
        assert_eq!(String::decode(&mut src).unwrap(), "myQueue");
        assert!(src.is_empty());
    }

    #[test]
    fn test_truncated_input() {
        let mut src = Bytes::from_static(b"\x00\x09short");
        assert_eq!(String::decode(&mut src), Err(DecodeError::InvalidLength));

        let mut src = Bytes::from_static(b"\x00");
        assert_eq!(u16::decode(&mut src), Err(DecodeError::InvalidLength));

        let mut src = Bytes::from_static(b"\x00\x00\x00\x01");
        assert_eq!(i64::decode(&mut src), Err(DecodeError::InvalidLength));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut src = Bytes::from_static(b"\x00\x02\xff\xfe");
        assert_eq!(String::decode(&mut src), Err(DecodeError::Utf8Error));
    }
}
