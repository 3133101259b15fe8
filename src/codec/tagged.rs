//! Kind-prefixed codec
//!
//! Wire layout:
//!
//! ```text
//! +--------+---------------------+
//! | kind   | body                |
//! | 1 byte | remaining bytes     |
//! +--------+---------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Codec, CodecError};

/// Codec that stores the message kind in the first payload byte
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedCodec;

impl Codec for TaggedCodec {
    type Message = Bytes;

    fn from_wire(&self, mut raw: Bytes) -> Result<(u32, Bytes), CodecError> {
        if !raw.has_remaining() {
            return Err(CodecError::Empty);
        }
        let kind = raw.get_u8() as u32;
        Ok((kind, raw))
    }

    fn to_wire(&self, kind: u32, message: &Bytes) -> Result<Bytes, CodecError> {
        let tag = u8::try_from(kind).map_err(|_| CodecError::KindOutOfRange(kind))?;

        let mut buf = BytesMut::with_capacity(1 + message.len());
        buf.put_u8(tag);
        buf.put_slice(message);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire_splits_kind() {
        let (kind, body) = TaggedCodec
            .from_wire(Bytes::from_static(&[0x03, b'h', b'i']))
            .unwrap();

        assert_eq!(kind, 3);
        assert_eq!(&body[..], b"hi");
    }

    #[test]
    fn test_from_wire_kind_only() {
        let (kind, body) = TaggedCodec.from_wire(Bytes::from_static(&[0xFF])).unwrap();
        assert_eq!(kind, 255);
        assert!(body.is_empty());
    }

    #[test]
    fn test_from_wire_empty() {
        assert_eq!(TaggedCodec.from_wire(Bytes::new()), Err(CodecError::Empty));
    }

    #[test]
    fn test_to_wire_prefixes_kind() {
        let wire = TaggedCodec
            .to_wire(9, &Bytes::from_static(b"payload"))
            .unwrap();

        assert_eq!(wire[0], 9);
        assert_eq!(&wire[1..], b"payload");
    }

    #[test]
    fn test_to_wire_kind_out_of_range() {
        let result = TaggedCodec.to_wire(256, &Bytes::new());
        assert_eq!(result, Err(CodecError::KindOutOfRange(256)));
    }
}
