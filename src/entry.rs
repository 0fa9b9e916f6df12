//! Entry module consists of basic abstractions of storage.
//!
//! Including to: `Tuple`, `Entry` and the fixed width `Count` encoding.

use std::fmt::{self, Display};
use std::io::Cursor;

use bytes::{self, Buf, BufMut};

/// A partial count emitted by a mapper for one word occurrence.
pub type Tuple = (String, i64);

/// A fully merged word count, as written to the partition output file.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Entry {
    pub key: String,
    pub count: i64,
}

impl Entry {
    pub fn new(key: String, count: i64) -> Entry {
        Entry { key, count }
    }
}

impl Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{} {}", self.key, self.count)
    }
}

/// Represents the stored value of a scratch store entry.
///
/// The storage layout:
///
/// ===============================
/// Count (8 bytes, little endian)
/// ===============================
///
/// The count is a signed two's complement integer. The width and byte order are
/// fixed so that a scratch store written on one platform reads back identically
/// on any other.
pub struct Count;

impl Count {
    pub const WIDTH: usize = 8;

    pub fn encode(count: i64) -> bytes::BytesMut {
        // Note: the BytesMut is not dynamic resizable.
        let mut buf = bytes::BytesMut::with_capacity(Count::WIDTH);
        buf.put_i64_le(count);
        buf
    }

    /// Returns `None` when the value is not exactly `Count::WIDTH` bytes wide.
    pub fn decode(raw: &[u8]) -> Option<i64> {
        if raw.len() != Count::WIDTH {
            return None;
        }

        let mut buf = Cursor::new(raw);
        Some(buf.get_i64_le())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_display() {
        let entry = Entry::new("Hello".to_string(), 42);

        assert_eq!(entry.to_string(), "Hello 42");
    }

    #[test]
    fn test_count_serialize() {
        let bytes: &[u8] = &Count::encode(258);

        // Note: the encoding use Little Endian.
        let expect: Vec<u8> = vec![2, 1, 0, 0, 0, 0, 0, 0];

        assert_eq!(bytes, &expect[..]);
    }

    #[test]
    fn test_count_deserialize() {
        let negative = Count::encode(-7);

        assert_eq!(Count::decode(&negative), Some(-7));
        assert_eq!(Count::decode(&[0xff; 8]), Some(-1));
    }

    #[test]
    fn test_count_rejects_wrong_width() {
        assert_eq!(Count::decode(&[1, 0, 0, 0]), None);
        assert_eq!(Count::decode(&[]), None);
        assert_eq!(Count::decode(&[0; 9]), None);
    }
}
