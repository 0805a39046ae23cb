//! Fixed-size binary record.

use std::cmp::Ordering;

use byteorder::{BigEndian, ByteOrder};

/// Serialized record size in bytes: 8 bytes of id followed by 8 bytes of key.
pub const RECORD_SIZE: usize = 16;

/// A single record of the sorted file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub id: i64,
    pub key: f64,
}

impl Record {
    pub fn new(id: i64, key: f64) -> Self {
        Record { id, key }
    }

    /// Decodes a record from the first [`RECORD_SIZE`] bytes of `buf`.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than [`RECORD_SIZE`].
    pub fn decode(buf: &[u8]) -> Self {
        Record {
            id: BigEndian::read_i64(&buf[..8]),
            key: BigEndian::read_f64(&buf[8..RECORD_SIZE]),
        }
    }

    /// Encodes the record into the first [`RECORD_SIZE`] bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        BigEndian::write_i64(&mut buf[..8], self.id);
        BigEndian::write_f64(&mut buf[8..RECORD_SIZE], self.key);
    }

    /// Total order on records: by key, ties broken by id.
    /// Keys are compared with [`f64::total_cmp`], so NaN keys sort after every other key.
    pub fn compare(a: &Record, b: &Record) -> Ordering {
        a.key.total_cmp(&b.key).then(a.id.cmp(&b.id))
    }
}

/// Decodes every whole record of `buf`.
pub fn decode_all(buf: &[u8]) -> impl Iterator<Item = Record> + '_ {
    buf.chunks_exact(RECORD_SIZE).map(Record::decode)
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use rstest::*;

    use super::{decode_all, Record, RECORD_SIZE};

    #[test]
    fn test_record_layout() {
        let mut buf = [0u8; RECORD_SIZE];
        Record::new(1, 2.0).encode(&mut buf);

        assert_eq!(&buf[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&buf[8..], &2.0f64.to_be_bytes());
        assert_eq!(Record::decode(&buf), Record::new(1, 2.0));
    }

    #[test]
    fn test_decode_all_skips_partial_tail() {
        let mut buf = vec![0u8; RECORD_SIZE * 2 + 3];
        Record::new(7, -1.5).encode(&mut buf[..RECORD_SIZE]);
        Record::new(8, 3.25).encode(&mut buf[RECORD_SIZE..]);

        let records = Vec::from_iter(decode_all(&buf));
        assert_eq!(records, vec![Record::new(7, -1.5), Record::new(8, 3.25)]);
    }

    #[rstest]
    #[case(Record::new(1, 1.0), Record::new(0, 2.0), Ordering::Less)]
    #[case(Record::new(0, 2.0), Record::new(1, 2.0), Ordering::Less)]
    #[case(Record::new(1, 2.0), Record::new(1, 2.0), Ordering::Equal)]
    #[case(Record::new(0, -0.0), Record::new(0, 0.0), Ordering::Less)]
    #[case(Record::new(0, f64::NAN), Record::new(1, f64::INFINITY), Ordering::Greater)]
    fn test_compare(#[case] a: Record, #[case] b: Record, #[case] expected: Ordering) {
        assert_eq!(Record::compare(&a, &b), expected);
    }
}
