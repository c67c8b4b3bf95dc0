//! Route advertisement wire format
//!
//! Each advertised route is a fixed 16-byte record in network byte order:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Destination Address                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Hop Count                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Queue Size                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! An update datagram is zero or more records back to back. Receivers read
//! records until the datagram is exhausted; a short trailing record ends the
//! batch.

use std::fmt::Display;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use olsb_core::WireError;
use serde::{Deserialize, Serialize};

/// Size of one encoded route record
pub const RECORD_LEN: usize = 16;

/// One advertised route as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdvertisedRoute {
    /// Destination being advertised
    pub destination: Ipv4Addr,
    /// Advertiser's hop count to the destination
    pub hop_count: u32,
    /// Destination sequence number
    pub sequence_number: u32,
    /// Advertiser's queue depth toward the destination
    pub queue_size: u32,
}

impl AdvertisedRoute {
    /// Create a new record
    pub fn new(
        destination: Ipv4Addr,
        hop_count: u32,
        sequence_number: u32,
        queue_size: u32,
    ) -> Self {
        Self {
            destination,
            hop_count,
            sequence_number,
            queue_size,
        }
    }

    /// Append the encoded record to a buffer
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.destination.octets());
        buf.put_u32(self.hop_count);
        buf.put_u32(self.sequence_number);
        buf.put_u32(self.queue_size);
    }

    /// Encode into a fixed-size array
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        let mut cursor = &mut out[..];
        self.encode(&mut cursor);
        out
    }

    /// Decode one record, advancing the buffer
    ///
    /// Fails without consuming anything if fewer than [`RECORD_LEN`] bytes
    /// remain.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, WireError> {
        if buf.remaining() < RECORD_LEN {
            return Err(WireError::MalformedRecord {
                remaining: buf.remaining(),
                expected: RECORD_LEN,
            });
        }
        let mut octets = [0u8; 4];
        buf.copy_to_slice(&mut octets);
        Ok(Self {
            destination: Ipv4Addr::from(octets),
            hop_count: buf.get_u32(),
            sequence_number: buf.get_u32(),
            queue_size: buf.get_u32(),
        })
    }
}

impl Display for AdvertisedRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dst={} hops={} seq={} queue={}",
            self.destination, self.hop_count, self.sequence_number, self.queue_size
        )
    }
}

/// Encode a batch of records into one datagram
pub fn encode_batch(records: &[AdvertisedRoute]) -> Bytes {
    let mut buf = BytesMut::with_capacity(records.len() * RECORD_LEN);
    for record in records {
        record.encode(&mut buf);
    }
    buf.freeze()
}

/// Iterator over the records of a received datagram
///
/// Yields each complete record, then at most one [`WireError`] if trailing
/// bytes remain, then stops.
#[derive(Debug, Clone)]
pub struct RecordReader<'a> {
    buf: &'a [u8],
    failed: bool,
}

impl<'a> RecordReader<'a> {
    /// Create a reader over a datagram
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, failed: false }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Result<AdvertisedRoute, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.buf.is_empty() {
            return None;
        }
        match AdvertisedRoute::decode(&mut self.buf) {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let record = AdvertisedRoute::new(Ipv4Addr::new(10, 1, 1, 3), 1, 4, 0);
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), RECORD_LEN);

        let decoded = AdvertisedRoute::decode(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_network_byte_order() {
        let record = AdvertisedRoute::new(Ipv4Addr::new(10, 1, 1, 2), 2, 0x0102_0304, 7);
        let bytes = record.to_bytes();
        assert_eq!(&bytes[0..4], &[10, 1, 1, 2]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 2]);
        assert_eq!(&bytes[8..12], &[1, 2, 3, 4]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 7]);
    }

    #[test]
    fn test_two_record_batch() {
        let records = [
            AdvertisedRoute::new(Ipv4Addr::new(10, 1, 1, 2), 2, 2, 0),
            AdvertisedRoute::new(Ipv4Addr::new(10, 1, 1, 3), 1, 4, 0),
        ];
        let batch = encode_batch(&records);
        assert_eq!(batch.len(), 32);

        let decoded: Vec<_> = RecordReader::new(&batch)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_empty_batch() {
        let batch = encode_batch(&[]);
        assert!(batch.is_empty());
        assert_eq!(RecordReader::new(&batch).count(), 0);
    }

    #[test]
    fn test_short_read_is_malformed() {
        let bytes = [0u8; 10];
        let err = AdvertisedRoute::decode(&mut &bytes[..]).unwrap_err();
        assert_eq!(
            err,
            WireError::MalformedRecord {
                remaining: 10,
                expected: RECORD_LEN
            }
        );
    }

    #[test]
    fn test_trailing_bytes_end_the_batch() {
        let mut buf = BytesMut::new();
        AdvertisedRoute::new(Ipv4Addr::new(10, 1, 1, 9), 3, 6, 1).encode(&mut buf);
        buf.put_slice(&[1, 2, 3]);

        let mut reader = RecordReader::new(&buf);
        assert!(reader.next().unwrap().is_ok());
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }
}
