//! The write-ahead log: an append-only stream of committed routing table mutations.
//!
//! Each record is framed as a fixed-width header followed by the bincode-encoded record body:
//!
//! ```text
//! +---------------------------+------------------------------------+
//! | length (10 bytes)         | body (length bytes)                |
//! | varint, zero padded       | { peer, bucket_index, slot_index } |
//! +---------------------------+------------------------------------+
//! ```
//!
//! The header width never depends on the encoded length, a reader always knows how many bytes to
//! pull before it knows how many bytes follow. Logs are only ever scanned front to back.

use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use bincode::{Decode, Encode};
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::{
    core::{error::WalError, id::HASH_SIZE, peer::Peer},
    table::TableImage,
};

/// The width of the length header preceding every record body.
pub const HEADER_LEN: usize = 10;

/// Bodies larger than this are treated as corruption rather than allocated.
const MAX_BODY_LEN: u64 = 64 * 1024;

/// A committed insert or replace: `peer` was written at `(bucket_index, slot_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct LogRecord {
    pub peer: Peer,
    pub bucket_index: i32,
    pub slot_index: i32,
}

impl LogRecord {
    pub fn new(peer: Peer, bucket: usize, slot: usize) -> Result<Self, WalError> {
        let invalid = || WalError::InvalidAddress {
            bucket: bucket as i64,
            slot: slot as i64,
        };

        Ok(Self {
            peer,
            bucket_index: i32::try_from(bucket).map_err(|_| invalid())?,
            slot_index: i32::try_from(slot).map_err(|_| invalid())?,
        })
    }

    /// Returns the `(bucket, slot)` the record addresses, rejecting addresses no table can hold.
    pub fn address(&self) -> Result<(usize, usize), WalError> {
        match (
            usize::try_from(self.bucket_index),
            usize::try_from(self.slot_index),
        ) {
            (Ok(bucket), Ok(slot)) if bucket < HASH_SIZE => Ok((bucket, slot)),
            _ => Err(WalError::InvalidAddress {
                bucket: self.bucket_index.into(),
                slot: self.slot_index.into(),
            }),
        }
    }
}

/// Frames log records with a fixed-width length header.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCodec;

impl LogCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for LogCodec {
    type Item = LogRecord;
    type Error = WalError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        // The varint sits at the front of the header, the padding after it is ignored.
        let (len, _): (u64, usize) =
            bincode::decode_from_slice(&src[..HEADER_LEN], bincode::config::standard())?;

        if len > MAX_BODY_LEN {
            return Err(WalError::Oversized {
                len,
                max: MAX_BODY_LEN,
            });
        }

        // Bounded above, the cast can't truncate.
        let len = len as usize;
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let body = src.split_to(len);

        let (record, _) = bincode::decode_from_slice(&body, bincode::config::standard())?;

        Ok(Some(record))
    }
}

impl Encoder<&LogRecord> for LogCodec {
    type Error = WalError;

    fn encode(&mut self, record: &LogRecord, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = bincode::encode_to_vec(record, bincode::config::standard())?;

        let mut header = [0u8; HEADER_LEN];
        bincode::encode_into_slice(body.len() as u64, &mut header, bincode::config::standard())?;

        dst.reserve(HEADER_LEN + body.len());
        dst.extend_from_slice(&header);
        dst.extend_from_slice(&body);

        Ok(())
    }
}

/// The single writer of a log segment.
#[derive(Debug)]
pub struct LogWriter {
    file: File,
    path: PathBuf,
    position: u64,
}

impl LogWriter {
    /// Creates a new, empty log segment, truncating any file already at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, WalError> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self {
            file,
            path,
            position: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the offset the next record will be written at.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Appends the record and returns once it is durable on disk.
    pub fn append(&mut self, record: &LogRecord) -> Result<(), WalError> {
        let mut buf = BytesMut::new();
        LogCodec.encode(record, &mut buf)?;

        self.file.write_all(&buf)?;
        self.file.sync_data()?;
        self.position += buf.len() as u64;

        trace!(
            log = %self.path.display(),
            bucket = record.bucket_index,
            slot = record.slot_index,
            "appended log record"
        );

        Ok(())
    }
}

/// Scans a log segment front to back.
pub struct LogReader {
    buf: BytesMut,
    position: u64,
    codec: LogCodec,
}

impl LogReader {
    /// Opens the segment at its first record.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WalError> {
        Self::open_at(path, 0)
    }

    /// Opens the segment with the cursor at `position`, which must be a record boundary.
    pub fn open_at(path: impl AsRef<Path>, position: u64) -> Result<Self, WalError> {
        let mut buf = BytesMut::from(&fs::read(path)?[..]);

        if position > buf.len() as u64 {
            return Err(WalError::Truncated { position });
        }
        buf.advance(position as usize);

        Ok(Self {
            buf,
            position,
            codec: LogCodec,
        })
    }

    /// Returns the offset of the next record to read.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads the record at the cursor and moves past it, `None` at the clean end of the log.
    pub fn read_next(&mut self) -> Result<Option<LogRecord>, WalError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let before = self.buf.len();
        match self.codec.decode(&mut self.buf)? {
            Some(record) => {
                self.position += (before - self.buf.len()) as u64;
                Ok(Some(record))
            }
            None => Err(WalError::Truncated {
                position: self.position,
            }),
        }
    }

    /// Applies every remaining record to the image in log order, returning how many were
    /// applied. On error the image keeps the records applied before the failing one.
    pub fn replay_into(&mut self, image: &mut TableImage) -> Result<usize, WalError> {
        let mut applied = 0;

        while let Some(record) = self.read_next()? {
            let (bucket, slot) = record.address()?;
            image.place(bucket, slot, record.peer);
            applied += 1;
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::id::PeerId;

    fn record(first: u8, bucket: usize, slot: usize) -> LogRecord {
        let peer = Peer::new(PeerId::with_first_byte(first), "127.0.0.1", 10 * first as u16);
        LogRecord::new(peer, bucket, slot).unwrap()
    }

    #[test]
    fn codec_record() {
        let record = record(1, 3, 2);

        let mut codec = LogCodec::new();
        let mut dst = BytesMut::new();

        assert!(codec.encode(&record, &mut dst).is_ok());
        assert!(dst.len() > HEADER_LEN);
        assert_eq!(codec.decode(&mut dst).unwrap().unwrap(), record);
        assert!(dst.is_empty());
    }

    #[test]
    fn codec_partial_frame() {
        let mut dst = BytesMut::new();
        LogCodec.encode(&record(1, 0, 0), &mut dst).unwrap();

        let mut partial = dst.split_to(dst.len() - 1);
        assert!(LogCodec.decode(&mut partial).unwrap().is_none());

        let mut header_only = BytesMut::from(&partial[..HEADER_LEN - 1]);
        assert!(LogCodec.decode(&mut header_only).unwrap().is_none());
    }

    #[test]
    fn append_then_read_at_position() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-1");
        let mut writer = LogWriter::create(&path).unwrap();

        for (i, (bucket, slot)) in [(1, 1), (2, 1), (3, 2), (4, 3)].into_iter().enumerate() {
            let record = record(i as u8 + 1, bucket, slot);
            let position = writer.position();
            writer.append(&record).unwrap();

            let mut reader = LogReader::open_at(&path, position).unwrap();
            assert_eq!(reader.read_next().unwrap(), Some(record));
            assert_eq!(reader.position(), writer.position());
            assert!(reader.read_next().unwrap().is_none());
        }
    }

    #[test]
    fn truncated_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-1");
        let mut writer = LogWriter::create(&path).unwrap();
        writer.append(&record(1, 0, 0)).unwrap();
        let boundary = writer.position();
        writer.append(&record(2, 0, 1)).unwrap();

        // Chop the last byte off the second record.
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();

        let mut reader = LogReader::open(&path).unwrap();
        assert!(reader.read_next().unwrap().is_some());
        assert!(matches!(
            reader.read_next(),
            Err(WalError::Truncated { position }) if position == boundary
        ));
    }

    #[test]
    fn replay_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-1");
        let mut writer = LogWriter::create(&path).unwrap();

        let records: Vec<_> = (0..3).map(|i| record(i as u8 + 1, 0, i)).collect();
        for record in &records {
            writer.append(record).unwrap();
        }

        let mut image = TableImage::new();
        let applied = LogReader::open(&path)
            .unwrap()
            .replay_into(&mut image)
            .unwrap();

        assert_eq!(applied, 3);
        let expected: Vec<Peer> = records.into_iter().map(|r| r.peer).collect();
        assert_eq!(image.bucket(0), &expected[..]);
    }

    #[test]
    fn replay_keeps_prefix_on_bad_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log-1");
        let mut writer = LogWriter::create(&path).unwrap();

        writer.append(&record(1, 0, 0)).unwrap();
        let mut bad = record(2, 0, 0);
        bad.bucket_index = HASH_SIZE as i32;
        writer.append(&bad).unwrap();
        writer.append(&record(3, 0, 1)).unwrap();

        let mut image = TableImage::new();
        let res = LogReader::open(&path).unwrap().replay_into(&mut image);

        assert!(matches!(res, Err(WalError::InvalidAddress { .. })));
        assert_eq!(image.len(), 1);
    }

    #[test]
    fn address_rejects_negative_slot() {
        let mut record = record(1, 0, 0);
        record.slot_index = -1;
        assert!(record.address().is_err());
    }
}
