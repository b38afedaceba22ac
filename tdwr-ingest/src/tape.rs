//! Tape / archive playback transport.
//!
//! The device is read in physical blocks of up to `BLOCK_SIZE` bytes. Each
//! block holds back-to-back logical records, each a complete raw radial
//! whose header declares its own length. A record declaring `FILLER_LENGTH`
//! is a filler marker and skips a whole block stride instead.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::{debug, trace};

use tdwr_core::header::{RadialHeader, RADIAL_HEADER_SIZE};
use tdwr_core::{Result, TdwrError};

/// Physical block size.
pub const BLOCK_SIZE: usize = 32_768;
/// Declared length of a filler record.
pub const FILLER_LENGTH: usize = 64;
/// Cursor advance for a filler record.
pub const FILLER_STRIDE: usize = BLOCK_SIZE;

/// One logical record.
#[derive(Debug, PartialEq, Eq)]
pub enum TapeRecord<'a> {
    Filler,
    Radial(&'a [u8]),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TapeStats {
    pub blocks: u64,
    pub records: u64,
    pub fillers: u64,
    pub bad_records: u64,
}

pub struct TapeSource<R> {
    reader: R,
    block: Vec<u8>,
    /// Valid bytes in `block`.
    len: usize,
    cursor: usize,
    pub stats: TapeStats,
}

impl TapeSource<File> {
    /// Open a tape device or recording file. Failure is fatal to the caller.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(TapeSource::new(File::open(path)?))
    }
}

impl<R: Read> TapeSource<R> {
    pub fn new(reader: R) -> Self {
        TapeSource {
            reader,
            block: vec![0u8; BLOCK_SIZE],
            len: 0,
            cursor: 0,
            stats: TapeStats::default(),
        }
    }

    /// Next logical record, or `None` at end of data.
    ///
    /// `TdwrError::Io` is a device read failure and ends the source. Any
    /// other error is a malformed record: the rest of its block is dropped
    /// and the next call starts on the following block.
    pub fn next_record(&mut self) -> Result<Option<TapeRecord<'_>>> {
        loop {
            if self.cursor >= self.len && !self.read_block()? {
                return Ok(None);
            }

            let rest = &self.block[self.cursor..self.len];
            if rest.len() < 4 {
                trace!("Skipping {} trailing bytes in block", rest.len());
                self.cursor = self.len;
                continue;
            }
            let length = RadialHeader::peek_length(rest)? as usize;

            if length == 0 {
                // Zero fill pads out the rest of the block
                self.cursor = self.len;
                continue;
            }

            if length == FILLER_LENGTH {
                self.stats.fillers += 1;
                debug!("Filler record at block offset {}", self.cursor);
                // The stride always reaches past the block, so a filler
                // anywhere in a block ends it and reading resumes at the
                // start of the next physical block.
                self.cursor += FILLER_STRIDE;
                return Ok(Some(TapeRecord::Filler));
            }

            if length < RADIAL_HEADER_SIZE || length > rest.len() {
                self.stats.bad_records += 1;
                let available = rest.len();
                self.cursor = self.len;
                return Err(TdwrError::LengthMismatch {
                    what: "tape record",
                    declared: length,
                    actual: available,
                });
            }

            let start = self.cursor;
            self.cursor += length;
            self.stats.records += 1;
            return Ok(Some(TapeRecord::Radial(&self.block[start..start + length])));
        }
    }

    /// Read the next physical block. A zero-byte read is retried once before
    /// it counts as end of data.
    fn read_block(&mut self) -> Result<bool> {
        self.cursor = 0;
        self.len = 0;
        for attempt in 0..2 {
            let n = read_retrying(&mut self.reader, &mut self.block)?;
            if n > 0 {
                self.len = n;
                self.stats.blocks += 1;
                trace!("Read block {} ({n} bytes)", self.stats.blocks);
                return Ok(true);
            }
            if attempt == 0 {
                debug!("Zero-length tape read, retrying once");
            }
        }
        Ok(false)
    }
}

fn read_retrying<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Write;

    /// A record of `length` bytes whose header declares that length.
    fn record(length: usize, fill: u8) -> Vec<u8> {
        let mut r = vec![fill; length];
        r[0] = 0x2B;
        r[1] = 0x00;
        r[2..4].copy_from_slice(&(length as u16).to_be_bytes());
        r
    }

    fn block(records: &[Vec<u8>]) -> Vec<u8> {
        let mut b: Vec<u8> = records.concat();
        b.resize(BLOCK_SIZE, 0);
        b
    }

    /// Returns one queued chunk per read call, like a tape drive returning
    /// one block per read.
    struct ChunkReader {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Read for ChunkReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    fn chunks(list: Vec<Vec<u8>>) -> ChunkReader {
        ChunkReader {
            chunks: list.into(),
        }
    }

    fn radial_len(rec: Option<TapeRecord<'_>>) -> usize {
        match rec {
            Some(TapeRecord::Radial(r)) => r.len(),
            other => panic!("expected radial, got {other:?}"),
        }
    }

    #[test]
    fn test_records_advance_by_declared_length() {
        let data = block(&[record(100, 1), record(200, 2)]);
        let mut tape = TapeSource::new(io::Cursor::new(data));
        match tape.next_record().unwrap() {
            Some(TapeRecord::Radial(r)) => {
                assert_eq!(r.len(), 100);
                assert_eq!(r[50], 1);
            }
            other => panic!("expected radial, got {other:?}"),
        }
        match tape.next_record().unwrap() {
            Some(TapeRecord::Radial(r)) => assert_eq!(r[150], 2),
            other => panic!("expected radial, got {other:?}"),
        }
        // Zero padding ends the block, then end of data
        assert_eq!(tape.next_record().unwrap(), None);
        assert_eq!(tape.stats.records, 2);
    }

    #[test]
    fn test_filler_skips_whole_stride() {
        let first = block(&[record(FILLER_LENGTH, 9), record(100, 1)]);
        let second = block(&[record(300, 3)]);
        let mut data = first;
        data.extend(second);
        let mut tape = TapeSource::new(io::Cursor::new(data));

        assert_eq!(tape.next_record().unwrap(), Some(TapeRecord::Filler));
        // The 100-byte record after the filler is inside the skipped stride.
        assert_eq!(radial_len(tape.next_record().unwrap()), 300);
        assert_eq!(tape.stats.fillers, 1);
        assert_eq!(tape.stats.blocks, 2);
    }

    #[test]
    fn test_filler_mid_block_ends_block() {
        let first = block(&[record(100, 1), record(FILLER_LENGTH, 9), record(120, 2)]);
        let second = block(&[record(300, 3)]);
        let mut data = first;
        data.extend(second);
        let mut tape = TapeSource::new(io::Cursor::new(data));

        assert_eq!(radial_len(tape.next_record().unwrap()), 100);
        assert_eq!(tape.next_record().unwrap(), Some(TapeRecord::Filler));
        // Resumes at offset 0 of the next block, not at offset 164 within it.
        assert_eq!(radial_len(tape.next_record().unwrap()), 300);
        assert_eq!(tape.next_record().unwrap(), None);
        assert_eq!(tape.stats.records, 2);
    }

    #[test]
    fn test_zero_read_retried_once() {
        let data = block(&[record(100, 1)]);
        let mut tape = TapeSource::new(chunks(vec![Vec::new(), data]));
        assert_eq!(radial_len(tape.next_record().unwrap()), 100);
    }

    #[test]
    fn test_two_zero_reads_end_data() {
        let data = block(&[record(100, 1)]);
        let mut tape = TapeSource::new(chunks(vec![Vec::new(), Vec::new(), data]));
        assert_eq!(tape.next_record().unwrap(), None);
    }

    #[test]
    fn test_short_physical_block() {
        let mut tape = TapeSource::new(chunks(vec![record(120, 4), record(80, 5)]));
        assert_eq!(radial_len(tape.next_record().unwrap()), 120);
        assert_eq!(radial_len(tape.next_record().unwrap()), 80);
        assert_eq!(tape.next_record().unwrap(), None);
    }

    #[test]
    fn test_overlong_record_drops_rest_of_block() {
        let mut bad = record(100, 1);
        bad[2..4].copy_from_slice(&500u16.to_be_bytes());
        let first = bad; // 100 bytes read, 500 declared
        let second = record(90, 2);
        let mut tape = TapeSource::new(chunks(vec![first, second]));

        assert!(matches!(
            tape.next_record(),
            Err(TdwrError::LengthMismatch {
                declared: 500,
                actual: 100,
                ..
            })
        ));
        assert_eq!(radial_len(tape.next_record().unwrap()), 90);
        assert_eq!(tape.stats.bad_records, 1);
    }

    #[test]
    fn test_record_shorter_than_header() {
        let mut tape = TapeSource::new(chunks(vec![record(20, 1)]));
        assert!(tape.next_record().is_err());
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("medium error"))
        }
    }

    #[test]
    fn test_device_error_is_io() {
        let mut tape = TapeSource::new(FailingReader);
        assert!(matches!(tape.next_record(), Err(TdwrError::Io(_))));
    }

    #[test]
    fn test_open_recording_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&block(&[record(FILLER_LENGTH, 0)])).unwrap();
        file.write_all(&block(&[record(64 + 1, 7), record(200, 8)]))
            .unwrap();
        file.flush().unwrap();

        let mut tape = TapeSource::open(file.path()).unwrap();
        assert_eq!(tape.next_record().unwrap(), Some(TapeRecord::Filler));
        assert_eq!(radial_len(tape.next_record().unwrap()), 65);
        assert_eq!(radial_len(tape.next_record().unwrap()), 200);
        assert_eq!(tape.next_record().unwrap(), None);
    }

    #[test]
    fn test_open_missing_device() {
        assert!(TapeSource::open(Path::new("/nonexistent/tdwr-tape")).is_err());
    }
}
