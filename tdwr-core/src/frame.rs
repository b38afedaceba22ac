//! Reassemble radial messages from the fragmented UDP transport.
//!
//! Responsibilities:
//! - Decode the 16-byte transport frame header (big-endian)
//! - Track the source-wide sequence number and detect lost frames
//! - Concatenate frame payloads from the first frame through the last
//! - Discard any partial message that spans a sequence gap
//!
//! There is no reassembly timeout. A message whose last frame never arrives
//! stays open until the next sequence gap discards it.

use log::{debug, warn};

use crate::types::*;

/// Transport frame header size, including two trailing pad bytes.
pub const FRAME_HEADER_SIZE: usize = 16;

/// Largest datagram the transport can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Frame index carried by the first frame of every message.
pub const FIRST_FRAME_INDEX: u16 = 0;

// ---------------------------------------------------------------------------
// Transport frame
// ---------------------------------------------------------------------------

/// Decoded transport frame header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameHeader {
    /// Increases by one per frame across all messages from a source.
    pub sequence: u32,
    /// Total byte length of the message this frame belongs to.
    pub message_length: u16,
    /// Index of the final frame of the message.
    pub frame_count: u16,
    pub frame_index: u16,
    /// Byte offset of this payload within the message.
    pub payload_offset: u16,
    pub payload_length: u16,
}

impl FrameHeader {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, FRAME_HEADER_SIZE, "frame header")?;
        Ok(FrameHeader {
            sequence: be_u32(buf, 0),
            message_length: be_u16(buf, 4),
            frame_count: be_u16(buf, 6),
            frame_index: be_u16(buf, 8),
            payload_offset: be_u16(buf, 10),
            payload_length: be_u16(buf, 12),
        })
    }

    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut out = [0u8; FRAME_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.sequence.to_be_bytes());
        out[4..6].copy_from_slice(&self.message_length.to_be_bytes());
        out[6..8].copy_from_slice(&self.frame_count.to_be_bytes());
        out[8..10].copy_from_slice(&self.frame_index.to_be_bytes());
        out[10..12].copy_from_slice(&self.payload_offset.to_be_bytes());
        out[12..14].copy_from_slice(&self.payload_length.to_be_bytes());
        out
    }

    pub fn is_first(&self) -> bool {
        self.frame_index == FIRST_FRAME_INDEX
    }

    pub fn is_last(&self) -> bool {
        self.frame_index == self.frame_count
    }
}

/// A transport frame borrowed from a datagram buffer.
#[derive(Debug, Clone, Copy)]
pub struct TransportFrame<'a> {
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

/// Split a datagram into header and payload.
///
/// The payload length declared in the header must fit inside the datagram.
pub fn parse_transport_frame(datagram: &[u8]) -> Result<TransportFrame<'_>> {
    let header = FrameHeader::parse(datagram)?;
    let end = FRAME_HEADER_SIZE + header.payload_length as usize;
    if end > datagram.len() {
        return Err(TdwrError::LengthMismatch {
            what: "datagram",
            declared: end,
            actual: datagram.len(),
        });
    }
    Ok(TransportFrame {
        header,
        payload: &datagram[FRAME_HEADER_SIZE..end],
    })
}

// ---------------------------------------------------------------------------
// Reassembler
// ---------------------------------------------------------------------------

/// Counters kept by the reassembler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReassemblyStats {
    pub frames: u64,
    pub malformed_frames: u64,
    /// Frames missing according to sequence numbers.
    pub lost_frames: u64,
    /// Frames dropped while waiting for the start of a message.
    pub discarded_frames: u64,
    pub messages: u64,
    /// Partial messages thrown away.
    pub aborted_messages: u64,
}

/// Rebuilds complete radial messages from consecutive transport frames.
///
/// Owned by the single ingest loop; feed it every datagram in arrival order.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    in_progress: bool,
    last_sequence: Option<u32>,
    buffer: Vec<u8>,
    first: Option<FrameHeader>,
    pub stats: ReassemblyStats,
}

impl FrameReassembler {
    pub fn new() -> Self {
        FrameReassembler::default()
    }

    /// True while a message has started but not completed.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Header of the first frame of the message being assembled.
    pub fn first_header(&self) -> Option<&FrameHeader> {
        self.first.as_ref()
    }

    /// Feed one datagram. Returns the complete message when this frame
    /// finishes one.
    ///
    /// A malformed datagram is an error but leaves reassembly state alone;
    /// the next sequence check decides whether the open message survives.
    pub fn push(&mut self, datagram: &[u8]) -> Result<Option<&[u8]>> {
        let frame = match parse_transport_frame(datagram) {
            Ok(f) => f,
            Err(e) => {
                self.stats.malformed_frames += 1;
                return Err(e);
            }
        };
        let header = frame.header;
        self.stats.frames += 1;

        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if header.sequence != expected {
                let missing = header.sequence.wrapping_sub(expected);
                self.stats.lost_frames += missing as u64;
                warn!(
                    "Sequence gap: expected {expected}, got {} ({missing} frames lost)",
                    header.sequence
                );
                self.abort();
            }
        }
        self.last_sequence = Some(header.sequence);

        if !self.in_progress {
            if !header.is_first() {
                self.stats.discarded_frames += 1;
                debug!(
                    "Discarding frame {}/{} while waiting for a message start",
                    header.frame_index, header.frame_count
                );
                return Ok(None);
            }
            self.buffer.clear();
            self.first = Some(header);
            self.in_progress = true;
        }

        self.buffer.extend_from_slice(frame.payload);

        let declared = self
            .first
            .map(|h| h.message_length as usize)
            .unwrap_or_default();

        if !header.is_last() {
            if self.buffer.len() > declared {
                let actual = self.buffer.len();
                self.abort();
                return Err(TdwrError::LengthMismatch {
                    what: "reassembled message",
                    declared,
                    actual,
                });
            }
            return Ok(None);
        }

        self.in_progress = false;
        if self.buffer.len() < declared {
            self.stats.aborted_messages += 1;
            return Err(TdwrError::LengthMismatch {
                what: "reassembled message",
                declared,
                actual: self.buffer.len(),
            });
        }

        self.stats.messages += 1;
        Ok(Some(&self.buffer[..declared]))
    }

    fn abort(&mut self) {
        if self.in_progress {
            self.stats.aborted_messages += 1;
            self.in_progress = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
