//! Shared types, error enum, and output message types for tdwr-core.

use serde::Serialize;
use thiserror::Error;

/// All errors produced by tdwr-core.
#[derive(Debug, Error)]
pub enum TdwrError {
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("declared length {declared} does not fit {what} of {actual} bytes")]
    LengthMismatch {
        what: &'static str,
        declared: usize,
        actual: usize,
    },
    #[error("unrecognized message id: {0:#06x}")]
    UnknownMessageId(u16),
    #[error("unrecognized scan strategy: {0}")]
    UnknownScanStrategy(u8),
    #[error("output sink failed: {0}")]
    Sink(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TdwrError>;

// ---------------------------------------------------------------------------
// Big-endian readers
// ---------------------------------------------------------------------------

/// Fail with `Truncated` unless `buf` holds at least `needed` bytes.
pub fn ensure_len(buf: &[u8], needed: usize, what: &'static str) -> Result<()> {
    if buf.len() < needed {
        return Err(TdwrError::Truncated {
            what,
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

/// Read a big-endian u16 at `offset`. Caller checks length first.
#[inline]
pub fn be_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Read a big-endian u32 at `offset`. Caller checks length first.
#[inline]
pub fn be_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Read a big-endian IEEE-754 f32 at `offset`. Caller checks length first.
#[inline]
pub fn be_f32(buf: &[u8], offset: usize) -> f32 {
    f32::from_bits(be_u32(buf, offset))
}

// ---------------------------------------------------------------------------
// Scan classification
// ---------------------------------------------------------------------------

/// Antenna motion for a tilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanMode {
    Ppi,
    Rhi,
    Sector,
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Ppi => write!(f, "PPI"),
            ScanMode::Rhi => write!(f, "RHI"),
            ScanMode::Sector => write!(f, "sector"),
        }
    }
}

/// Scan-strategy family. `Unknown` stands in for a malformed code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanType {
    /// Monitor, clear-air and clutter scans.
    Routine,
    Hazardous,
    Unknown,
}

impl ScanType {
    /// Numeric code used downstream: 1 routine, 2 hazardous, 0 unknown.
    pub fn code(&self) -> u8 {
        match self {
            ScanType::Routine => 1,
            ScanType::Hazardous => 2,
            ScanType::Unknown => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Output messages
// ---------------------------------------------------------------------------

/// Description of one field in the canonical gate layout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub name: &'static str,
    pub units: &'static str,
    pub scale: f64,
    pub bias: f64,
}

/// Radar parameters and field descriptors, sent at every tilt start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadarParams {
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
    pub wavelength_cm: f64,
    pub beam_width_h: f64,
    pub beam_width_v: f64,
    pub pulse_width_us: f64,
    pub start_range_km: f64,
    pub gate_spacing_km: f64,
    pub num_gates: usize,
    pub prf_hz: f64,
    pub scan_mode: ScanMode,
    pub scan_type: ScanType,
    pub low_prf: bool,
    pub fields: Vec<FieldInfo>,
}

/// One radial of canonical gate data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Beam {
    pub azimuth: f64,
    pub elevation: f64,
    pub tilt: u8,
    pub volume: u32,
    pub timestamp: u32,
    pub num_gates: usize,
    pub num_fields: usize,
    pub data: Vec<u8>,
}

impl Beam {
    /// Field values for one gate, in canonical order. `None` past the last gate.
    pub fn gate(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(self.num_fields)?;
        self.data.get(start..start.checked_add(self.num_fields)?)
    }
}

/// Everything the processor hands to the sink, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutputMessage {
    StartOfVolume { volume: u32, timestamp: u32 },
    EndOfVolume { volume: u32, timestamp: u32 },
    StartOfTilt { tilt: u8, timestamp: u32 },
    EndOfTilt { tilt: u8, timestamp: u32 },
    ScanTypeChange { scan_mode: ScanMode },
    Params(RadarParams),
    Beam(Beam),
}

impl OutputMessage {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            OutputMessage::StartOfVolume { .. } => "start-of-volume",
            OutputMessage::EndOfVolume { .. } => "end-of-volume",
            OutputMessage::StartOfTilt { .. } => "start-of-tilt",
            OutputMessage::EndOfTilt { .. } => "end-of-tilt",
            OutputMessage::ScanTypeChange { .. } => "scan-type-change",
            OutputMessage::Params(_) => "params",
            OutputMessage::Beam(_) => "beam",
        }
    }
}

/// Downstream consumer of output messages.
///
/// A failed `send` stops processing: volume and tilt counters would
/// otherwise drift from what the sink has recorded.
pub trait OutputSink {
    fn send(&mut self, msg: &OutputMessage) -> Result<()>;
}

impl OutputSink for Vec<OutputMessage> {
    fn send(&mut self, msg: &OutputMessage) -> Result<()> {
        self.push(msg.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_be_readers() {
        let buf = [0x12, 0x34, 0x56, 0x78, 0x3F, 0x80, 0x00, 0x00];
        assert_eq!(be_u16(&buf, 0), 0x1234);
        assert_eq!(be_u32(&buf, 0), 0x12345678);
        assert_eq!(be_f32(&buf, 4), 1.0);
    }

    #[test]
    fn test_ensure_len() {
        assert!(ensure_len(&[0; 4], 4, "x").is_ok());
        match ensure_len(&[0; 3], 4, "x") {
            Err(TdwrError::Truncated {
                needed, available, ..
            }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 3);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_type_codes() {
        assert_eq!(ScanType::Routine.code(), 1);
        assert_eq!(ScanType::Hazardous.code(), 2);
        assert_eq!(ScanType::Unknown.code(), 0);
    }

    #[test]
    fn test_beam_gate_bounds() {
        let beam = Beam {
            azimuth: 0.0,
            elevation: 0.5,
            tilt: 1,
            volume: 1,
            timestamp: 0,
            num_gates: 2,
            num_fields: 3,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(beam.gate(0), Some(&[1, 2, 3][..]));
        assert_eq!(beam.gate(1), Some(&[4, 5, 6][..]));
        assert_eq!(beam.gate(2), None);
        assert_eq!(beam.gate(usize::MAX), None);
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<OutputMessage> = Vec::new();
        sink.send(&OutputMessage::StartOfTilt {
            tilt: 3,
            timestamp: 10,
        })
        .unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].kind(), "start-of-tilt");
    }
}
