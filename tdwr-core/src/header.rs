//! Decode the fixed-size radial header that leads every TDWR base-data message.
//!
//! The header is big-endian on the wire and decoded field by field into a
//! plain value struct. Flag words stay available as raw integers, but callers
//! should use the named predicates below; bit positions live in the constants.

use crate::types::*;

/// Size of the radial header on the wire.
pub const RADIAL_HEADER_SIZE: usize = 52;

// Message ids
pub const NORMAL_PRF_MESSAGE_ID: u16 = 0x2B00;
pub const LOW_PRF_MESSAGE_ID: u16 = 0x2B01;
pub const LLWAS_MESSAGE_IDS: [u16; 3] = [0x2C00, 0x2C01, 0x2C02];

// Volume flag
pub const VOLUME_START_BIT: u16 = 1 << 14;
pub const SCAN_STRATEGY_MASK: u16 = 0x00FF;

// Scan-info flag
pub const NEW_ELEVATION_BIT: u32 = 1 << 24;
pub const SECTOR_SCAN_BIT: u32 = 1 << 23;
const TILT_NUMBER_SHIFT: u32 = 24;

// Scan strategy codes (low byte of the volume flag)
pub const STRATEGY_MONITOR: u8 = 1;
pub const STRATEGY_HAZARDOUS: u8 = 2;
pub const STRATEGY_CLEAR_AIR: u8 = 3;
pub const STRATEGY_CLUTTER_COLLECTION: u8 = 4;
pub const STRATEGY_CLUTTER_EDIT: u8 = 5;
pub const STRATEGY_RHI: u8 = 6;

/// What a message carries, decided once from its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Wind-shear sensor data multiplexed on the radar feed.
    Llwas,
    LowPrf,
    Normal,
}

impl MessageKind {
    pub fn from_id(message_id: u16) -> Result<Self> {
        match message_id {
            NORMAL_PRF_MESSAGE_ID => Ok(MessageKind::Normal),
            LOW_PRF_MESSAGE_ID => Ok(MessageKind::LowPrf),
            id if LLWAS_MESSAGE_IDS.contains(&id) => Ok(MessageKind::Llwas),
            id => Err(TdwrError::UnknownMessageId(id)),
        }
    }
}

/// Decoded radial header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadialHeader {
    pub message_id: u16,
    pub message_length: u16,
    pub volume_count: u16,
    pub volume_flag: u16,
    pub power_trans: u16,
    pub playback_flag: u16,
    pub scan_info_flag: u32,
    pub elevation: f32,
    pub angular_scan_rate: f32,
    pub pri: u16,
    pub dwell_flag: u16,
    pub final_range_sample: u16,
    pub range_samples_per_dwell: u16,
    pub azimuth: f32,
    pub total_noise_power: f32,
    pub timestamp: u32,
    pub base_data_type: u16,
    pub vol_elev_status: u16,
    pub integer_azimuth: u16,
    pub reserved: u16,
}

impl RadialHeader {
    /// Decode the header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        ensure_len(buf, RADIAL_HEADER_SIZE, "radial header")?;
        Ok(RadialHeader {
            message_id: be_u16(buf, 0),
            message_length: be_u16(buf, 2),
            volume_count: be_u16(buf, 4),
            volume_flag: be_u16(buf, 6),
            power_trans: be_u16(buf, 8),
            playback_flag: be_u16(buf, 10),
            scan_info_flag: be_u32(buf, 12),
            elevation: be_f32(buf, 16),
            angular_scan_rate: be_f32(buf, 20),
            pri: be_u16(buf, 24),
            dwell_flag: be_u16(buf, 26),
            final_range_sample: be_u16(buf, 28),
            range_samples_per_dwell: be_u16(buf, 30),
            azimuth: be_f32(buf, 32),
            total_noise_power: be_f32(buf, 36),
            timestamp: be_u32(buf, 40),
            base_data_type: be_u16(buf, 44),
            vol_elev_status: be_u16(buf, 46),
            integer_azimuth: be_u16(buf, 48),
            reserved: be_u16(buf, 50),
        })
    }

    /// Read only the declared message length. Needs 4 bytes, not a full header.
    pub fn peek_length(buf: &[u8]) -> Result<u16> {
        ensure_len(buf, 4, "message length")?;
        Ok(be_u16(buf, 2))
    }

    /// Encode back to wire order. Used to build recordings and fixtures.
    pub fn to_bytes(&self) -> [u8; RADIAL_HEADER_SIZE] {
        let mut out = [0u8; RADIAL_HEADER_SIZE];
        out[0..2].copy_from_slice(&self.message_id.to_be_bytes());
        out[2..4].copy_from_slice(&self.message_length.to_be_bytes());
        out[4..6].copy_from_slice(&self.volume_count.to_be_bytes());
        out[6..8].copy_from_slice(&self.volume_flag.to_be_bytes());
        out[8..10].copy_from_slice(&self.power_trans.to_be_bytes());
        out[10..12].copy_from_slice(&self.playback_flag.to_be_bytes());
        out[12..16].copy_from_slice(&self.scan_info_flag.to_be_bytes());
        out[16..20].copy_from_slice(&self.elevation.to_be_bytes());
        out[20..24].copy_from_slice(&self.angular_scan_rate.to_be_bytes());
        out[24..26].copy_from_slice(&self.pri.to_be_bytes());
        out[26..28].copy_from_slice(&self.dwell_flag.to_be_bytes());
        out[28..30].copy_from_slice(&self.final_range_sample.to_be_bytes());
        out[30..32].copy_from_slice(&self.range_samples_per_dwell.to_be_bytes());
        out[32..36].copy_from_slice(&self.azimuth.to_be_bytes());
        out[36..40].copy_from_slice(&self.total_noise_power.to_be_bytes());
        out[40..44].copy_from_slice(&self.timestamp.to_be_bytes());
        out[44..46].copy_from_slice(&self.base_data_type.to_be_bytes());
        out[46..48].copy_from_slice(&self.vol_elev_status.to_be_bytes());
        out[48..50].copy_from_slice(&self.integer_azimuth.to_be_bytes());
        out[50..52].copy_from_slice(&self.reserved.to_be_bytes());
        out
    }

    pub fn kind(&self) -> Result<MessageKind> {
        MessageKind::from_id(self.message_id)
    }

    pub fn is_llwas(&self) -> bool {
        LLWAS_MESSAGE_IDS.contains(&self.message_id)
    }

    pub fn is_low_prf(&self) -> bool {
        self.message_id == LOW_PRF_MESSAGE_ID
    }

    pub fn is_new_tilt(&self) -> bool {
        self.scan_info_flag & NEW_ELEVATION_BIT != 0
    }

    pub fn is_new_volume(&self) -> bool {
        self.volume_flag & VOLUME_START_BIT != 0
    }

    /// Raw scan-strategy code from the volume flag.
    pub fn scan_strategy(&self) -> u8 {
        (self.volume_flag & SCAN_STRATEGY_MASK) as u8
    }

    /// Scan-strategy family. Unrecognized codes are an error; callers
    /// usually fall back to `ScanType::Unknown`.
    pub fn scan_type(&self) -> Result<ScanType> {
        match self.scan_strategy() {
            STRATEGY_MONITOR | STRATEGY_CLEAR_AIR | STRATEGY_CLUTTER_COLLECTION
            | STRATEGY_CLUTTER_EDIT => Ok(ScanType::Routine),
            STRATEGY_HAZARDOUS => Ok(ScanType::Hazardous),
            code => Err(TdwrError::UnknownScanStrategy(code)),
        }
    }

    pub fn scan_mode(&self) -> ScanMode {
        if self.scan_info_flag & SECTOR_SCAN_BIT != 0 {
            ScanMode::Sector
        } else if self.scan_strategy() == STRATEGY_RHI {
            ScanMode::Rhi
        } else {
            ScanMode::Ppi
        }
    }

    /// Tilt number, the top byte of the scan-info flag.
    ///
    /// This byte includes the new-elevation bit, so the value read on the
    /// first radial of a tilt is the one to keep.
    pub fn tilt_number(&self) -> u8 {
        (self.scan_info_flag >> TILT_NUMBER_SHIFT) as u8
    }

    /// Number of gates in the data region following the header.
    pub fn num_gates(&self) -> usize {
        self.range_samples_per_dwell as usize
    }

    /// Pulse repetition frequency in Hz. PRI is in microseconds.
    pub fn prf_hz(&self) -> f64 {
        if self.pri == 0 {
            return 0.0;
        }
        1.0e6 / self.pri as f64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
