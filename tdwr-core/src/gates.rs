//! Transcode raw gate data into the canonical 8-bit multi-field layout.
//!
//! Two wire layouts feed one output layout:
//! - Normal PRF: gate-major 8-byte records
//!   `{dbz u8, snr u8, vel u16, width u8, flags u8, dealiased vel u16}`
//! - Low PRF: field-major arrays `dbz[n], snr[n], flags[n]`
//!
//! Output gates carry `DBZ, SNR, VEL, SW, VEL_DEALIASED` in that order.
//! Reflectivity, SNR and width bytes pass through unchanged; both velocities
//! are requantized from the 16-bit wire scale to the configured byte scale.

use crate::config::{Config, FieldScale, LowPrfOptions, QualityFlags};
use crate::types::*;

/// Bytes per normal-PRF gate record.
pub const NORMAL_GATE_SIZE: usize = 8;
/// Parallel arrays in a low-PRF data region.
pub const LOW_PRF_ARRAYS: usize = 3;

/// Fields in the canonical output layout.
pub const NUM_FIELDS: usize = 5;
/// Fields carried by a low-PRF beam when missing fields are not added.
pub const LOW_PRF_FIELDS: usize = 2;

pub const DBZ: usize = 0;
pub const SNR: usize = 1;
pub const VEL: usize = 2;
pub const WIDTH: usize = 3;
pub const DEALIASED_VEL: usize = 4;

pub const FIELD_NAMES: [&str; NUM_FIELDS] = ["DBZ", "SNR", "VEL", "SW", "VEL_DEALIASED"];
pub const FIELD_UNITS: [&str; NUM_FIELDS] = ["dBZ", "dB", "m/s", "m/s", "m/s"];

/// Wire reflectivity: dBZ = byte * 0.5 - 30.
pub const WIRE_DBZ_SCALE: f64 = 0.5;
pub const WIRE_DBZ_BIAS: f64 = -30.0;

/// Wire velocity: m/s = raw * 0.01 - 327.68.
pub const WIRE_VELOCITY_SCALE: f64 = 0.01;
pub const WIRE_VELOCITY_BIAS: f64 = -327.68;

// Normal-PRF flag byte
pub const FLAG_VALID: u8 = 0x80;
pub const FLAG_CONDITIONED_VALID: u8 = 0x40;
pub const FLAG_POINT_TARGET: u8 = 0x20;
pub const FLAG_DEALIAS_FAILURE: u8 = 0x10;

// Low-PRF flag array
pub const LOW_PRF_FLAG_COMPRESSED_VALID: u8 = 0x80;
pub const LOW_PRF_FLAG_POINT_TARGET: u8 = 0x20;

/// Settings the transcoder needs, pulled out of the full config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TranscoderSettings {
    pub min_dbz: f64,
    pub velocity: FieldScale,
    pub quality: QualityFlags,
    pub low_prf: LowPrfOptions,
}

impl From<&Config> for TranscoderSettings {
    fn from(config: &Config) -> Self {
        TranscoderSettings {
            min_dbz: config.thresholds.min_dbz,
            velocity: config.fields.vel,
            quality: config.quality,
            low_prf: config.low_prf,
        }
    }
}

/// Transcoded gate data for one radial.
#[derive(Debug, Clone, PartialEq)]
pub struct GateData {
    pub num_gates: usize,
    pub num_fields: usize,
    pub data: Vec<u8>,
}

/// Per-radial gate transcoder. Derived constants are computed once.
#[derive(Debug, Clone)]
pub struct GateTranscoder {
    settings: TranscoderSettings,
    min_dbz_byte: i32,
    // compressed = raw * velocity_factor + velocity_offset
    velocity_factor: f64,
    velocity_offset: f64,
    min_compressed_velocity: f64,
    max_compressed_velocity: f64,
    // Output byte bounds, always within [0, 255] with lo <= hi
    velocity_byte_lo: f64,
    velocity_byte_hi: f64,
}

impl GateTranscoder {
    pub fn new(settings: TranscoderSettings) -> Self {
        let out = settings.velocity;
        let velocity_factor = WIRE_VELOCITY_SCALE / out.scale;
        let velocity_offset = (WIRE_VELOCITY_BIAS - out.bias) / out.scale;
        let lo = velocity_offset;
        let hi = u16::MAX as f64 * velocity_factor + velocity_offset;
        let min_compressed_velocity = lo.min(hi);
        let max_compressed_velocity = lo.max(hi);
        GateTranscoder {
            settings,
            min_dbz_byte: (2.0 * (settings.min_dbz + 30.0)).round() as i32,
            velocity_factor,
            velocity_offset,
            min_compressed_velocity,
            max_compressed_velocity,
            velocity_byte_lo: byte_bound(min_compressed_velocity),
            velocity_byte_hi: byte_bound(max_compressed_velocity),
        }
    }

    pub fn settings(&self) -> &TranscoderSettings {
        &self.settings
    }

    pub fn min_dbz_byte(&self) -> i32 {
        self.min_dbz_byte
    }

    /// Output-domain values for the smallest and largest wire velocity.
    pub fn compressed_velocity_range(&self) -> (f64, f64) {
        (self.min_compressed_velocity, self.max_compressed_velocity)
    }

    /// Fields per output gate for a radial of this kind.
    pub fn output_fields(&self, low_prf: bool) -> usize {
        if low_prf && !self.settings.low_prf.add_missing_fields {
            LOW_PRF_FIELDS
        } else {
            NUM_FIELDS
        }
    }

    /// Output gate count for `wire_gates` input gates.
    pub fn output_gates(&self, low_prf: bool, wire_gates: usize) -> usize {
        if low_prf && self.duplicates_low_prf_gates() {
            wire_gates * 2
        } else {
            wire_gates
        }
    }

    fn duplicates_low_prf_gates(&self) -> bool {
        let opts = self.settings.low_prf;
        opts.add_missing_fields && opts.adjust_spacing
    }

    fn below_threshold(&self, dbz: u8) -> bool {
        (dbz as i32) < self.min_dbz_byte
    }

    /// Requantize a 16-bit wire velocity to an output byte.
    ///
    /// Values outside the byte range clip to 0 or 255. A NaN result maps to 0.
    pub fn compress_velocity(&self, raw: u16) -> u8 {
        let compressed = raw as f64 * self.velocity_factor + self.velocity_offset;
        compressed
            .round()
            .clamp(self.velocity_byte_lo, self.velocity_byte_hi) as u8
    }

    /// Transcode a normal-PRF data region holding `num_gates` records.
    pub fn transcode_normal(&self, num_gates: usize, data: &[u8]) -> Result<GateData> {
        ensure_len(data, num_gates * NORMAL_GATE_SIZE, "normal-PRF gate data")?;
        let mut out = vec![0u8; num_gates * NUM_FIELDS];

        for (src, dst) in data[..num_gates * NORMAL_GATE_SIZE]
            .chunks_exact(NORMAL_GATE_SIZE)
            .zip(out.chunks_exact_mut(NUM_FIELDS))
        {
            if self.below_threshold(src[0]) {
                continue;
            }
            dst[DBZ] = src[0];
            dst[SNR] = src[1];
            dst[VEL] = self.compress_velocity(be_u16(src, 2));
            dst[WIDTH] = src[4];
            dst[DEALIASED_VEL] = self.compress_velocity(be_u16(src, 6));
            self.censor_normal(src[5], dst);
        }

        Ok(GateData {
            num_gates,
            num_fields: NUM_FIELDS,
            data: out,
        })
    }

    fn censor_normal(&self, flags: u8, gate: &mut [u8]) {
        let q = self.settings.quality;
        if q.point_target && flags & FLAG_POINT_TARGET != 0 {
            gate.fill(0);
            return;
        }
        if q.conditioned_valid && flags & FLAG_CONDITIONED_VALID == 0 {
            gate[VEL] = 0;
            gate[WIDTH] = 0;
            gate[DEALIASED_VEL] = 0;
        }
        if q.valid && flags & FLAG_VALID == 0 {
            gate[DBZ] = 0;
            gate[VEL] = 0;
            gate[WIDTH] = 0;
            gate[DEALIASED_VEL] = 0;
        }
        if q.dealias_failure && flags & FLAG_DEALIAS_FAILURE != 0 {
            gate[DEALIASED_VEL] = 0;
        }
    }

    /// Transcode a low-PRF data region of three `num_gates`-long arrays.
    pub fn transcode_low_prf(&self, num_gates: usize, data: &[u8]) -> Result<GateData> {
        ensure_len(data, num_gates * LOW_PRF_ARRAYS, "low-PRF gate data")?;
        let dbz = &data[..num_gates];
        let snr = &data[num_gates..2 * num_gates];
        let flags = &data[2 * num_gates..3 * num_gates];

        let q = self.settings.quality;
        let num_fields = self.output_fields(true);
        let out_gates = self.output_gates(true, num_gates);
        let stride = if self.duplicates_low_prf_gates() { 2 } else { 1 };
        let mut out = vec![0u8; out_gates * num_fields];

        for i in 0..num_gates {
            if self.below_threshold(dbz[i]) {
                continue;
            }
            let mut d = dbz[i];
            let mut s = snr[i];
            if q.point_target && flags[i] & LOW_PRF_FLAG_POINT_TARGET != 0 {
                d = 0;
            }
            if q.valid && flags[i] & LOW_PRF_FLAG_COMPRESSED_VALID == 0 {
                d = 0;
                s = 0;
            }
            // Missing velocity fields stay zero.
            for slot in i * stride..(i + 1) * stride {
                out[slot * num_fields + DBZ] = d;
                out[slot * num_fields + SNR] = s;
            }
        }

        Ok(GateData {
            num_gates: out_gates,
            num_fields,
            data: out,
        })
    }
}

/// Clip an output-domain velocity bound into the byte range.
fn byte_bound(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 255.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
