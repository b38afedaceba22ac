//! Configuration file management for tdwr-ingest.
//!
//! Reads/writes `~/.tdwr-ingest/config.yaml` with transport settings, radar
//! site constants, output field scaling, and gate censoring switches.

use std::path::{Path, PathBuf};

use crate::gates::{WIRE_VELOCITY_BIAS, WIRE_VELOCITY_SCALE};
use crate::types::TdwrError;

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub transport: TransportConfig,
    pub site: SiteConfig,
    pub thresholds: ThresholdConfig,
    pub fields: FieldScales,
    pub quality: QualityFlags,
    pub low_prf: LowPrfOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    pub udp_port: u16,
    pub tape_device: String,
}

/// Radar site constants copied into every parameter message.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
    pub wavelength_cm: f64,
    pub beam_width_h: f64,
    pub beam_width_v: f64,
    pub pulse_width_us: f64,
    pub gate_spacing_km: f64,
    pub low_prf_gate_spacing_km: f64,
    pub start_range_km: f64,
    /// Added to the wire azimuth to reference true north.
    pub azimuth_correction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdConfig {
    /// Gates below this reflectivity are zeroed entirely.
    pub min_dbz: f64,
}

/// Linear scaling of one output byte: value = byte * scale + bias.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldScale {
    pub scale: f64,
    pub bias: f64,
}

/// Output scaling per field. Dealiased velocity shares `vel`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldScales {
    pub dbz: FieldScale,
    pub snr: FieldScale,
    pub vel: FieldScale,
    pub width: FieldScale,
}

/// Which per-gate quality flags censor output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityFlags {
    pub point_target: bool,
    pub conditioned_valid: bool,
    /// Also governs the low-PRF compressed-valid flag.
    pub valid: bool,
    pub dealias_failure: bool,
}

/// Handling of low-PRF radials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowPrfOptions {
    pub eliminate: bool,
    pub add_missing_fields: bool,
    pub adjust_spacing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            transport: TransportConfig {
                udp_port: 3280,
                tape_device: "/dev/nst0".into(),
            },
            site: SiteConfig {
                name: "TDWR".into(),
                latitude: 0.0,
                longitude: 0.0,
                altitude_km: 0.0,
                wavelength_cm: 5.3,
                beam_width_h: 0.55,
                beam_width_v: 0.55,
                pulse_width_us: 1.1,
                gate_spacing_km: 0.15,
                low_prf_gate_spacing_km: 0.3,
                start_range_km: 0.0,
                azimuth_correction: 0.0,
            },
            thresholds: ThresholdConfig { min_dbz: -30.0 },
            fields: FieldScales {
                dbz: FieldScale {
                    scale: 0.5,
                    bias: -30.0,
                },
                snr: FieldScale {
                    scale: 0.5,
                    bias: -30.0,
                },
                vel: FieldScale {
                    scale: 0.5,
                    bias: -64.0,
                },
                width: FieldScale {
                    scale: 0.25,
                    bias: 0.0,
                },
            },
            quality: QualityFlags {
                point_target: true,
                conditioned_valid: true,
                valid: true,
                dealias_failure: false,
            },
            low_prf: LowPrfOptions {
                eliminate: false,
                add_missing_fields: true,
                adjust_spacing: false,
            },
        }
    }
}

/// Get the config directory path (`~/.tdwr-ingest/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".tdwr-ingest")
}

/// Get the default config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.tdwr-ingest/config.yaml`.
///
/// Returns default config if the file doesn't exist. A file that exists but
/// doesn't parse is an error.
pub fn load_config() -> Result<Config, TdwrError> {
    let path = config_file();
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config_from(&path)
}

/// Load config from an explicit path. A missing file is an error here.
pub fn load_config_from(path: &Path) -> Result<Config, TdwrError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| TdwrError::Config(format!("{}: {e}", path.display())))?;
    parse_config(&text)
}

/// Save config to `~/.tdwr-ingest/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf, TdwrError> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir).map_err(|e| TdwrError::Config(e.to_string()))?;

    let path = config_file();
    std::fs::write(&path, serialize_config(config))
        .map_err(|e| TdwrError::Config(e.to_string()))?;

    Ok(path)
}

/// Parse simple YAML-like config text. Unknown keys are ignored; a value
/// that doesn't parse for its key is an error.
pub fn parse_config(text: &str) -> Result<Config, TdwrError> {
    let mut config = Config::default();
    let mut section: Option<String> = None;

    for (lineno, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');
        let Some((key, val)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            section = if val.is_empty() {
                Some(key.to_string())
            } else {
                None
            };
            continue;
        }

        let Some(ref section) = section else {
            continue;
        };
        apply_key(&mut config, section, key, val).map_err(|msg| {
            TdwrError::Config(format!("line {}: {section}.{key}: {msg}", lineno + 1))
        })?;
    }

    check_velocity_scale(&config.fields.vel)?;
    Ok(config)
}

/// The output velocity scale must map some part of the wire velocity range
/// into the byte range.
fn check_velocity_scale(vel: &FieldScale) -> Result<(), TdwrError> {
    let wire_min = WIRE_VELOCITY_BIAS;
    let wire_max = u16::MAX as f64 * WIRE_VELOCITY_SCALE + WIRE_VELOCITY_BIAS;
    let a = (wire_min - vel.bias) / vel.scale;
    let b = (wire_max - vel.bias) / vel.scale;
    let (lo, hi) = (a.min(b), a.max(b));
    if !(hi >= 0.0 && lo <= 255.0) {
        return Err(TdwrError::Config(format!(
            "fields.vel: scale {} and bias {} map no wire velocity into 0..=255",
            vel.scale, vel.bias
        )));
    }
    Ok(())
}

fn apply_key(config: &mut Config, section: &str, key: &str, val: &str) -> Result<(), String> {
    match section {
        "transport" => match key {
            "udp_port" => config.transport.udp_port = parse_num(val)?,
            "tape_device" => config.transport.tape_device = parse_string_value(val),
            _ => {}
        },
        "site" => {
            let site = &mut config.site;
            match key {
                "name" => site.name = parse_string_value(val),
                "latitude" => site.latitude = parse_num(val)?,
                "longitude" => site.longitude = parse_num(val)?,
                "altitude_km" => site.altitude_km = parse_num(val)?,
                "wavelength_cm" => site.wavelength_cm = parse_num(val)?,
                "beam_width_h" => site.beam_width_h = parse_num(val)?,
                "beam_width_v" => site.beam_width_v = parse_num(val)?,
                "pulse_width_us" => site.pulse_width_us = parse_num(val)?,
                "gate_spacing_km" => site.gate_spacing_km = parse_num(val)?,
                "low_prf_gate_spacing_km" => site.low_prf_gate_spacing_km = parse_num(val)?,
                "start_range_km" => site.start_range_km = parse_num(val)?,
                "azimuth_correction" => site.azimuth_correction = parse_num(val)?,
                _ => {}
            }
        }
        "thresholds" => {
            if key == "min_dbz" {
                config.thresholds.min_dbz = parse_num(val)?;
            }
        }
        "fields" => {
            let fields = &mut config.fields;
            match key {
                "dbz_scale" => fields.dbz.scale = parse_num(val)?,
                "dbz_bias" => fields.dbz.bias = parse_num(val)?,
                "snr_scale" => fields.snr.scale = parse_num(val)?,
                "snr_bias" => fields.snr.bias = parse_num(val)?,
                "vel_scale" => fields.vel.scale = parse_nonzero(val)?,
                "vel_bias" => fields.vel.bias = parse_num(val)?,
                "width_scale" => fields.width.scale = parse_num(val)?,
                "width_bias" => fields.width.bias = parse_num(val)?,
                _ => {}
            }
        }
        "quality" => {
            let quality = &mut config.quality;
            match key {
                "point_target" => quality.point_target = parse_bool(val)?,
                "conditioned_valid" => quality.conditioned_valid = parse_bool(val)?,
                "valid" => quality.valid = parse_bool(val)?,
                "dealias_failure" => quality.dealias_failure = parse_bool(val)?,
                _ => {}
            }
        }
        "low_prf" => {
            let low_prf = &mut config.low_prf;
            match key {
                "eliminate" => low_prf.eliminate = parse_bool(val)?,
                "add_missing_fields" => low_prf.add_missing_fields = parse_bool(val)?,
                "adjust_spacing" => low_prf.adjust_spacing = parse_bool(val)?,
                _ => {}
            }
        }
        _ => {}
    }
    Ok(())
}

fn parse_string_value(val: &str) -> String {
    if (val.starts_with('"') && val.ends_with('"') && val.len() >= 2)
        || (val.starts_with('\'') && val.ends_with('\'') && val.len() >= 2)
    {
        return val[1..val.len() - 1].to_string();
    }
    val.to_string()
}

fn parse_num<T: std::str::FromStr>(val: &str) -> Result<T, String> {
    val.parse()
        .map_err(|_| format!("invalid number {val:?}"))
}

fn parse_nonzero(val: &str) -> Result<f64, String> {
    let v: f64 = parse_num(val)?;
    if !v.is_finite() || v == 0.0 {
        return Err("scale must be finite and non-zero".into());
    }
    Ok(v)
}

fn parse_bool(val: &str) -> Result<bool, String> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Ok(true),
        "false" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid boolean {val:?}")),
    }
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let site = &config.site;
    let fields = &config.fields;
    let mut lines = vec!["# tdwr-ingest configuration".to_string(), String::new()];

    lines.push("transport:".into());
    lines.push(format!("  udp_port: {}", config.transport.udp_port));
    lines.push(format!("  tape_device: \"{}\"", config.transport.tape_device));
    lines.push(String::new());

    lines.push("site:".into());
    lines.push(format!("  name: \"{}\"", site.name));
    lines.push(format!("  latitude: {}", site.latitude));
    lines.push(format!("  longitude: {}", site.longitude));
    lines.push(format!("  altitude_km: {}", site.altitude_km));
    lines.push(format!("  wavelength_cm: {}", site.wavelength_cm));
    lines.push(format!("  beam_width_h: {}", site.beam_width_h));
    lines.push(format!("  beam_width_v: {}", site.beam_width_v));
    lines.push(format!("  pulse_width_us: {}", site.pulse_width_us));
    lines.push(format!("  gate_spacing_km: {}", site.gate_spacing_km));
    lines.push(format!("  low_prf_gate_spacing_km: {}", site.low_prf_gate_spacing_km));
    lines.push(format!("  start_range_km: {}", site.start_range_km));
    lines.push(format!("  azimuth_correction: {}", site.azimuth_correction));
    lines.push(String::new());

    lines.push("thresholds:".into());
    lines.push(format!("  min_dbz: {}", config.thresholds.min_dbz));
    lines.push(String::new());

    lines.push("fields:".into());
    for (name, f) in [
        ("dbz", fields.dbz),
        ("snr", fields.snr),
        ("vel", fields.vel),
        ("width", fields.width),
    ] {
        lines.push(format!("  {name}_scale: {}", f.scale));
        lines.push(format!("  {name}_bias: {}", f.bias));
    }
    lines.push(String::new());

    let q = &config.quality;
    lines.push("quality:".into());
    lines.push(format!("  point_target: {}", q.point_target));
    lines.push(format!("  conditioned_valid: {}", q.conditioned_valid));
    lines.push(format!("  valid: {}", q.valid));
    lines.push(format!("  dealias_failure: {}", q.dealias_failure));
    lines.push(String::new());

    let l = &config.low_prf;
    lines.push("low_prf:".into());
    lines.push(format!("  eliminate: {}", l.eliminate));
    lines.push(format!("  add_missing_fields: {}", l.add_missing_fields));
    lines.push(format!("  adjust_spacing: {}", l.adjust_spacing));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
