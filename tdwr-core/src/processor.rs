//! Per-radial pipeline: decode header, update scan state, transcode gates,
//! emit output.
//!
//! `RadialProcessor` owns all decoder state that outlives a single radial
//! (scan tracker, derived transcoder constants, counters). The ingest loop
//! owns the processor and calls `process()` once per complete raw radial.

use log::{debug, warn};

use crate::config::{Config, FieldScales, SiteConfig};
use crate::gates::{self, GateTranscoder, TranscoderSettings};
use crate::header::{MessageKind, RadialHeader, RADIAL_HEADER_SIZE};
use crate::scan::ScanTracker;
use crate::types::*;

/// What happened to one raw radial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadialOutcome {
    /// A beam was emitted.
    Beam,
    /// Wind-shear sensor data, not radar data.
    Llwas,
    /// Low-PRF radial dropped by configuration after its volume check.
    LowPrfDropped,
}

/// Counters kept by the processor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub radials: u64,
    pub llwas_skipped: u64,
    pub low_prf_dropped: u64,
    pub decode_errors: u64,
    pub beams: u64,
}

pub struct RadialProcessor {
    tracker: ScanTracker,
    transcoder: GateTranscoder,
    site: SiteConfig,
    fields: FieldScales,
    pub stats: ProcessorStats,
}

impl RadialProcessor {
    pub fn new(config: &Config) -> Self {
        RadialProcessor {
            tracker: ScanTracker::new(),
            transcoder: GateTranscoder::new(TranscoderSettings::from(config)),
            site: config.site.clone(),
            fields: config.fields.clone(),
            stats: ProcessorStats::default(),
        }
    }

    pub fn tracker(&self) -> &ScanTracker {
        &self.tracker
    }

    pub fn transcoder(&self) -> &GateTranscoder {
        &self.transcoder
    }

    /// Process one complete raw radial.
    ///
    /// Decode errors leave scan state untouched except for a volume boundary
    /// already seen. `TdwrError::Sink` means the sink failed and the caller
    /// must stop.
    pub fn process(&mut self, raw: &[u8], sink: &mut dyn OutputSink) -> Result<RadialOutcome> {
        self.stats.radials += 1;
        let (header, kind) = match decode_radial(raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.stats.decode_errors += 1;
                return Err(e);
            }
        };

        if kind == MessageKind::Llwas {
            self.stats.llwas_skipped += 1;
            return Ok(RadialOutcome::Llwas);
        }

        for msg in self.tracker.update_volume(&header) {
            emit(sink, &msg)?;
        }

        let low_prf = kind == MessageKind::LowPrf;
        if low_prf && self.transcoder.settings().low_prf.eliminate {
            self.stats.low_prf_dropped += 1;
            debug!("Dropping low-PRF radial at az {:.2}", header.azimuth);
            return Ok(RadialOutcome::LowPrfDropped);
        }

        let body = &raw[RADIAL_HEADER_SIZE..header.message_length as usize];
        let num_gates = header.num_gates();
        let transcoded = match kind {
            MessageKind::Normal => self.transcoder.transcode_normal(num_gates, body),
            MessageKind::LowPrf => self.transcoder.transcode_low_prf(num_gates, body),
            MessageKind::Llwas => return Ok(RadialOutcome::Llwas),
        };
        let gate_data = match transcoded {
            Ok(g) => g,
            Err(e) => {
                self.stats.decode_errors += 1;
                return Err(e);
            }
        };

        for msg in self.tracker.update_tilt(&header) {
            let starts_tilt = matches!(msg, OutputMessage::StartOfTilt { .. });
            emit(sink, &msg)?;
            if starts_tilt {
                let params = self.radar_params(&header, low_prf);
                emit(sink, &OutputMessage::Params(params))?;
            }
        }

        let beam = Beam {
            azimuth: true_north_azimuth(header.azimuth as f64, self.site.azimuth_correction),
            elevation: header.elevation as f64,
            tilt: self.tracker.tilt_number().unwrap_or_default(),
            volume: self.tracker.volume_number(),
            timestamp: header.timestamp,
            num_gates: gate_data.num_gates,
            num_fields: gate_data.num_fields,
            data: gate_data.data,
        };
        emit(sink, &OutputMessage::Beam(beam))?;
        self.stats.beams += 1;
        Ok(RadialOutcome::Beam)
    }

    /// Radar parameters and field descriptors for the tilt `header` opens.
    pub fn radar_params(&self, header: &RadialHeader, low_prf: bool) -> RadarParams {
        let scan_type = header.scan_type().unwrap_or_else(|e| {
            warn!("{e}; reporting scan type as unknown");
            ScanType::Unknown
        });

        let wire_gates = header.num_gates();
        let num_gates = self.transcoder.output_gates(low_prf, wire_gates);
        let gate_spacing_km = if low_prf {
            // Duplicated gates halve the spacing.
            self.site.low_prf_gate_spacing_km * wire_gates.max(1) as f64 / num_gates.max(1) as f64
        } else {
            self.site.gate_spacing_km
        };

        let scales = [
            self.fields.dbz,
            self.fields.snr,
            self.fields.vel,
            self.fields.width,
            self.fields.vel,
        ];
        let fields = (0..self.transcoder.output_fields(low_prf))
            .map(|i| FieldInfo {
                name: gates::FIELD_NAMES[i],
                units: gates::FIELD_UNITS[i],
                scale: scales[i].scale,
                bias: scales[i].bias,
            })
            .collect();

        RadarParams {
            site_name: self.site.name.clone(),
            latitude: self.site.latitude,
            longitude: self.site.longitude,
            altitude_km: self.site.altitude_km,
            wavelength_cm: self.site.wavelength_cm,
            beam_width_h: self.site.beam_width_h,
            beam_width_v: self.site.beam_width_v,
            pulse_width_us: self.site.pulse_width_us,
            start_range_km: self.site.start_range_km,
            gate_spacing_km,
            num_gates,
            prf_hz: header.prf_hz(),
            scan_mode: header.scan_mode(),
            scan_type,
            low_prf,
            fields,
        }
    }
}

/// Decode and bounds-check a raw radial.
///
/// The header's declared length must cover the header and fit the buffer.
pub fn decode_radial(raw: &[u8]) -> Result<(RadialHeader, MessageKind)> {
    let header = RadialHeader::parse(raw)?;
    let declared = header.message_length as usize;
    if declared < RADIAL_HEADER_SIZE || declared > raw.len() {
        return Err(TdwrError::LengthMismatch {
            what: "radial",
            declared,
            actual: raw.len(),
        });
    }
    let kind = header.kind()?;
    Ok((header, kind))
}

/// Apply the site's north correction and wrap into [0, 360).
pub fn true_north_azimuth(azimuth: f64, correction: f64) -> f64 {
    let az = (azimuth + correction).rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if az >= 360.0 {
        0.0
    } else {
        az
    }
}

fn emit(sink: &mut dyn OutputSink, msg: &OutputMessage) -> Result<()> {
    sink.send(msg).map_err(|e| match e {
        TdwrError::Sink(_) => e,
        other => TdwrError::Sink(format!("{} message: {other}", msg.kind())),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::{FLAG_CONDITIONED_VALID, FLAG_VALID, LOW_PRF_FLAG_COMPRESSED_VALID};
    use crate::header::*;

    const GATES: u16 = 4;

    struct Radial {
        header: RadialHeader,
    }

    impl Radial {
        fn normal() -> Self {
            Radial {
                header: RadialHeader {
                    message_id: NORMAL_PRF_MESSAGE_ID,
                    volume_flag: STRATEGY_MONITOR as u16,
                    scan_info_flag: 2 << 24,
                    elevation: 0.5,
                    pri: 500,
                    range_samples_per_dwell: GATES,
                    azimuth: 90.0,
                    timestamp: 100,
                    ..Default::default()
                },
            }
        }

        fn low_prf() -> Self {
            let mut r = Radial::normal();
            r.header.message_id = LOW_PRF_MESSAGE_ID;
            r
        }

        fn llwas() -> Self {
            let mut r = Radial::normal();
            r.header.message_id = LLWAS_MESSAGE_IDS[1];
            r.header.volume_flag |= VOLUME_START_BIT;
            r.header.scan_info_flag |= NEW_ELEVATION_BIT;
            r
        }

        fn new_volume(mut self) -> Self {
            self.header.volume_flag |= VOLUME_START_BIT;
            self
        }

        fn new_tilt(mut self, tilt: u8) -> Self {
            self.header.scan_info_flag = ((tilt as u32) << 24) | NEW_ELEVATION_BIT;
            self
        }

        fn strategy(mut self, code: u8) -> Self {
            self.header.volume_flag = (self.header.volume_flag & !0xFF) | code as u16;
            self
        }

        fn at(mut self, timestamp: u32) -> Self {
            self.header.timestamp = timestamp;
            self
        }

        fn bytes(&self) -> Vec<u8> {
            let n = GATES as usize;
            let body: Vec<u8> = match self.header.message_id {
                LOW_PRF_MESSAGE_ID => {
                    let mut b = vec![100u8; n];
                    b.extend(vec![40u8; n]);
                    b.extend(vec![LOW_PRF_FLAG_COMPRESSED_VALID; n]);
                    b
                }
                _ => (0..n)
                    .flat_map(|_| {
                        let v = 32768u16.to_be_bytes();
                        [100, 40, v[0], v[1], 8, FLAG_VALID | FLAG_CONDITIONED_VALID, v[0], v[1]]
                    })
                    .collect(),
            };
            let mut header = self.header.clone();
            header.message_length = (RADIAL_HEADER_SIZE + body.len()) as u16;
            let mut out = header.to_bytes().to_vec();
            out.extend(body);
            out
        }
    }

    fn kinds(msgs: &[OutputMessage]) -> Vec<&'static str> {
        msgs.iter().map(|m| m.kind()).collect()
    }

    fn run(config: &Config, radials: &[Radial]) -> (RadialProcessor, Vec<OutputMessage>) {
        let mut processor = RadialProcessor::new(config);
        let mut sink = Vec::new();
        for r in radials {
            processor.process(&r.bytes(), &mut sink).unwrap();
        }
        (processor, sink)
    }

    #[test]
    fn test_first_radial_hazardous_new_volume() {
        let r = Radial::normal()
            .new_volume()
            .new_tilt(1)
            .strategy(STRATEGY_HAZARDOUS);
        assert_eq!(r.header.scan_type().unwrap().code(), 2);

        let (_, sink) = run(&Config::default(), &[r]);
        assert_eq!(
            kinds(&sink),
            vec![
                "start-of-volume",
                "scan-type-change",
                "start-of-tilt",
                "params",
                "beam"
            ]
        );
        match &sink[3] {
            OutputMessage::Params(p) => {
                assert_eq!(p.scan_type, ScanType::Hazardous);
                assert_eq!(p.num_gates, GATES as usize);
                assert_eq!(p.fields.len(), 5);
                assert!((p.prf_hz - 2000.0).abs() < 1e-9);
            }
            other => panic!("expected params, got {other:?}"),
        }
    }

    #[test]
    fn test_beam_contents() {
        let (_, sink) = run(&Config::default(), &[Radial::normal().new_volume()]);
        let beam = match sink.last() {
            Some(OutputMessage::Beam(b)) => b,
            other => panic!("expected beam, got {other:?}"),
        };
        assert_eq!(beam.volume, 1);
        assert_eq!(beam.tilt, 2);
        assert_eq!(beam.timestamp, 100);
        assert_eq!(beam.num_gates, GATES as usize);
        assert_eq!(beam.num_fields, 5);
        assert_eq!(beam.gate(0), Some(&[100, 40, 128, 8, 128][..]));
        assert_eq!(beam.gate(GATES as usize), None);
        assert_eq!(beam.azimuth, 90.0);
    }

    #[test]
    fn test_new_volume_ends_previous_before_beam() {
        let radials = [
            Radial::normal().new_volume().at(1),
            Radial::normal().at(2),
            Radial::normal().new_volume().new_tilt(1).at(3),
        ];
        let (processor, sink) = run(&Config::default(), &radials);
        let tail = kinds(&sink[sink.len() - 6..sink.len() - 1]);
        assert_eq!(
            tail,
            vec![
                "end-of-volume",
                "start-of-volume",
                "end-of-tilt",
                "start-of-tilt",
                "params"
            ]
        );
        assert!(matches!(sink.last(), Some(OutputMessage::Beam(_))));
        let ends = sink
            .iter()
            .filter(|m| matches!(m, OutputMessage::EndOfVolume { .. }))
            .count();
        assert_eq!(ends, 1);
        assert_eq!(processor.tracker().volume_number(), 2);
    }

    #[test]
    fn test_identical_scan_mode_no_change_event() {
        let radials = [
            Radial::normal().new_tilt(1).at(1),
            Radial::normal().new_tilt(3).at(2),
        ];
        let (_, sink) = run(&Config::default(), &radials);
        let changes = sink
            .iter()
            .filter(|m| matches!(m, OutputMessage::ScanTypeChange { .. }))
            .count();
        assert_eq!(changes, 1); // only the initial announcement
    }

    #[test]
    fn test_llwas_never_reaches_tracker_or_sink() {
        let (processor, sink) = run(&Config::default(), &[Radial::llwas()]);
        assert!(sink.is_empty());
        assert_eq!(processor.tracker().volume_number(), 0);
        assert_eq!(processor.tracker().tilt_number(), None);
        assert_eq!(processor.stats.llwas_skipped, 1);
    }

    #[test]
    fn test_llwas_outcome() {
        let mut processor = RadialProcessor::new(&Config::default());
        let mut sink = Vec::new();
        let outcome = processor
            .process(&Radial::llwas().bytes(), &mut sink)
            .unwrap();
        assert_eq!(outcome, RadialOutcome::Llwas);
    }

    #[test]
    fn test_eliminated_low_prf_still_starts_volume() {
        let mut config = Config::default();
        config.low_prf.eliminate = true;
        let mut processor = RadialProcessor::new(&config);
        let mut sink = Vec::new();

        let outcome = processor
            .process(&Radial::low_prf().new_volume().new_tilt(1).bytes(), &mut sink)
            .unwrap();
        assert_eq!(outcome, RadialOutcome::LowPrfDropped);
        assert_eq!(kinds(&sink), vec!["start-of-volume"]);
        assert_eq!(processor.stats.low_prf_dropped, 1);

        // The next normal radial opens the first tilt.
        processor
            .process(&Radial::normal().bytes(), &mut sink)
            .unwrap();
        assert_eq!(
            kinds(&sink),
            vec![
                "start-of-volume",
                "scan-type-change",
                "start-of-tilt",
                "params",
                "beam"
            ]
        );
    }

    #[test]
    fn test_low_prf_beam_kept() {
        let (_, sink) = run(&Config::default(), &[Radial::low_prf().new_tilt(1)]);
        let params = sink
            .iter()
            .find_map(|m| match m {
                OutputMessage::Params(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert!(params.low_prf);
        assert_eq!(params.gate_spacing_km, Config::default().site.low_prf_gate_spacing_km);
        match sink.last() {
            Some(OutputMessage::Beam(b)) => {
                assert_eq!(b.num_fields, 5);
                assert_eq!(b.gate(1), Some(&[100, 40, 0, 0, 0][..]));
            }
            other => panic!("expected beam, got {other:?}"),
        }
    }

    #[test]
    fn test_low_prf_adjusted_spacing_params() {
        let mut config = Config::default();
        config.low_prf.adjust_spacing = true;
        let (_, sink) = run(&config, &[Radial::low_prf().new_tilt(1)]);
        let params = sink
            .iter()
            .find_map(|m| match m {
                OutputMessage::Params(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert_eq!(params.num_gates, 2 * GATES as usize);
        assert!((params.gate_spacing_km - config.site.low_prf_gate_spacing_km / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_declared_length_beyond_buffer() {
        let mut bytes = Radial::normal().bytes();
        bytes.truncate(bytes.len() - 1);
        let mut processor = RadialProcessor::new(&Config::default());
        let mut sink = Vec::new();
        assert!(matches!(
            processor.process(&bytes, &mut sink),
            Err(TdwrError::LengthMismatch { .. })
        ));
        assert_eq!(processor.stats.decode_errors, 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_short_gate_region_is_decode_error() {
        let r = Radial::normal();
        let mut bytes = r.bytes();
        let mut header = r.header.clone();
        header.range_samples_per_dwell = GATES + 1;
        header.message_length = bytes.len() as u16;
        bytes[..RADIAL_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        let mut processor = RadialProcessor::new(&Config::default());
        let mut sink = Vec::new();
        assert!(matches!(
            processor.process(&bytes, &mut sink),
            Err(TdwrError::Truncated { .. })
        ));
        // No tilt opened for a radial that produced no beam.
        assert_eq!(processor.tracker().tilt_number(), None);
    }

    #[test]
    fn test_unknown_message_id() {
        let mut r = Radial::normal();
        r.header.message_id = 0x1111;
        let mut processor = RadialProcessor::new(&Config::default());
        let mut sink = Vec::new();
        assert!(matches!(
            processor.process(&r.bytes(), &mut sink),
            Err(TdwrError::UnknownMessageId(0x1111))
        ));
    }

    struct FailingSink;

    impl OutputSink for FailingSink {
        fn send(&mut self, _msg: &OutputMessage) -> Result<()> {
            Err(TdwrError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn test_sink_failure_reported_as_sink_error() {
        let mut processor = RadialProcessor::new(&Config::default());
        let err = processor
            .process(&Radial::normal().bytes(), &mut FailingSink)
            .unwrap_err();
        assert!(matches!(err, TdwrError::Sink(_)));
    }

    #[test]
    fn test_transcoder_built_from_config() {
        let mut config = Config::default();
        config.thresholds.min_dbz = 10.0;
        config.low_prf.eliminate = true;
        let processor = RadialProcessor::new(&config);
        let transcoder = processor.transcoder();
        assert_eq!(transcoder.min_dbz_byte(), 80);
        assert!(transcoder.settings().low_prf.eliminate);
        assert_eq!(transcoder.settings().velocity, config.fields.vel);
    }

    #[test]
    fn test_true_north_azimuth_wraps() {
        assert_eq!(true_north_azimuth(359.0, 2.0), 1.0);
        assert_eq!(true_north_azimuth(1.0, -2.0), 359.0);
        assert_eq!(true_north_azimuth(360.0, 0.0), 0.0);
        assert_eq!(true_north_azimuth(90.0, 0.0), 90.0);
    }

    #[test]
    fn test_unknown_scan_strategy_falls_back() {
        let processor = RadialProcessor::new(&Config::default());
        let header = Radial::normal().strategy(0x7F).header;
        let params = processor.radar_params(&header, false);
        assert_eq!(params.scan_type, ScanType::Unknown);
    }
}
