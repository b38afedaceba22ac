//! Volume / tilt / scan-mode state machine.
//!
//! Pure logic: consumes decoded radial headers and returns boundary messages
//! for the caller to forward, in the order their conditions were detected.

use log::info;

use crate::header::RadialHeader;
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    InVolume,
}

/// Tracks the current volume, tilt and scan mode across radials.
///
/// Never reset; lives as long as the ingest loop.
#[derive(Debug, Clone)]
pub struct ScanTracker {
    phase: ScanPhase,
    volume_number: u32,
    /// Tilt currently open, if any.
    tilt: Option<u8>,
    /// Scan mode last announced downstream.
    scan_mode: Option<ScanMode>,

    // Counters
    pub volumes_started: u64,
    pub tilts_started: u64,
}

impl Default for ScanTracker {
    fn default() -> Self {
        ScanTracker::new()
    }
}

impl ScanTracker {
    pub fn new() -> Self {
        ScanTracker {
            phase: ScanPhase::Idle,
            volume_number: 0,
            tilt: None,
            scan_mode: None,
            volumes_started: 0,
            tilts_started: 0,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn volume_number(&self) -> u32 {
        self.volume_number
    }

    pub fn tilt_number(&self) -> Option<u8> {
        self.tilt
    }

    pub fn scan_mode(&self) -> Option<ScanMode> {
        self.scan_mode
    }

    /// Volume boundary check. Runs for every non-LLWAS radial, including
    /// low-PRF radials that are dropped afterwards.
    pub fn update_volume(&mut self, header: &RadialHeader) -> Vec<OutputMessage> {
        let mut events = Vec::new();
        if !header.is_new_volume() {
            return events;
        }

        if self.phase == ScanPhase::InVolume {
            events.push(OutputMessage::EndOfVolume {
                volume: self.volume_number,
                timestamp: header.timestamp,
            });
        }
        self.volume_number += 1;
        self.phase = ScanPhase::InVolume;
        self.volumes_started += 1;
        info!(
            "Volume {} start (scan strategy {})",
            self.volume_number,
            header.scan_strategy()
        );
        events.push(OutputMessage::StartOfVolume {
            volume: self.volume_number,
            timestamp: header.timestamp,
        });
        events
    }

    /// Tilt boundary check for a radial that will produce a beam.
    ///
    /// The first such radial always opens a tilt, flagged or not.
    pub fn update_tilt(&mut self, header: &RadialHeader) -> Vec<OutputMessage> {
        let mut events = Vec::new();
        if !header.is_new_tilt() && self.tilt.is_some() {
            return events;
        }

        if let Some(tilt) = self.tilt {
            events.push(OutputMessage::EndOfTilt {
                tilt,
                timestamp: header.timestamp,
            });
        }

        let mode = header.scan_mode();
        if self.scan_mode != Some(mode) {
            events.push(OutputMessage::ScanTypeChange { scan_mode: mode });
            self.scan_mode = Some(mode);
        }

        let tilt = header.tilt_number();
        self.tilt = Some(tilt);
        self.tilts_started += 1;
        info!(
            "Tilt {tilt} start: {mode} at {:.2} deg, volume {}",
            header.elevation, self.volume_number
        );
        events.push(OutputMessage::StartOfTilt {
            tilt,
            timestamp: header.timestamp,
        });
        events
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
