//! tdwr-core: Transport reassembly and radial transcoding for TDWR base data.
//!
//! No sockets, no files. Takes raw UDP transport frames or tape records,
//! turns them into canonical beams plus volume/tilt boundary messages, and
//! hands them to an `OutputSink`. The `tdwr-ingest` binary supplies the
//! transports and the sink.

pub mod config;
pub mod frame;
pub mod gates;
pub mod header;
pub mod processor;
pub mod scan;
pub mod types;

// Re-export commonly used types at crate root
pub use frame::{FrameReassembler, ReassemblyStats};
pub use header::{MessageKind, RadialHeader};
pub use processor::{ProcessorStats, RadialOutcome, RadialProcessor};
pub use scan::ScanTracker;
pub use types::*;
