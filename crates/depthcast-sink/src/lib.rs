//! Sinks for received video: an incremental file recorder and a live
//! GStreamer display window.

pub mod display;
pub mod record;

pub use display::DisplayPipeline;
pub use record::RecordingSink;
