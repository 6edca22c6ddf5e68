//! Recording sink: received access units appended to a raw H.264 elementary
//! stream (`ffplay`/`mpv` open it directly; remux to MP4 with ffmpeg).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use depthcast_core::{EncodedFrame, SinkError};
use tracing::{debug, info};

/// Owns the output file handle for the duration of the session.
///
/// Constructed in one of two modes: `to_file` writes every frame, `discard`
/// accepts and drops them (the default when no output path was requested).
/// `start` is idempotent; `stop` flushes and releases the handle exactly
/// once and tolerates a session in which no frame ever arrived.
pub struct RecordingSink {
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    frames_written: u64,
    started: bool,
    stopped: bool,
}

impl RecordingSink {
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            writer: None,
            frames_written: 0,
            started: false,
            stopped: false,
        }
    }

    pub fn discard() -> Self {
        Self {
            path: None,
            writer: None,
            frames_written: 0,
            started: false,
            stopped: false,
        }
    }

    /// Opens the output file. Called on first track arrival; later calls are
    /// no-ops.
    pub fn start(&mut self) -> Result<(), SinkError> {
        if self.started {
            return Ok(());
        }
        if let Some(path) = &self.path {
            let file = File::create(path)?;
            self.writer = Some(BufWriter::new(file));
            info!("Recording to {}", path.display());
        } else {
            info!("No output path configured; received video will be discarded");
        }
        self.started = true;
        Ok(())
    }

    pub fn write_frame(&mut self, frame: &EncodedFrame) -> Result<(), SinkError> {
        if self.stopped {
            debug!("Dropping frame written after recorder stop");
            return Ok(());
        }
        if let Some(writer) = &mut self.writer {
            writer.write_all(&frame.data)?;
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Flushes and closes the output. Safe to call more than once.
    pub fn stop(&mut self) -> Result<(), SinkError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        info!("Recording sink stopped after {} frame(s)", self.frames_written);
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(payload: &[u8]) -> EncodedFrame {
        EncodedFrame {
            data: Bytes::copy_from_slice(payload),
            timestamp_us: 0,
            is_keyframe: false,
        }
    }

    #[test]
    fn writes_every_frame_and_finalizes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h264");

        let mut sink = RecordingSink::to_file(&path);
        sink.start().unwrap();
        for _ in 0..10 {
            sink.write_frame(&frame(&[0, 0, 0, 1, 0x41, 0x9a])).unwrap();
        }
        sink.stop().unwrap();

        assert_eq!(sink.frames_written(), 10);
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), 60);
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h264");

        let mut sink = RecordingSink::to_file(&path);
        sink.start().unwrap();
        sink.write_frame(&frame(&[1, 2, 3])).unwrap();
        sink.stop().unwrap();
        sink.stop().unwrap();

        assert_eq!(std::fs::read(&path).unwrap().len(), 3);
    }

    #[test]
    fn stop_without_frames_leaves_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h264");

        let mut sink = RecordingSink::to_file(&path);
        sink.start().unwrap();
        sink.stop().unwrap();

        assert!(path.exists());
        assert_eq!(sink.frames_written(), 0);
    }

    #[test]
    fn discard_sink_accepts_frames_without_touching_disk() {
        let mut sink = RecordingSink::discard();
        sink.start().unwrap();
        sink.write_frame(&frame(&[1, 2, 3])).unwrap();
        sink.stop().unwrap();

        assert_eq!(sink.frames_written(), 1);
    }

    #[test]
    fn frames_after_stop_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h264");

        let mut sink = RecordingSink::to_file(&path);
        sink.start().unwrap();
        sink.stop().unwrap();
        sink.write_frame(&frame(&[1, 2, 3])).unwrap();

        assert_eq!(sink.frames_written(), 0);
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn stop_before_start_is_a_no_op() {
        let mut sink = RecordingSink::discard();
        sink.stop().unwrap();
    }
}
