//! Live display: H.264 access units decoded and presented in a video window.
//!
//! # Pipeline
//! ```text
//! appsrc → h264parse → [decoder] → videoconvert → autovideosink
//! ```
//!
//! **Must be driven from a dedicated blocking thread** (e.g. via
//! `tokio::task::spawn_blocking`): GStreamer owns the window and its
//! message loop on that thread.

use depthcast_core::{EncodedFrame, SinkError};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use tracing::{info, warn};

/// Decoder candidates in priority order; hardware first, libavcodec last.
static DECODER_PRIORITY: &[(&str, &str)] = &[
    ("vaapih264dec", "AMD/Intel VA-API H.264"),
    ("vaapidecodebin", "VA-API auto-select"),
    ("nvh264dec", "NVIDIA NVDEC H.264"),
    ("avdec_h264", "Software libavcodec (last resort)"),
];

// MARK: - Probe

/// Returns the name of the highest-priority available H.264 decoder.
pub fn probe_best_decoder() -> Option<&'static str> {
    if gst::init().is_err() {
        return None;
    }
    for (element, label) in DECODER_PRIORITY {
        if gst::ElementFactory::find(element).is_some() {
            info!("Selected display decoder: {} ({})", element, label);
            return Some(element);
        }
        warn!("Decoder '{}' not found, trying next", element);
    }
    None
}

// MARK: - DisplayPipeline

/// Owns the on-screen surface for the duration of display.
pub struct DisplayPipeline {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    frames_pushed: u64,
}

impl DisplayPipeline {
    /// Probe for a decoder, build the pipeline and open the video window.
    pub fn open() -> Result<Self, SinkError> {
        gst::init().map_err(|e| SinkError::DisplayInit(e.to_string()))?;
        let element = probe_best_decoder()
            .ok_or_else(|| SinkError::DisplayInit("no H.264 decoder available".into()))?;

        let pipeline_str = format!(
            "appsrc name=src format=time is-live=true \
             ! h264parse \
             ! {element} \
             ! videoconvert \
             ! autovideosink sync=false"
        );

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| SinkError::DisplayInit(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| SinkError::DisplayInit("Not a pipeline".into()))?;

        let appsrc = pipeline
            .by_name("src")
            .and_then(|element| element.downcast::<AppSrc>().ok())
            .ok_or_else(|| SinkError::DisplayInit("No appsrc".into()))?;

        let src_caps = gst::Caps::builder("video/x-h264")
            .field("alignment", "au")
            .field("stream-format", "byte-stream")
            .build();
        appsrc.set_caps(Some(&src_caps));

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| SinkError::DisplayInit("Failed to start pipeline".into()))?;

        info!("Display window open ({element})");
        Ok(Self { pipeline, appsrc, frames_pushed: 0 })
    }

    /// False once the window was closed or the pipeline died; the caller
    /// must stop pushing and tear the display down.
    pub fn is_alive(&self) -> bool {
        let Some(bus) = self.pipeline.bus() else {
            return false;
        };
        while let Some(msg) = bus.pop() {
            match msg.view() {
                gst::MessageView::Eos(_) => {
                    info!("Display pipeline reached end of stream");
                    return false;
                }
                gst::MessageView::Error(err) => {
                    warn!("Display pipeline error: {}", err.error());
                    return false;
                }
                _ => {}
            }
        }
        true
    }

    /// Pushes one access unit into the decoder.
    pub fn push_frame(&mut self, frame: &EncodedFrame) -> Result<(), SinkError> {
        let mut gst_buf = gst::Buffer::with_size(frame.data.len())
            .map_err(|_| SinkError::DisplayPush("alloc failed".into()))?;
        {
            let buf = gst_buf.get_mut().unwrap();
            buf.set_pts(gst::ClockTime::from_useconds(frame.timestamp_us));
            let mut map = buf
                .map_writable()
                .map_err(|_| SinkError::DisplayPush("map failed".into()))?;
            map.copy_from_slice(&frame.data);
        }

        self.appsrc
            .push_buffer(gst_buf)
            .map_err(|_| SinkError::DisplayPush("appsrc push failed".into()))?;

        self.frames_pushed += 1;
        if self.frames_pushed == 1 {
            info!("First frame on screen");
        }
        Ok(())
    }

    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }

    /// Tears the window down. Also runs on drop.
    pub fn close(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

impl Drop for DisplayPipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
