use std::path::PathBuf;

use clap::Parser;
use depthcast_core::config::{normalize_server_url, ReceiverConfig};

/// Receive a WebRTC video stream from a depthcast device.
#[derive(Parser, Debug)]
#[command(name = "depthcast-receiver", version)]
pub struct Args {
    /// Address of the streaming device's signaling host
    /// (`http://` is assumed when no scheme is given).
    #[arg(default_value = "127.0.0.1")]
    pub server_url: String,

    /// Write received video to this file (raw H.264 elementary stream).
    #[arg(short = 'r', long = "record-to")]
    pub record_to: Option<PathBuf>,

    /// Open a video window showing the stream.
    #[arg(short = 'v', long = "visualize")]
    pub visualize: bool,
}

impl Args {
    pub fn into_config(self) -> ReceiverConfig {
        ReceiverConfig {
            server_url: normalize_server_url(&self.server_url),
            record_to: self.record_to,
            visualize: self.visualize,
            ..ReceiverConfig::default()
        }
    }
}
