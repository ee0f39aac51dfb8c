// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Camera '{camera_id}' frame source failed terminally: {reason}")]
    FrameSourceTerminal { camera_id: String, reason: String },

    #[error("Camera '{camera_id}' upstream unavailable: {reason}")]
    UpstreamUnavailable { camera_id: String, reason: String },

    #[error("Camera '{camera_id}' not found")]
    CameraNotFound { camera_id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
