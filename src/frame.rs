//! The decoded-image + timestamp pair a [`crate::frame_source::FrameSource`]
//! produces and a [`crate::worker::CameraWorker`] consumes exactly once.

use image::RgbImage;

/// One decoded video frame. Dimensions are fixed for the lifetime of one
/// playback session; not shared across consumers.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Monotonic wall-clock timestamp, milliseconds since epoch.
    pub ts_ms: i64,
}

impl Frame {
    pub fn new(image: RgbImage, ts_ms: i64) -> Self {
        Self { image, ts_ms }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}
