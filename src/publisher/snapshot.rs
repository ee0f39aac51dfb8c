// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! S3-backed snapshot sink. Unlike the envelope-shaped stream/record sinks
//! this one takes a frame directly, so it does not implement the shared
//! [`super::Publisher`] trait — its call shape is `save(frame, ...)`, not
//! `publish(envelope)` — but mirrors the same flush/metrics contract.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::rect::Rect;
use tokio::sync::Notify;
use tracing::warn;

use super::{FlushOutcome, PublisherMetrics};
use crate::config::SnapshotPublisherConfig;
use crate::event::Detection;
use crate::frame::Frame;

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PublisherMetrics {
        PublisherMetrics {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            retried: 0,
            batches_sent: 0,
        }
    }

    fn flush_outcome(&self) -> FlushOutcome {
        FlushOutcome {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct SnapshotPublisher {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    jpeg_quality: u8,
    font: Option<FontArc>,
    counters: Arc<Counters>,
    in_flight: Arc<AtomicU64>,
    drained: Arc<Notify>,
}

impl SnapshotPublisher {
    pub fn new(config: SnapshotPublisherConfig, aws_config: &aws_config::SdkConfig, label_font_path: Option<&std::path::Path>) -> Self {
        let font = label_font_path.and_then(|path| match std::fs::read(path) {
            Ok(bytes) => FontArc::try_from_vec(bytes).ok(),
            Err(e) => {
                warn!(error = %e, ?path, "could not load snapshot label font, drawing boxes without text");
                None
            }
        });
        Self {
            client: aws_sdk_s3::Client::new(aws_config),
            bucket: config.bucket,
            prefix: config.prefix,
            jpeg_quality: config.jpeg_quality,
            font,
            counters: Arc::new(Counters::default()),
            in_flight: Arc::new(AtomicU64::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Encodes `frame` (annotated with `detections` if non-empty) as a JPEG
    /// and uploads it in the background; returns without waiting for the
    /// upload to land.
    pub async fn save(&self, frame: &Frame, camera_id: &str, ts_ms: i64, detections: &[Detection]) {
        let image = if detections.is_empty() {
            frame.image.clone()
        } else {
            annotate(frame.image.clone(), detections, self.font.as_ref())
        };
        let key = format!("{}{}/{}.jpg", self.prefix, camera_id, ts_ms);
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let quality = self.jpeg_quality;
        let counters = self.counters.clone();
        let in_flight = self.in_flight.clone();
        let drained = self.drained.clone();
        let camera_id = camera_id.to_string();
        let (width, height) = (image.width(), image.height());

        in_flight.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            let result = upload(&client, &bucket, &key, &image, quality, &camera_id, ts_ms, width, height).await;
            match result {
                Ok(()) => {
                    counters.published.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(error = %e, key = %key, "snapshot upload failed");
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_publisher_failure("snapshot");
                }
            }
            if in_flight.fetch_sub(1, Ordering::Relaxed) == 1 {
                drained.notify_waiters();
            }
        });
    }

    pub async fn flush(&self, deadline: Duration) -> FlushOutcome {
        let wait_for_drain = async {
            while self.in_flight.load(Ordering::Relaxed) > 0 {
                self.drained.notified().await;
            }
        };
        let _ = tokio::time::timeout(deadline, wait_for_drain).await;

        let remaining = self.in_flight.load(Ordering::Relaxed);
        if remaining > 0 {
            self.counters.dropped.fetch_add(remaining, Ordering::Relaxed);
            crate::metrics::record_publisher_dropped("snapshot", remaining);
        }
        self.counters.flush_outcome()
    }

    pub fn metrics(&self) -> PublisherMetrics {
        self.counters.snapshot()
    }

    pub fn sink_name(&self) -> &'static str {
        "snapshot"
    }

    /// Mints a time-limited URL for a previously stored key.
    pub async fn presign_url(&self, key: &str, ttl: Duration) -> anyhow::Result<String> {
        let presign_config = aws_sdk_s3::presigning::PresigningConfig::expires_in(ttl)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await?;
        Ok(request.uri().to_string())
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    image: &RgbImage,
    quality: u8,
    camera_id: &str,
    ts_ms: i64,
    width: u32,
    height: u32,
) -> anyhow::Result<()> {
    let mut jpeg_bytes = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg_bytes, quality);
    encoder.write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgb8)?;

    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(aws_sdk_s3::primitives::ByteStream::from(jpeg_bytes))
        .content_type("image/jpeg")
        .metadata("camera_id", camera_id)
        .metadata("timestamp", ts_ms.to_string())
        .metadata("quality", quality.to_string())
        .metadata("width", width.to_string())
        .metadata("height", height.to_string())
        .send()
        .await?;
    Ok(())
}

fn annotate(mut image: RgbImage, detections: &[Detection], font: Option<&FontArc>) -> RgbImage {
    const BOX_COLOR: Rgb<u8> = Rgb([255, 32, 32]);
    for detection in detections {
        let x = detection.bbox.x1.max(0.0) as i32;
        let y = detection.bbox.y1.max(0.0) as i32;
        let w = (detection.bbox.x2 - detection.bbox.x1).max(1.0) as u32;
        let h = (detection.bbox.y2 - detection.bbox.y1).max(1.0) as u32;
        imageproc::drawing::draw_hollow_rect_mut(&mut image, Rect::at(x, y).of_size(w, h), BOX_COLOR);

        if let Some(font) = font {
            let label = format!("{} {:.2}", detection.label, detection.confidence);
            let label_y = (y - 14).max(0);
            imageproc::drawing::draw_text_mut(
                &mut image,
                BOX_COLOR,
                x,
                label_y,
                PxScale::from(12.0),
                font,
                &label,
            );
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    #[test]
    fn annotate_draws_without_panicking_when_no_font_loaded() {
        let image = RgbImage::new(64, 64);
        let detections = vec![Detection::new("knife", 0.9, BBox::new(5.0, 5.0, 20.0, 20.0))];
        let annotated = annotate(image, &detections, None);
        assert_eq!(annotated.width(), 64);
        assert_eq!(annotated.height(), 64);
    }
}
