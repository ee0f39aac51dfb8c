// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Production [`super::FrameSource`]: a GStreamer `rtspsrc` pipeline feeding
//! an appsink, decoded into [`Frame`]s, wrapped in the reconnect/refresh
//! state machine. The pipeline shape mirrors the MPEG-TS recording
//! pipeline this project used to run, narrowed to emit decoded RGB frames
//! instead of raw muxed buffers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use image::RgbImage;
use tokio::sync::mpsc;
use tracing::{error, warn};

use super::{backoff, ConnectionState, FrameSource, PlaybackSession, VideoService};
use crate::error::{Error, Result};
use crate::frame::Frame;

pub struct GstFrameSource {
    camera_id: String,
    stream_name: String,
    video_service: Arc<dyn VideoService>,
    session_lifetime: Duration,
    refresh_margin: Duration,
    max_consecutive_errors: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    state: ConnectionState,
    session: Option<PlaybackSession>,
    consecutive_errors: u32,
    reconnect_attempt: u32,
    has_connected_once: bool,
    pipeline: Option<RunningPipeline>,
}

impl GstFrameSource {
    pub fn new(
        camera_id: impl Into<String>,
        stream_name: impl Into<String>,
        video_service: Arc<dyn VideoService>,
        session_lifetime: Duration,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            stream_name: stream_name.into(),
            video_service,
            session_lifetime,
            refresh_margin,
            max_consecutive_errors: 10,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            state: ConnectionState::Disconnected,
            session: None,
            consecutive_errors: 0,
            reconnect_attempt: 0,
            has_connected_once: false,
            pipeline: None,
        }
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max;
        self
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        crate::metrics::set_connection_state(&self.camera_id, state);
    }

    async fn connect(&mut self) -> Result<()> {
        let data_endpoint = self.video_service.resolve_data_endpoint(&self.stream_name).await?;
        let session = self.video_service.fetch_session(&data_endpoint, self.session_lifetime).await?;
        let pipeline = RunningPipeline::start(&session.url)?;
        self.session = Some(session);
        self.pipeline = Some(pipeline);
        crate::metrics::record_url_refresh(&self.camera_id);
        if self.has_connected_once {
            crate::metrics::record_reconnect(&self.camera_id);
        }
        self.has_connected_once = true;
        Ok(())
    }

    async fn backoff_and_retry(&mut self, reason: String) -> Result<()> {
        self.consecutive_errors += 1;
        if self.consecutive_errors >= self.max_consecutive_errors {
            self.set_state(ConnectionState::Failed);
            return Err(Error::FrameSourceTerminal { camera_id: self.camera_id.clone(), reason });
        }
        self.set_state(ConnectionState::Reconnecting);
        let delay = backoff::next_delay(self.base_backoff, self.reconnect_attempt, self.max_backoff);
        self.reconnect_attempt += 1;
        warn!(camera_id = %self.camera_id, attempt = self.reconnect_attempt, ?delay, %reason, "frame source retrying after failure");
        tokio::time::sleep(delay).await;
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }
}

#[async_trait]
impl FrameSource for GstFrameSource {
    fn open(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            match self.state {
                ConnectionState::Disconnected => {
                    self.set_state(ConnectionState::Connecting);
                }
                ConnectionState::Connecting => match self.connect().await {
                    Ok(()) => {
                        self.set_state(ConnectionState::Streaming);
                        self.consecutive_errors = 0;
                        self.reconnect_attempt = 0;
                    }
                    Err(e) => {
                        self.backoff_and_retry(e.to_string()).await?;
                    }
                },
                ConnectionState::Reconnecting => {
                    self.set_state(ConnectionState::Connecting);
                }
                ConnectionState::Failed => {
                    return Err(Error::FrameSourceTerminal {
                        camera_id: self.camera_id.clone(),
                        reason: "frame source previously failed terminally".to_string(),
                    });
                }
                ConnectionState::Streaming => {
                    if let Some(session) = &self.session {
                        if session.needs_refresh(Utc::now(), self.refresh_margin) {
                            if let Some(mut pipeline) = self.pipeline.take() {
                                pipeline.stop();
                            }
                            self.set_state(ConnectionState::Connecting);
                            continue;
                        }
                    }
                    let pipeline = self
                        .pipeline
                        .as_mut()
                        .expect("pipeline must exist while Streaming");
                    match pipeline.rx.recv().await {
                        Some(frame) => {
                            self.consecutive_errors = 0;
                            crate::metrics::record_frame_source_frame(&self.camera_id);
                            crate::metrics::set_last_frame_timestamp(&self.camera_id, frame.ts_ms);
                            return Ok(frame);
                        }
                        None => {
                            crate::metrics::record_read_error(&self.camera_id);
                            if let Some(mut pipeline) = self.pipeline.take() {
                                pipeline.stop();
                            }
                            self.backoff_and_retry("appsink channel closed".to_string()).await?;
                        }
                    }
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.stop();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

struct RunningPipeline {
    pipeline: gst::Pipeline,
    rx: mpsc::Receiver<Frame>,
}

impl RunningPipeline {
    fn start(url: &str) -> Result<Self> {
        gst::init().map_err(|e| Error::Other(anyhow::anyhow!("gst::init failed: {e}")))?;

        let (tx, rx) = mpsc::channel::<Frame>(8);

        let pipeline_str = format!(
            "rtspsrc location={url} latency=200 protocols=tcp ! decodebin ! videoconvert ! \
             video/x-raw,format=RGB ! appsink name=sink emit-signals=true max-buffers=4 drop=true sync=false",
        );

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| Error::Other(anyhow::anyhow!("gst parse_launch failed: {e}")))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| Error::Other(anyhow::anyhow!("launched element is not a Pipeline")))?;

        let appsink: gst_app::AppSink = pipeline
            .by_name("sink")
            .ok_or_else(|| Error::Other(anyhow::anyhow!("appsink not found in pipeline")))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| Error::Other(anyhow::anyhow!("named element is not an AppSink")))?;

        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Error)?;
                    let buf = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let structure = caps.structure(0).ok_or(gst::FlowError::Error)?;
                    let width: i32 = structure.get("width").map_err(|_| gst::FlowError::Error)?;
                    let height: i32 = structure.get("height").map_err(|_| gst::FlowError::Error)?;
                    let map = buf.map_readable().map_err(|_| gst::FlowError::Error)?;

                    let Some(image) = RgbImage::from_raw(width as u32, height as u32, map.as_slice().to_vec())
                    else {
                        return Err(gst::FlowError::Error);
                    };
                    let ts_ms = buf
                        .pts()
                        .map(|t| t.mseconds() as i64)
                        .unwrap_or_else(|| Utc::now().timestamp_millis());
                    let frame = Frame::new(image, ts_ms);

                    if tx.try_send(frame).is_err() {
                        // Backpressure from a slow Worker drops the newest frame
                        // rather than queueing — never accumulate debt.
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| Error::Other(anyhow::anyhow!("set_state Playing failed: {e}")))?;

        Ok(Self { pipeline, rx })
    }

    fn stop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            error!(error = %e, "failed to stop GStreamer pipeline cleanly");
        }
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
