use crate::renderer::OutputFormat;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct CaptureMetrics {
    pub registry: Registry,
    pub frames_published_total: IntCounterVec,
    pub blank_frames_total: IntCounter,
    pub pose_updates_total: IntCounter,
    pub pose_updates_ignored_total: IntCounter,
    pub capture_duration_seconds: Histogram,
}

impl CaptureMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("sim_camera".into()), None)?;

        macro_rules! reg {
            ($m:expr) => {{
                let m = $m;
                registry.register(Box::new(m.clone()))?;
                m
            }};
        }

        Ok(Self {
            frames_published_total: reg!(IntCounterVec::new(
                Opts::new("frames_published_total", "Frames written to the shared buffers"),
                &["format"]
            )?),
            blank_frames_total: reg!(IntCounter::new(
                "blank_frames_total",
                "Capture ticks that published a cleared frame for lack of a camera pose"
            )?),
            pose_updates_total: reg!(IntCounter::new(
                "pose_updates_total",
                "Pose updates received"
            )?),
            pose_updates_ignored_total: reg!(IntCounter::new(
                "pose_updates_ignored_total",
                "Pose updates for neither the mount frame nor a tracked frame"
            )?),
            capture_duration_seconds: reg!(Histogram::with_opts(
                HistogramOpts::new("capture_duration_seconds", "Wall time of one capture tick")
                    .buckets(prometheus::exponential_buckets(0.0005, 2.0, 12)?)
            )?),
            registry,
        })
    }

    pub fn frame_published(&self, format: OutputFormat) {
        self.frames_published_total
            .with_label_values(&[format.label()])
            .inc();
    }

    pub fn router(&self) -> Router {
        let reg = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let reg = reg.clone();
                async move {
                    let mut buf = Vec::new();
                    match TextEncoder::new().encode(&reg.gather(), &mut buf) {
                        Ok(()) => String::from_utf8_lossy(&buf).into_owned().into_response(),
                        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
                    }
                }
            }),
        )
    }
}
