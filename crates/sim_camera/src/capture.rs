//! Capture Pipeline: one render-and-publish cycle per timer tick.
//!
//! Each tick takes a snapshot of the shared pose state, then renders and
//! publishes the linear frame, then renders and publishes the converted
//! frame, then (verbose mode only) renders the preview. Both published
//! frames carry the same capture time. Without a camera pose the targets are
//! only cleared, and the cleared frames are still published.

use crate::camera::Projection;
use crate::config::RowOrder;
use crate::error::{Result, SimError};
use crate::metrics::CaptureMetrics;
use crate::preview::PreviewSender;
use crate::renderer::targets::TargetKind;
use crate::renderer::{OutputFormat, Renderer, ViewProjections};
use crate::scene::SensorState;
use crate::transport::SharedFrame;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The staged instances were drawn into both outputs.
    Drawn { instances: usize },
    /// No camera pose yet; cleared frames were published.
    Blank,
}

/// The two externally visible frame buffers.
#[derive(Clone)]
pub struct CaptureOutputs {
    pub linear: Arc<SharedFrame>,
    pub converted: Arc<SharedFrame>,
}

impl CaptureOutputs {
    pub fn get(&self, format: OutputFormat) -> &SharedFrame {
        match format {
            OutputFormat::Linear => self.linear.as_ref(),
            OutputFormat::ColorConverted => self.converted.as_ref(),
        }
    }
}

pub struct CapturePipeline {
    renderer: Renderer,
    state: Arc<SensorState>,
    outputs: CaptureOutputs,
    output_projection: glam::Mat4,
    preview_projection: glam::Mat4,
    metrics: Arc<CaptureMetrics>,
    preview: Option<PreviewSender>,
}

impl CapturePipeline {
    pub fn new(
        renderer: Renderer,
        state: Arc<SensorState>,
        outputs: CaptureOutputs,
        projection: Projection,
        row_order: RowOrder,
        metrics: Arc<CaptureMetrics>,
        preview: Option<PreviewSender>,
    ) -> Result<Self> {
        let (width, height) = renderer.size();
        let expected = width as usize * height as usize * 4;
        for format in OutputFormat::ALL {
            let frame = outputs.get(format);
            if frame.len() != expected {
                return Err(SimError::gpu(format!(
                    "Shared frame '{}' holds {} bytes, capture produces {}",
                    frame.name(),
                    frame.len(),
                    expected
                )));
            }
        }
        if preview.is_some() && !renderer.has_preview() {
            return Err(SimError::gpu("Preview requested but no preview target exists"));
        }

        // The row-order flip is decided once here; the preview never flips.
        let output_projection = match row_order {
            RowOrder::TopDown => projection.matrix(),
            RowOrder::BottomUp => projection.flipped_y(),
        };

        Ok(Self {
            renderer,
            state,
            outputs,
            output_projection,
            preview_projection: projection.matrix(),
            metrics,
            preview,
        })
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Runs one capture cycle. Any GPU error is returned and should stop the
    /// loop.
    pub fn tick(&mut self) -> Result<CaptureOutcome> {
        let started = Instant::now();

        // The lock is held only while copying.
        let snapshot = self.state.snapshot();
        let timestamp = Utc::now();

        let view_proj = snapshot.view.map(|view| ViewProjections {
            output: self.output_projection * view,
            preview: self.preview_projection * view,
        });
        self.renderer.prepare(&snapshot.draw_list, view_proj);
        let outcome = match view_proj {
            Some(_) => CaptureOutcome::Drawn {
                instances: self.renderer.staged_draws(),
            },
            None => CaptureOutcome::Blank,
        };

        for format in OutputFormat::ALL {
            let pixels = self.renderer.render(TargetKind::Output(format))?;
            self.outputs.get(format).publish(timestamp, pixels);
            self.metrics.frame_published(format);
        }

        if let Some(preview) = &self.preview {
            let (width, height) = self.renderer.size();
            let pixels = self.renderer.render(TargetKind::Preview)?;
            preview.send(width, height, pixels);
        }

        if let Some(err) = self.renderer.gfx.take_device_error() {
            return Err(SimError::GpuResource(err));
        }

        let elapsed = started.elapsed();
        self.metrics.capture_duration_seconds.observe(elapsed.as_secs_f64());
        if outcome == CaptureOutcome::Blank {
            self.metrics.blank_frames_total.inc();
        }
        tracing::debug!(?outcome, elapsed_ms = elapsed.as_secs_f64() * 1e3, "Capture tick");

        Ok(outcome)
    }

    /// Ticks every `period` until `shutdown` changes. A tick that overruns
    /// delays the schedule; ticks are never skipped or queued. Returns the
    /// number of completed ticks.
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) -> Result<u64> {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(period_ms = period.as_secs_f64() * 1e3, "Capture loop started");
        let mut ticks = 0u64;
        let mut last_outcome = None;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    let outcome = self.tick()?;
                    ticks += 1;

                    let blank = outcome == CaptureOutcome::Blank;
                    if last_outcome != Some(blank) {
                        if blank {
                            tracing::info!("No camera pose yet; publishing cleared frames");
                        } else {
                            tracing::info!("Camera pose received; rendering scene");
                        }
                        last_outcome = Some(blank);
                    }
                }
            }
        }

        tracing::info!(ticks, "Capture loop stopped");
        Ok(ticks)
    }
}
