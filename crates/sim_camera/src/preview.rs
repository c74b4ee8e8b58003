//! Low-rate preview writer for verbose mode. The capture thread hands over
//! the latest preview frame; a background task saves it as PNG.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const PREVIEW_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl PreviewImage {
    pub fn from_bgra(width: u32, height: u32, bgra: &[u8]) -> Self {
        let mut rgba = bgra.to_vec();
        for px in rgba.chunks_exact_mut(4) {
            px.swap(0, 2);
            // Clear alpha is 0; keep the preview opaque.
            px[3] = 255;
        }
        Self { width, height, rgba }
    }
}

/// Capture-side handle. Sending never blocks and replaces any frame the
/// writer has not picked up yet.
#[derive(Clone)]
pub struct PreviewSender {
    tx: Arc<watch::Sender<Option<PreviewImage>>>,
}

impl PreviewSender {
    pub fn send(&self, width: u32, height: u32, bgra: &[u8]) {
        self.tx
            .send_replace(Some(PreviewImage::from_bgra(width, height, bgra)));
    }
}

pub fn channel() -> (PreviewSender, watch::Receiver<Option<PreviewImage>>) {
    let (tx, rx) = watch::channel(None);
    (PreviewSender { tx: Arc::new(tx) }, rx)
}

/// Saves the newest preview to `path` at most once per `interval`, until
/// every sender is dropped.
pub async fn run_writer(
    path: PathBuf,
    mut rx: watch::Receiver<Option<PreviewImage>>,
    interval: Duration,
) {
    tracing::info!(path = %path.display(), "Preview writer started");
    while rx.changed().await.is_ok() {
        let Some(image) = rx.borrow_and_update().clone() else {
            continue;
        };

        let target = path.clone();
        let saved = tokio::task::spawn_blocking(move || {
            image::save_buffer(
                &target,
                &image.rgba,
                image.width,
                image.height,
                image::ColorType::Rgba8,
            )
        })
        .await;

        match saved {
            Ok(Ok(())) => tracing::debug!(path = %path.display(), "Preview saved"),
            Ok(Err(e)) => tracing::warn!(path = %path.display(), error = %e, "Failed to save preview"),
            Err(e) => tracing::warn!(error = %e, "Preview task panicked"),
        }

        tokio::time::sleep(interval).await;
    }
    tracing::info!("Preview writer stopped");
}
