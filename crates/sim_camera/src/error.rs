use std::path::PathBuf;

/// Failures that stop the simulator. Stale poses and unknown frame
/// identifiers are not errors; see `capture::CaptureOutcome` and
/// `scene::PoseOutcome`.
#[derive(thiserror::Error, Debug)]
pub enum SimError {
    /// A mesh source is missing or unparsable. Carries the parser text.
    #[error("Failed to load geometry for model '{model}': {message}")]
    GeometryLoad { model: String, message: String },

    /// A GPU allocation, shader, pipeline or target was rejected.
    #[error("GPU resource error: {0}")]
    GpuResource(String),

    #[error("Failed to load texture {path}: {source}")]
    Texture {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid map description: {0:#}")]
    Map(#[from] anyhow::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl SimError {
    pub fn gpu<T: ToString>(msg: T) -> Self {
        SimError::GpuResource(msg.to_string())
    }
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
