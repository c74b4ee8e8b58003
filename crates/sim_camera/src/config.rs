use crate::camera::{MountConfig, MountRotation};
use clap::{Parser, ValueEnum};
use glam::Vec3;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Row order of the published pixel buffers.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// First row is the top of the image.
    #[default]
    TopDown,
    /// First row is the bottom of the image.
    BottomUp,
}

/// `sim-camera` - A simulated camera sensor.
///
/// Renders the map at `--map-path` from the pose of frame `--frame-id` and
/// publishes every capture as linear BGRA and as a YUV-like converted BGRA
/// frame in shared memory.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, allow_negative_numbers = true)]
pub struct Config {
    /// Directory holding `map.json` and the files it references.
    #[arg(long, env = "SIM_CAMERA_MAP_PATH")]
    pub map_path: PathBuf,

    /// Capture frequency in Hz.
    #[arg(long, env = "SIM_CAMERA_FREQ", value_parser = clap::value_parser!(u32).range(1..))]
    pub freq: u32,

    /// Image width in pixels.
    #[arg(long, env = "SIM_CAMERA_WIDTH", value_parser = clap::value_parser!(u32).range(1..))]
    pub width: u32,

    /// Image height in pixels.
    #[arg(long, env = "SIM_CAMERA_HEIGHT", value_parser = clap::value_parser!(u32).range(1..))]
    pub height: u32,

    /// Vertical field of view in degrees.
    #[arg(long, env = "SIM_CAMERA_FOVY")]
    pub fovy: f32,

    /// Pose frame the camera is mounted on.
    #[arg(long, env = "SIM_CAMERA_FRAME_ID", default_value_t = 0)]
    pub frame_id: u32,

    /// Mount offset along x (forward), in metres.
    #[arg(long, default_value_t = 0.0)]
    pub x: f32,

    /// Mount offset along y (left), in metres.
    #[arg(long, default_value_t = 0.0)]
    pub y: f32,

    /// Mount offset along z (up), in metres.
    #[arg(long, default_value_t = 0.0)]
    pub z: f32,

    /// Mount yaw in radians. Accepted, not yet applied to the view.
    #[arg(long, default_value_t = 0.0)]
    pub yaw: f32,

    /// Mount pitch in radians. Accepted, not yet applied to the view.
    #[arg(long, default_value_t = 0.0)]
    pub pitch: f32,

    /// Mount roll in radians. Accepted, not yet applied to the view.
    #[arg(long, default_value_t = 0.0)]
    pub roll: f32,

    /// Shared frame name for linear BGRA output.
    #[arg(long, env = "SIM_CAMERA_NAME_ARGB", default_value = "video0.argb")]
    pub name_argb: String,

    /// Shared frame name for converted output.
    #[arg(long, env = "SIM_CAMERA_NAME_I420", default_value = "video0.i420")]
    pub name_i420: String,

    /// Directory the shared frames are mapped from.
    #[arg(long, env = "SIM_CAMERA_SHM_DIR", default_value = "/dev/shm")]
    pub shm_dir: PathBuf,

    /// UDP address pose datagrams are received on.
    #[arg(long, env = "SIM_CAMERA_POSE_LISTEN_ADDR", default_value = "0.0.0.0:6655")]
    pub pose_listen_addr: SocketAddr,

    /// Row order of the published frames.
    #[arg(long, value_enum, env = "SIM_CAMERA_ROW_ORDER", default_value_t = RowOrder::TopDown)]
    pub row_order: RowOrder,

    /// Where the preview image is written in verbose mode.
    #[arg(long, env = "SIM_CAMERA_PREVIEW_PATH", default_value = "preview.png")]
    pub preview_path: PathBuf,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "SIM_CAMERA_METRICS_LISTEN_ADDR")]
    pub metrics_listen_addr: Option<SocketAddr>,

    /// Debug logging and preview output.
    #[arg(long)]
    pub verbose: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.fovy > 0.0 && self.fovy < 180.0) {
            anyhow::bail!("--fovy must be in (0, 180) degrees, got {}", self.fovy);
        }
        Ok(())
    }

    pub fn mount(&self) -> MountConfig {
        MountConfig {
            frame_id: self.frame_id,
            position: Vec3::new(self.x, self.y, self.z),
            rotation: MountRotation {
                roll: self.roll,
                pitch: self.pitch,
                yaw: self.yaw,
            },
        }
    }

    pub fn capture_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.freq as f64)
    }

    /// Pixel bytes per published frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}
