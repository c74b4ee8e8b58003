//! Camera sensor simulator.
//!
//! Renders a static 3D map from a pose-tracked viewpoint and publishes each
//! capture twice: once in linear BGRA and once after a fixed RGB→YUV-like
//! colour conversion.
//!
//! Startup is strictly sequential: [`geometry`] builds deduplicated vertex
//! lists, [`renderer::scene_buffer`] packs them into shared GPU buffers, and
//! [`scene::SensorState`] holds the scene graph and camera behind one lock.
//! Afterwards two paths run concurrently: [`transport::pose`] applies pose
//! updates, and [`capture::CapturePipeline`] renders and publishes frames at a
//! fixed rate on the thread that owns the GPU device.

pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod preview;
pub mod renderer;
pub mod scene;
pub mod transport;

pub use self::error::{Result, SimError};
