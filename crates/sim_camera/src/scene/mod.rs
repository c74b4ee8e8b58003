//! Pose-driven scene state shared between the pose path and the capture
//! path. One lock covers both the tracked instances and the camera view.

pub mod graph;

pub use self::graph::{InstanceKind, SceneGraph, SceneInstance};

use crate::camera::CameraController;
use glam::{Mat4, Vec3};
use parking_lot::Mutex;

/// What a pose update touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseOutcome {
    pub camera: bool,
    pub tracked: bool,
}

impl PoseOutcome {
    /// The identifier is neither the mount frame nor a tracked frame.
    pub fn ignored(&self) -> bool {
        !self.camera && !self.tracked
    }
}

/// Copy of the state one capture tick needs; safe to use without the lock.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// `None` until a pose for the mount frame has arrived.
    pub view: Option<Mat4>,
    pub draw_list: Vec<SceneInstance>,
}

struct PoseState {
    graph: SceneGraph,
    camera: CameraController,
}

pub struct SensorState {
    inner: Mutex<PoseState>,
    capacity: usize,
}

impl SensorState {
    pub fn new(graph: SceneGraph, camera: CameraController) -> Self {
        Self {
            capacity: graph.capacity(),
            inner: Mutex::new(PoseState { graph, camera }),
        }
    }

    /// Applies one pose event to the camera and the tracked instances.
    pub fn apply_pose_update(&self, frame_id: u32, position: Vec3, yaw: f32) -> PoseOutcome {
        let mut state = self.inner.lock();
        let camera = state.camera.apply_pose_update(frame_id, position, yaw);
        let tracked = state.graph.apply_pose_update(frame_id, position, yaw);
        PoseOutcome { camera, tracked }
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        let state = self.inner.lock();
        FrameSnapshot {
            view: state.camera.view(),
            draw_list: state.graph.current_draw_list(),
        }
    }

    /// Longest draw list a snapshot can return.
    pub fn draw_capacity(&self) -> usize {
        self.capacity
    }
}
