use glam::{Mat4, Vec3};
use scene_map::SceneDescription;
use std::collections::BTreeMap;
use std::f32::consts::{FRAC_PI_2, PI};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    /// Placed at startup from the map; never mutated.
    Static,
    /// Driven by the pose stream for `frame_id`.
    Tracked { frame_id: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneInstance {
    pub model: String,
    pub position: Vec3,
    /// Yaw as received: from the map for static instances, from the pose
    /// stream for tracked ones.
    pub yaw: f32,
    pub visible: bool,
    pub kind: InstanceKind,
}

impl SceneInstance {
    pub fn new_static(model: impl Into<String>, position: Vec3, yaw: f32) -> Self {
        Self {
            model: model.into(),
            position,
            yaw,
            visible: true,
            kind: InstanceKind::Static,
        }
    }

    pub fn new_tracked(model: impl Into<String>, frame_id: u32) -> Self {
        Self {
            model: model.into(),
            position: Vec3::ZERO,
            yaw: 0.0,
            visible: false,
            kind: InstanceKind::Tracked { frame_id },
        }
    }

    /// Heading fed into the model transform. Tracked instances share the
    /// camera's heading convention (`π/2 − yaw`).
    pub fn rotation(&self) -> f32 {
        match self.kind {
            InstanceKind::Static => self.yaw,
            InstanceKind::Tracked { .. } => FRAC_PI_2 - self.yaw,
        }
    }

    /// Translation by the instance position, then rotation by
    /// `π − rotation` about the vertical (Z) axis.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position) * Mat4::from_rotation_z(PI - self.rotation())
    }
}

/// Static instances plus the fixed allow-list of tracked instances.
#[derive(Debug, Clone, Default)]
pub struct SceneGraph {
    statics: Vec<SceneInstance>,
    tracked: BTreeMap<u32, SceneInstance>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_description(scene: &SceneDescription) -> Self {
        let mut graph = Self::new();
        for (model, placement) in scene.static_instances() {
            graph.add_static(SceneInstance::new_static(
                model,
                Vec3::from(placement.position),
                placement.yaw,
            ));
        }
        for (frame_id, model) in scene.tracked_frames() {
            graph.add_tracked(frame_id, model);
        }
        graph
    }

    pub fn add_static(&mut self, instance: SceneInstance) {
        self.statics.push(instance);
    }

    /// Registers `frame_id`; a later registration of the same id replaces
    /// the earlier one.
    pub fn add_tracked(&mut self, frame_id: u32, model: impl Into<String>) {
        self.tracked
            .insert(frame_id, SceneInstance::new_tracked(model, frame_id));
    }

    /// Moves the tracked instance for `frame_id` and makes it visible.
    /// Returns `false`, changing nothing, for identifiers outside the
    /// tracked set.
    pub fn apply_pose_update(&mut self, frame_id: u32, position: Vec3, yaw: f32) -> bool {
        match self.tracked.get_mut(&frame_id) {
            Some(instance) => {
                instance.position = position;
                instance.yaw = yaw;
                instance.visible = true;
                true
            }
            None => false,
        }
    }

    /// Static instances first, then visible tracked instances by frame id.
    pub fn current_draw_list(&self) -> Vec<SceneInstance> {
        self.statics
            .iter()
            .chain(self.tracked.values().filter(|i| i.visible))
            .cloned()
            .collect()
    }

    pub fn tracked(&self, frame_id: u32) -> Option<&SceneInstance> {
        self.tracked.get(&frame_id)
    }

    /// Upper bound on the draw list length.
    pub fn capacity(&self) -> usize {
        self.statics.len() + self.tracked.len()
    }
}
