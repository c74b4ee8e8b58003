//! GPU capture tests. Each test returns early when no adapter is available.

use glam::{Vec3, Vec4};
use scene_map::SceneDescription;
use sim_camera::camera::{CameraController, MountConfig, Projection};
use sim_camera::capture::{CaptureOutcome, CaptureOutputs, CapturePipeline};
use sim_camera::config::RowOrder;
use sim_camera::metrics::CaptureMetrics;
use sim_camera::renderer::context::GfxContext;
use sim_camera::renderer::targets::RGB_TO_YUV;
use sim_camera::renderer::Renderer;
use sim_camera::scene::{SceneGraph, SensorState};
use sim_camera::transport::{Frame, SharedFrame};
use sim_camera::{geometry, SimError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const W: u32 = 32;
const H: u32 = 32;
const FOVY: f32 = 60.0;

// A red unit box three metres ahead of a camera at the origin facing +x.
const RED_BOX: &str = r#"{ "block": [
    { "name": "box", "dimension": [1, 1, 1], "color": [1, 0, 0],
      "instances": [[3, 0, 0, 0]] } ] }"#;

fn gfx() -> Option<GfxContext> {
    match pollster::block_on(GfxContext::new()) {
        Ok(gfx) => Some(gfx),
        Err(e) => {
            eprintln!("skipping GPU test: {}", e);
            None
        }
    }
}

struct Rig {
    pipeline: CapturePipeline,
    state: Arc<SensorState>,
    outputs: CaptureOutputs,
}

impl Rig {
    fn new(map: &str, base: &Path, row_order: RowOrder) -> Option<Self> {
        let gfx = gfx()?;
        let scene = SceneDescription::from_json_str(map, base).unwrap();
        let models = geometry::build_models(&scene).unwrap();
        let graph = SceneGraph::from_description(&scene);
        let capacity = graph.capacity();
        let state = Arc::new(SensorState::new(
            graph,
            CameraController::new(MountConfig::default()),
        ));

        let renderer = Renderer::new(gfx, &models, W, H, capacity, false).unwrap();
        let len = (W * H * 4) as usize;
        let outputs = CaptureOutputs {
            linear: Arc::new(SharedFrame::in_memory("argb", len)),
            converted: Arc::new(SharedFrame::in_memory("i420", len)),
        };
        let pipeline = CapturePipeline::new(
            renderer,
            state.clone(),
            outputs.clone(),
            Projection::new(FOVY, W, H),
            row_order,
            Arc::new(CaptureMetrics::new().unwrap()),
            None,
        )
        .unwrap();

        Some(Self {
            pipeline,
            state,
            outputs,
        })
    }

    fn pose_camera_at_origin(&self) {
        let outcome = self.state.apply_pose_update(0, Vec3::ZERO, 0.0);
        assert!(outcome.camera);
    }
}

fn px(frame: &Frame, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * W + x) * 4) as usize;
    frame.pixels[i..i + 4].try_into().unwrap()
}

fn assert_close(actual: [u8; 4], expected: [u8; 4], tol: u8) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(a.abs_diff(e) <= tol, "pixel {:?} != {:?}", actual, expected);
    }
}

fn is_red(p: [u8; 4]) -> bool {
    p[2] > 200 && p[1] < 20 && p[0] < 20
}

/// Expected converted BGRA for a linear BGRA pixel.
fn convert_bgra(p: [u8; 4]) -> [u8; 4] {
    let rgb = Vec4::new(p[2] as f32, p[1] as f32, p[0] as f32, 255.0) / 255.0;
    let out = RGB_TO_YUV * rgb;
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    [q(out.z), q(out.y), q(out.x), q(out.w)]
}

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sim_camera-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn publishes_cleared_frames_before_first_pose() {
    let Some(mut rig) = Rig::new(RED_BOX, Path::new("."), RowOrder::TopDown) else {
        return;
    };

    assert_eq!(rig.pipeline.tick().unwrap(), CaptureOutcome::Blank);

    let a = rig.outputs.linear.latest();
    let b = rig.outputs.converted.latest();
    assert_eq!(a.sequence, 2);
    assert!(a.timestamp.is_some());
    assert_eq!(a.timestamp, b.timestamp);

    // Clear colour (0.2, 0.2, 0.2, 0.0) in BGRA, in both buffers.
    for frame in [&a, &b] {
        assert!(frame.pixels.chunks_exact(4).all(|p| p[0].abs_diff(51) <= 1
            && p[1].abs_diff(51) <= 1
            && p[2].abs_diff(51) <= 1
            && p[3] == 0));
    }
}

#[test]
fn renders_box_in_both_formats() {
    let Some(mut rig) = Rig::new(RED_BOX, Path::new("."), RowOrder::TopDown) else {
        return;
    };
    rig.pose_camera_at_origin();

    assert_eq!(
        rig.pipeline.tick().unwrap(),
        CaptureOutcome::Drawn { instances: 1 }
    );

    let a = rig.outputs.linear.latest();
    let b = rig.outputs.converted.latest();
    assert_eq!(a.pixels.len(), b.pixels.len());
    assert_eq!(a.timestamp, b.timestamp);

    let center_a = px(&a, W / 2, H / 2);
    assert_close(center_a, [0, 0, 255, 255], 1);
    // Y = 0.3195, Cr = 0.939, Cb = 0.352 packed into R, G and B.
    assert_close(px(&b, W / 2, H / 2), [90, 239, 81, 255], 2);

    // The corner misses the box and keeps the clear colour.
    assert_close(px(&a, 0, 0), [51, 51, 51, 0], 1);
    assert_ne!(a.pixels, b.pixels);
}

#[test]
fn converted_frame_is_matrix_of_linear_frame() {
    let map = r#"{ "block": [
        { "name": "red", "dimension": [1, 1, 1], "color": [1, 0, 0],
          "instances": [[3, 0.6, 0, 0]] },
        { "name": "teal", "dimension": [1, 1, 1], "color": [0, 0.5, 0.75],
          "instances": [[3, -0.6, 0, 0]] } ] }"#;
    let Some(mut rig) = Rig::new(map, Path::new("."), RowOrder::TopDown) else {
        return;
    };
    rig.pose_camera_at_origin();
    rig.pipeline.tick().unwrap();

    let a = rig.outputs.linear.latest();
    let b = rig.outputs.converted.latest();
    let mut drawn = 0;
    for (pa, pb) in a.pixels.chunks_exact(4).zip(b.pixels.chunks_exact(4)) {
        let pa: [u8; 4] = pa.try_into().unwrap();
        let pb: [u8; 4] = pb.try_into().unwrap();
        if pa[3] == 255 {
            drawn += 1;
            assert_close(pb, convert_bgra(pa), 2);
        } else {
            assert_eq!(pa, pb);
        }
    }
    assert!(drawn > 0);
}

#[test]
fn bottom_up_row_order_mirrors_rows() {
    // Box raised above the optical axis, so it lands in the upper half.
    let map = r#"{ "block": [
        { "name": "box", "dimension": [1, 1, 1], "color": [1, 0, 0],
          "instances": [[3, 0, 0.8, 0]] } ] }"#;

    let red_rows = |order: RowOrder| -> Option<(usize, usize)> {
        let mut rig = Rig::new(map, Path::new("."), order)?;
        rig.pose_camera_at_origin();
        rig.pipeline.tick().unwrap();
        let a = rig.outputs.linear.latest();
        let mut top = 0;
        let mut bottom = 0;
        for y in 0..H {
            for x in 0..W {
                if is_red(px(&a, x, y)) {
                    if y < H / 2 {
                        top += 1;
                    } else {
                        bottom += 1;
                    }
                }
            }
        }
        Some((top, bottom))
    };

    let Some((top, bottom)) = red_rows(RowOrder::TopDown) else {
        return;
    };
    assert!(top > 0 && bottom == 0, "top-down: {} top, {} bottom", top, bottom);

    let (top, bottom) = red_rows(RowOrder::BottomUp).unwrap();
    assert!(bottom > 0 && top == 0, "bottom-up: {} top, {} bottom", top, bottom);
}

#[test]
fn tracked_instance_appears_after_its_pose() {
    let map = r#"{ "block": [
        { "name": "car", "dimension": [1, 1, 1], "color": [1, 0, 0],
          "frames": [7] } ] }"#;
    let Some(mut rig) = Rig::new(map, Path::new("."), RowOrder::TopDown) else {
        return;
    };
    rig.pose_camera_at_origin();

    assert_eq!(
        rig.pipeline.tick().unwrap(),
        CaptureOutcome::Drawn { instances: 0 }
    );
    assert!(!is_red(px(&rig.outputs.linear.latest(), W / 2, H / 2)));

    assert!(rig.state.apply_pose_update(7, Vec3::new(3.0, 0.0, 0.0), 0.0).tracked);
    assert!(rig.state.apply_pose_update(99, Vec3::ZERO, 0.0).ignored());

    assert_eq!(
        rig.pipeline.tick().unwrap(),
        CaptureOutcome::Drawn { instances: 1 }
    );
    assert!(is_red(px(&rig.outputs.linear.latest(), W / 2, H / 2)));
}

#[test]
fn textured_box_samples_its_texture() {
    let dir = temp_dir();
    image::save_buffer(
        dir.join("blue.png"),
        &[0, 0, 255, 255],
        1,
        1,
        image::ColorType::Rgba8,
    )
    .unwrap();

    let map = r#"{ "block": [
        { "name": "box", "dimension": [1, 1, 1], "textureFile": "blue.png",
          "textureSize": [0.5, 0.5], "instances": [[3, 0, 0, 0]] } ] }"#;
    let rig = Rig::new(map, &dir, RowOrder::TopDown);
    if let Some(mut rig) = rig {
        rig.pose_camera_at_origin();
        rig.pipeline.tick().unwrap();
        assert_close(px(&rig.outputs.linear.latest(), W / 2, H / 2), [255, 0, 0, 255], 1);
    }

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn missing_texture_fails_startup() {
    let Some(gfx) = gfx() else {
        return;
    };
    let map = r#"{ "block": [
        { "name": "box", "dimension": [1, 1, 1], "textureFile": "missing.png" } ] }"#;
    let scene = SceneDescription::from_json_str(map, Path::new("/nonexistent")).unwrap();
    let models = geometry::build_models(&scene).unwrap();

    match Renderer::new(gfx, &models, W, H, 1, false) {
        Err(SimError::Texture { path, .. }) => {
            assert_eq!(path, Path::new("/nonexistent/missing.png"));
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("renderer accepted a missing texture"),
    }
}

#[test]
fn oversized_target_fails_startup() {
    let Some(gfx) = gfx() else {
        return;
    };
    let scene = SceneDescription::from_json_str(RED_BOX, Path::new(".")).unwrap();
    let models = geometry::build_models(&scene).unwrap();

    match Renderer::new(gfx, &models, 100_000, 4, 1, false) {
        Err(SimError::GpuResource(message)) => {
            assert!(message.contains("not complete"), "{}", message);
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("renderer accepted a 100000 pixel wide target"),
    }
}

#[test]
fn device_error_stops_the_tick() {
    let Some(mut rig) = Rig::new(RED_BOX, Path::new("."), RowOrder::TopDown) else {
        return;
    };
    assert!(rig.pipeline.tick().is_ok());

    // Invalid without MAPPABLE_PRIMARY_BUFFERS, raised outside any error scope.
    let _buffer = rig.pipeline.renderer().gfx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("invalid"),
        size: 16,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::MAP_WRITE,
        mapped_at_creation: false,
    });

    match rig.pipeline.tick() {
        Err(SimError::GpuResource(_)) => {}
        other => panic!("tick survived a device error: {:?}", other.map(|_| ())),
    }
    // The latch is cleared once reported.
    assert!(rig.pipeline.tick().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_ticks_until_shutdown() {
    let Some(rig) = Rig::new(RED_BOX, Path::new("."), RowOrder::TopDown) else {
        return;
    };
    let Rig {
        pipeline, outputs, ..
    } = rig;

    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(pipeline.run(Duration::from_millis(10), rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();

    let ticks = task.await.unwrap().unwrap();
    assert!(ticks >= 1);
    assert_eq!(outputs.linear.latest().sequence, 2 * ticks);
    assert_eq!(outputs.converted.latest().sequence, 2 * ticks);
}

// Axis-aligned unit cube centred on the origin, one quad per face.
const CUBE_OBJ: &str = "\
v -0.5 -0.5 -0.5
v  0.5 -0.5 -0.5
v  0.5  0.5 -0.5
v -0.5  0.5 -0.5
v -0.5 -0.5  0.5
v  0.5 -0.5  0.5
v  0.5  0.5  0.5
v -0.5  0.5  0.5
f 1 4 3 2
f 5 6 7 8
f 1 2 6 5
f 2 3 7 6
f 3 4 8 7
f 4 1 5 8
";

#[test]
fn obj_mesh_renders_beside_a_block() {
    let dir = temp_dir();
    std::fs::write(dir.join("cube.obj"), CUBE_OBJ).unwrap();

    // The block's vertices follow the cube's in the shared vertex buffer.
    let map = r#"{
        "model": [
            { "name": "cube", "file": "cube.obj", "color": [0, 1, 0],
              "instances": [[3, 0, 0, 0]] } ],
        "block": [
            { "name": "box", "dimension": [1, 1, 1], "color": [1, 0, 0],
              "instances": [[3, 1, 0, 0]] } ] }"#;
    let rig = Rig::new(map, &dir, RowOrder::TopDown);
    if let Some(mut rig) = rig {
        rig.pose_camera_at_origin();
        assert_eq!(
            rig.pipeline.tick().unwrap(),
            CaptureOutcome::Drawn { instances: 2 }
        );

        let a = rig.outputs.linear.latest();
        assert_close(px(&a, W / 2, H / 2), [0, 255, 0, 255], 1);
        let red = a
            .pixels
            .chunks_exact(4)
            .filter(|p| is_red([p[0], p[1], p[2], p[3]]))
            .count();
        assert!(red > 0);
    }

    std::fs::remove_dir_all(&dir).unwrap();
}
