use anyhow::Context;
use clap::Parser;
use scene_map::SceneDescription;
use sim_camera::camera::{CameraController, Projection};
use sim_camera::capture::{CaptureOutputs, CapturePipeline};
use sim_camera::config::Config;
use sim_camera::metrics::CaptureMetrics;
use sim_camera::renderer::context::GfxContext;
use sim_camera::renderer::Renderer;
use sim_camera::scene::{SceneGraph, SensorState};
use sim_camera::transport::{PoseListener, SharedFrame};
use sim_camera::{geometry, preview};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Initialization ---
    let config = Config::parse();
    let default_filter = if config.verbose { "debug" } else { "info" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .json()
        .init();
    config.validate()?;
    tracing::info!(config = ?config, "Camera simulator starting with configuration");

    // --- 2. Scene ---
    let scene = SceneDescription::load_dir(&config.map_path)?;
    let models = geometry::build_models(&scene)?;
    let graph = SceneGraph::from_description(&scene);
    let draw_capacity = graph.capacity();
    let state = Arc::new(SensorState::new(graph, CameraController::new(config.mount())));

    // --- 3. GPU ---
    let gfx = GfxContext::new().await?;
    let renderer = Renderer::new(
        gfx,
        &models,
        config.width,
        config.height,
        draw_capacity,
        config.verbose,
    )?;

    // --- 4. Outputs ---
    let frame_len = config.frame_len();
    let outputs = CaptureOutputs {
        linear: Arc::new(SharedFrame::mapped(&config.shm_dir, &config.name_argb, frame_len)?),
        converted: Arc::new(SharedFrame::mapped(&config.shm_dir, &config.name_i420, frame_len)?),
    };

    let metrics = Arc::new(CaptureMetrics::new()?);
    if let Some(addr) = config.metrics_listen_addr {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind metrics server on {}", addr))?;
        let router = metrics.router();
        tokio::spawn(async move {
            tracing::info!(%addr, "Metrics server started");
            if let Err(e) = axum::serve(listener, router.into_make_service()).await {
                tracing::error!(error = %e, "Metrics server exited with an error");
            }
        });
    }

    let preview = if config.verbose {
        let (tx, rx) = preview::channel();
        tokio::spawn(preview::run_writer(
            config.preview_path.clone(),
            rx,
            preview::PREVIEW_INTERVAL,
        ));
        Some(tx)
    } else {
        None
    };

    let pipeline = CapturePipeline::new(
        renderer,
        state.clone(),
        outputs,
        Projection::new(config.fovy, config.width, config.height),
        config.row_order,
        metrics.clone(),
        preview,
    )?;

    // --- 5. Arm the pose and capture paths ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = PoseListener::bind(config.pose_listen_addr).await?;
    let mut pose_task = tokio::spawn(listener.run(state, metrics, shutdown_rx.clone()));

    let period = config.capture_period();
    let (done_tx, mut done_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let result = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .context("Failed to build capture runtime")
                .and_then(|rt| Ok(rt.block_on(pipeline.run(period, shutdown_rx))?));
            let _ = done_tx.send(result);
        })
        .context("Failed to spawn capture thread")?;

    // --- 6. Run until interrupted or either path stops ---
    let mut pose_done = false;
    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received.");
            let _ = shutdown_tx.send(true);
            // The current tick completes before the loop observes shutdown.
            (&mut done_rx).await.context("Capture thread exited without a result")?
        }
        done = &mut done_rx => {
            let _ = shutdown_tx.send(true);
            done.context("Capture thread exited without a result")?
        }
        joined = &mut pose_task => {
            pose_done = true;
            log_pose_exit(joined);
            let _ = shutdown_tx.send(true);
            let _ = (&mut done_rx).await.context("Capture thread exited without a result")??;
            Err(anyhow::anyhow!("Pose listener stopped before shutdown"))
        }
    };

    if !pose_done {
        log_pose_exit(pose_task.await);
    }

    let ticks = result?;
    tracing::info!(ticks, "Camera simulator shutting down.");
    Ok(())
}

fn log_pose_exit(joined: Result<sim_camera::Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Err(e)) => tracing::error!(error = %e, "Pose listener exited with an error"),
        Err(e) => tracing::error!(error = %e, "Pose listener task failed"),
        Ok(Ok(())) => tracing::debug!("Pose listener stopped"),
    }
}
