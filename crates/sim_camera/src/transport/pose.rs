use crate::error::Result;
use crate::metrics::CaptureMetrics;
use crate::scene::{PoseOutcome, SensorState};
use chrono::{DateTime, Utc};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Largest datagram accepted; longer ones are truncated by the socket and
/// then fail to decode.
const MAX_DATAGRAM: usize = 64 * 1024;

/// One pose sample for a tracked frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseUpdate {
    pub frame_id: u32,
    pub position: [f32; 3],
    pub yaw: f32,
    /// Carried for completeness; the view stays level.
    #[serde(default)]
    pub pitch: f32,
    #[serde(default)]
    pub roll: f32,
    #[serde(default = "Utc::now")]
    pub sample_time: DateTime<Utc>,
}

impl PoseUpdate {
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

pub fn decode_datagram(bytes: &[u8]) -> serde_json::Result<PoseUpdate> {
    serde_json::from_slice(bytes)
}

/// Applies one decoded update to the shared state.
pub fn handle_update(state: &SensorState, metrics: &CaptureMetrics, update: &PoseUpdate) -> PoseOutcome {
    metrics.pose_updates_total.inc();
    let outcome = state.apply_pose_update(update.frame_id, update.position(), update.yaw);
    if outcome.ignored() {
        metrics.pose_updates_ignored_total.inc();
        tracing::trace!(frame_id = update.frame_id, "Ignoring pose for unknown frame");
    } else {
        tracing::trace!(
            frame_id = update.frame_id,
            camera = outcome.camera,
            tracked = outcome.tracked,
            sample_time = %update.sample_time,
            "Applied pose update"
        );
    }
    outcome
}

pub struct PoseListener {
    socket: UdpSocket,
}

impl PoseListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!(addr = %socket.local_addr()?, "Pose listener bound");
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receives datagrams until `shutdown` changes or its sender is dropped.
    /// Malformed datagrams are logged and dropped.
    pub async fn run(
        self,
        state: Arc<SensorState>,
        metrics: Arc<CaptureMetrics>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("Pose listener stopping");
                    return Ok(());
                }
                received = self.socket.recv_from(&mut buf) => {
                    let (len, peer) = received?;
                    match decode_datagram(&buf[..len]) {
                        Ok(update) => {
                            handle_update(&state, &metrics, &update);
                        }
                        Err(e) => {
                            tracing::warn!(%peer, len, error = %e, "Dropping malformed pose datagram");
                        }
                    }
                }
            }
        }
    }
}
