//! Pose input and frame output. Poses arrive as JSON datagrams over UDP;
//! frames are published into shared buffers that other processes can map.

pub mod frame;
pub mod pose;

pub use self::frame::{Frame, FrameWriter, SharedFrame};
pub use self::pose::{decode_datagram, PoseListener, PoseUpdate};
