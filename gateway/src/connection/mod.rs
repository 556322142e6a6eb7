pub mod auth;
pub mod client;
pub mod demux;
pub mod registry;

pub use auth::AuthState;
pub use client::{CameraClient, ResponseSink};
pub use demux::{DemuxEvent, Demuxer, Record, ResponseHead};
pub use registry::{ConnectionEntry, ConnectionHandle, ConnectionRegistry};
