//! 摄像头会话：品牌差异、快照、流输出、触发与录像

pub mod brand;
pub mod manager;
pub mod media;
pub mod outputs;
pub mod recording;
pub mod session;
pub mod snapshot;
pub mod streams;
pub mod triggers;

pub use manager::CameraManager;
pub use media::{ConsumerGuard, Subscription};
pub use recording::RecordingHistory;
pub use session::{CameraSession, SessionDeps, SessionTimings};
pub use streams::StreamKind;
