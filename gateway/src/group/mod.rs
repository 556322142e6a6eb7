//! 多摄像头分组：在线集合、滚动播放列表、成员选择

pub mod aggregator;
pub mod online;
pub mod playlist;
pub mod selector;

pub use aggregator::{GroupAggregator, CAMERA_PLAYLIST};
pub use online::{GroupMember, MembershipListener, OnlineRegistry};
pub use playlist::PlaylistState;
