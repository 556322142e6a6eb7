pub mod auth;
pub mod error;
pub mod mjpeg;
pub mod types;

pub use error::*;
pub use types::*;
