//! HTTP handlers.

pub mod detect;
pub mod health;
pub mod status;

pub use detect::submit_detection;
pub use health::{health, ready};
pub use status::get_status;
