mod download;
mod lock;
mod loops;
mod orchestrator;
mod photo;
mod types;
mod unlock;


pub use orchestrator::CameraController;
pub use types::{DeviceStatus, PhotoOutcome};
