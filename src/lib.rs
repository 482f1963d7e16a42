pub mod capture;
pub mod client;
pub mod config;
pub mod polling;
pub mod session;

pub use client::HttpDetectionClient;
pub use config::Settings;
pub use polling::DetectionController;
pub use session::{SessionStatus, ViewFrame};
