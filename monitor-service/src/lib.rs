pub mod backoff;
pub mod controller;
pub mod service;

pub use backoff::{Backoff, BackoffConfig};
pub use controller::{
    ActiveSession, ControllerStatus, MonitorController, MonitorSettings, SessionSummary,
};
pub use service::{validate_subreddit, MonitorService};
