pub mod controller;
pub mod debounce;
mod loop_worker;
pub mod tracker;

pub use controller::ObserverController;
pub use debounce::Debouncer;
pub use tracker::{ObserverSnapshot, ScanReport, Tracker};

use std::time::Duration;

use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverConfig {
    /// Trailing debounce window shared by scroll, mutation and startup triggers.
    pub debounce: Duration,
    /// Delay before the startup scan that catches already-rendered posts.
    pub startup_delay: Duration,
}

impl From<&Settings> for ObserverConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            debounce: settings.debounce(),
            startup_delay: settings.startup_delay(),
        }
    }
}
