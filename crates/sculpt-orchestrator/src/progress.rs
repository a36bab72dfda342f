//! Progress reporting to an optional caller callback

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Callback receiving `(message, percent)`
pub type ProgressCallback = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// Forwards milestones to a callback, never letting the percentage go down
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: u8,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("callback", &self.callback.is_some())
            .field("last", &self.last)
            .finish()
    }
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self { callback, last: 0 }
    }

    /// Highest percentage reported so far
    pub fn last(&self) -> u8 {
        self.last
    }

    /// Report a milestone; a lower percentage than the last one is held at the last
    pub fn report(&mut self, message: &str, percent: u8) {
        let percent = percent.min(100);
        if percent < self.last {
            debug!(percent, last = self.last, "progress held at previous milestone");
        }
        self.last = self.last.max(percent);
        info!(progress = self.last, "{}", message);
        if let Some(callback) = &self.callback {
            callback(message, self.last);
        }
    }
}
