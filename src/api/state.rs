use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::history::HistoryLog;
use crate::registry::SiteRegistry;
use crate::scheduler::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub registry: SiteRegistry,
    pub history: HistoryLog,
    pub scheduler: Scheduler,
    pub uptime: Uptime,
}

/// Process start marker for the status endpoint.
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    started: Instant,
    started_at: DateTime<Utc>,
}

impl Uptime {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn formatted(&self) -> String {
        format_uptime(self.elapsed())
    }
}

/// `H:MM:SS`, with a leading `N day(s), ` past the first day.
pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let clock = format!("{hours}:{minutes:02}:{seconds:02}");
    match days {
        0 => clock,
        1 => format!("1 day, {clock}"),
        n => format!("{n} days, {clock}"),
    }
}
