use crate::fetch::{FetchOutcome, Fetcher, OutcomeKind};
use crate::history::HistoryLog;
use crate::registry::Target;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Perpetual loop for one target: fetch, record, sleep, repeat.
///
/// The first fetch happens immediately. A failed fetch is recorded like any
/// other outcome and never ends the loop; only `cancel` does.
pub async fn run_target_loop(
    target: Target,
    fetcher: Arc<dyn Fetcher>,
    history: HistoryLog,
    cancel: CancellationToken,
) {
    info!(url = %target.url, interval_secs = target.interval_seconds, "Keep-alive task started");

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = fetcher.fetch(&target.url) => outcome,
        };

        log_outcome(&outcome);
        history.record(outcome);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(target.interval()) => {}
        }
    }

    info!(url = %target.url, "Keep-alive task stopped");
}

fn log_outcome(outcome: &FetchOutcome) {
    match outcome.kind {
        OutcomeKind::Success => {
            info!(url = %outcome.url, status = %outcome.status_text, "Ping succeeded")
        }
        OutcomeKind::Failure => {
            warn!(url = %outcome.url, status = %outcome.status_text, "Ping returned unexpected status")
        }
        OutcomeKind::Error => {
            error!(url = %outcome.url, error = %outcome.status_text, "Ping failed")
        }
    }
}
