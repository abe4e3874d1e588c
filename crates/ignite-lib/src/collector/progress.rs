//! Collection progress tracking
//!
//! Workers report progress through a [`ProgressCallback`]; the renderer
//! polls a copy-out snapshot on a fixed interval.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Interval between progress renders
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Progress counters of a collection run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressInfo {
    pub namespaces_total: usize,
    pub namespaces_done: usize,
    pub workloads_total: usize,
    pub workloads_done: usize,
}

impl ProgressInfo {
    pub fn namespaces_total(count: usize) -> Self {
        Self {
            namespaces_total: count,
            ..Default::default()
        }
    }

    pub fn namespaces_done(count: usize) -> Self {
        Self {
            namespaces_done: count,
            ..Default::default()
        }
    }

    pub fn workloads_total(count: usize) -> Self {
        Self {
            workloads_total: count,
            ..Default::default()
        }
    }

    pub fn workloads_done(count: usize) -> Self {
        Self {
            workloads_done: count,
            ..Default::default()
        }
    }

    /// Overall completion in percent, by workloads once any are known
    pub fn percent(&self) -> u32 {
        let (done, total) = if self.workloads_total > 0 {
            (self.workloads_done, self.workloads_total)
        } else {
            (self.namespaces_done, self.namespaces_total)
        };
        if total == 0 {
            return 0;
        }
        ((done.min(total) * 100) / total) as u32
    }
}

/// Progress sink: `(delta_or_value, relative)`
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo, bool) + Send + Sync>;

/// Shared progress counters
#[derive(Debug, Default)]
pub struct ProgressState {
    info: Mutex<ProgressInfo>,
}

impl ProgressState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `info` to the counters when `relative`, replace them otherwise
    pub fn update(&self, info: ProgressInfo, relative: bool) {
        let mut current = match self.info.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if relative {
            current.namespaces_total += info.namespaces_total;
            current.namespaces_done += info.namespaces_done;
            current.workloads_total += info.workloads_total;
            current.workloads_done += info.workloads_done;
        } else {
            *current = info;
        }
    }

    pub fn snapshot(&self) -> ProgressInfo {
        match self.info.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Callback bound to this state
    pub fn callback(self: &Arc<Self>) -> ProgressCallback {
        let state = Arc::clone(self);
        Arc::new(move |info, relative| state.update(info, relative))
    }
}

/// Run `runner` while rendering its progress.
///
/// Renders once immediately, then every [`PROGRESS_POLL_INTERVAL`] until the
/// runner completes, then exactly one final frame with `done = true`.
pub async fn run_with_progress<T, R, Fut, F>(runner: R, mut render: F) -> T
where
    T: Send + 'static,
    R: FnOnce(ProgressCallback) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    F: FnMut(ProgressInfo, bool),
{
    let state = Arc::new(ProgressState::new());
    let (done_tx, mut done_rx) = oneshot::channel();

    let work = runner(state.callback());
    let handle = tokio::spawn(async move {
        let result = work.await;
        let _ = done_tx.send(result);
    });

    render(state.snapshot(), false);
    let result = loop {
        tokio::select! {
            result = &mut done_rx => break result,
            _ = tokio::time::sleep(PROGRESS_POLL_INTERVAL) => render(state.snapshot(), false),
        }
    };
    render(state.snapshot(), true);

    match result {
        Ok(value) => value,
        // sender dropped: the runner panicked, surface its panic here
        Err(_) => match handle.await {
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            _ => unreachable!("runner finished without reporting a result"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_relative_and_absolute() {
        let state = ProgressState::new();
        state.update(ProgressInfo::namespaces_total(3), false);
        state.update(ProgressInfo::workloads_total(4), true);
        state.update(ProgressInfo::workloads_total(2), true);
        state.update(ProgressInfo::workloads_done(1), true);

        let snap = state.snapshot();
        assert_eq!(snap.namespaces_total, 3);
        assert_eq!(snap.workloads_total, 6);
        assert_eq!(snap.workloads_done, 1);
        assert_eq!(snap.namespaces_done, 0);

        state.update(ProgressInfo::namespaces_total(5), false);
        assert_eq!(state.snapshot(), ProgressInfo::namespaces_total(5));
    }

    #[test]
    fn test_absolute_update_can_reset() {
        let state = ProgressState::new();
        state.update(ProgressInfo::workloads_done(7), true);
        state.update(ProgressInfo::default(), false);
        assert_eq!(state.snapshot(), ProgressInfo::default());
    }

    #[test]
    fn test_percent() {
        let mut info = ProgressInfo::namespaces_total(4);
        assert_eq!(info.percent(), 0);
        info.namespaces_done = 1;
        assert_eq!(info.percent(), 25);
        info.workloads_total = 10;
        info.workloads_done = 5;
        assert_eq!(info.percent(), 50);
        assert_eq!(ProgressInfo::default().percent(), 0);
    }

    #[tokio::test]
    async fn test_run_with_progress_renders_final_frame() {
        let mut frames = Vec::new();
        let result = run_with_progress(
            |progress| async move {
                progress(ProgressInfo::workloads_total(2), true);
                tokio::time::sleep(Duration::from_millis(250)).await;
                progress(ProgressInfo::workloads_done(2), true);
                42
            },
            |info, done| frames.push((info, done)),
        )
        .await;

        assert_eq!(result, 42);
        // initial frame, at least one poll, final frame
        assert!(frames.len() >= 3);
        let finals: Vec<_> = frames.iter().filter(|(_, done)| *done).collect();
        assert_eq!(finals.len(), 1);
        let (last, done) = frames.last().unwrap();
        assert!(*done);
        assert_eq!(last.workloads_done, 2);
        assert_eq!(last.workloads_total, 2);
    }
}
