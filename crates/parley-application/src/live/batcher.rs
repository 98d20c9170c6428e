use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Called with the full dirty set of one batch, in first-marked order.
pub type FlushCallback = Arc<dyn Fn(Vec<String>) + Send + Sync>;

#[derive(Default)]
struct BatchState {
    dirty: Vec<String>,
    seen: HashSet<String>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the pending timer is replaced or cancelled.
    generation: u64,
}

impl BatchState {
    fn take(&mut self) -> Vec<String> {
        self.seen.clear();
        std::mem::take(&mut self.dirty)
    }
}

/// Coalesces change notifications into one flush per interval.
///
/// The first `mark_dirty` after a flush arms a timer; everything marked
/// before it fires is delivered together. `flush_now` cancels the timer and
/// delivers immediately. The callback always runs outside the internal lock.
///
/// Outside a tokio runtime there is no timer, so every mark flushes at once.
pub struct UpdateBatcher {
    interval: Duration,
    state: Arc<Mutex<BatchState>>,
    on_flush: FlushCallback,
}

impl UpdateBatcher {
    pub fn new(interval: Duration, on_flush: FlushCallback) -> Self {
        Self {
            interval,
            state: Arc::new(Mutex::new(BatchState::default())),
            on_flush,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mark_dirty(&self, id: impl Into<String>) {
        let id = id.into();
        let mut state = lock(&self.state);
        if state.seen.insert(id.clone()) {
            state.dirty.push(id);
        }
        if state.timer.is_some() {
            return;
        }

        match Handle::try_current() {
            Ok(runtime) => {
                state.generation += 1;
                let generation = state.generation;
                let shared = self.state.clone();
                let on_flush = self.on_flush.clone();
                let interval = self.interval;
                state.timer = Some(runtime.spawn(async move {
                    tokio::time::sleep(interval).await;
                    let batch = {
                        let mut state = lock(&shared);
                        if state.generation != generation {
                            return;
                        }
                        state.timer = None;
                        state.take()
                    };
                    if !batch.is_empty() {
                        tracing::debug!("[UpdateBatcher] Flushing {} item(s)", batch.len());
                        on_flush(batch);
                    }
                }));
            }
            Err(_) => {
                let batch = state.take();
                drop(state);
                (self.on_flush)(batch);
            }
        }
    }

    /// Cancels the pending timer and delivers the dirty set now.
    pub fn flush_now(&self) {
        let batch = {
            let mut state = lock(&self.state);
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.generation += 1;
            state.take()
        };
        if !batch.is_empty() {
            tracing::debug!("[UpdateBatcher] Forced flush of {} item(s)", batch.len());
            (self.on_flush)(batch);
        }
    }

    /// Ids marked since the last flush.
    pub fn pending(&self) -> Vec<String> {
        lock(&self.state).dirty.clone()
    }
}

impl Drop for UpdateBatcher {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}

fn lock(state: &Mutex<BatchState>) -> MutexGuard<'_, BatchState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (FlushCallback, Arc<Mutex<Vec<Vec<String>>>>) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = batches.clone();
        let callback: FlushCallback = Arc::new(move |batch| sink.lock().unwrap().push(batch));
        (callback, batches)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_marks_within_interval_flush_once() {
        let (callback, batches) = recording();
        let batcher = UpdateBatcher::new(ms(16), callback);

        batcher.mark_dirty("a");
        batcher.mark_dirty("b");
        batcher.mark_dirty("a");
        assert_eq!(batcher.pending(), vec!["a", "b"]);
        assert!(batches.lock().unwrap().is_empty());

        tokio::time::sleep(ms(20)).await;

        assert_eq!(*batches.lock().unwrap(), vec![vec!["a", "b"]]);
        assert!(batcher.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_intervals_flush_separately() {
        let (callback, batches) = recording();
        let batcher = UpdateBatcher::new(ms(16), callback);

        batcher.mark_dirty("a");
        tokio::time::sleep(ms(20)).await;
        batcher.mark_dirty("a");
        batcher.mark_dirty("b");
        tokio::time::sleep(ms(20)).await;

        assert_eq!(
            *batches.lock().unwrap(),
            vec![vec!["a".to_string()], vec!["a".to_string(), "b".to_string()]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_cancels_timer() {
        let (callback, batches) = recording();
        let batcher = UpdateBatcher::new(ms(16), callback);

        batcher.mark_dirty("a");
        batcher.flush_now();
        assert_eq!(batches.lock().unwrap().len(), 1);

        tokio::time::sleep(ms(50)).await;
        assert_eq!(*batches.lock().unwrap(), vec![vec!["a"]]);

        batcher.flush_now();
        assert_eq!(batches.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_after_flush_now_arms_new_timer() {
        let (callback, batches) = recording();
        let batcher = UpdateBatcher::new(ms(16), callback);

        batcher.mark_dirty("a");
        batcher.flush_now();
        batcher.mark_dirty("b");
        tokio::time::sleep(ms(20)).await;

        assert_eq!(
            *batches.lock().unwrap(),
            vec![vec!["a".to_string()], vec!["b".to_string()]]
        );
    }

    #[test]
    fn test_without_runtime_flushes_immediately() {
        let (callback, batches) = recording();
        let batcher = UpdateBatcher::new(ms(16), callback);

        batcher.mark_dirty("a");
        batcher.mark_dirty("b");

        assert_eq!(
            *batches.lock().unwrap(),
            vec![vec!["a".to_string()], vec!["b".to_string()]]
        );
        assert!(batcher.pending().is_empty());
    }
}
