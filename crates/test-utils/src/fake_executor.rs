use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use middag::engine::{DispatchedUnit, RuntimeEvent};
use middag::errors::Result;
use middag::exec::{ExecutorBackend, run_unit};
use middag::middleware::BoxFuture;

/// A fake executor that:
/// - records each dispatch batch by unit label
/// - runs queued units one at a time, oldest first, when the runtime asks
///   for the next event
///
/// This makes dispatch waves deterministic regardless of timing.
#[derive(Debug, Default)]
pub struct InlineExecutor {
    queue: VecDeque<DispatchedUnit>,
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl InlineExecutor {
    pub fn new(batches: Arc<Mutex<Vec<Vec<String>>>>) -> Self {
        Self {
            queue: VecDeque::new(),
            batches,
        }
    }
}

impl ExecutorBackend for InlineExecutor {
    fn spawn_ready_units(&mut self, units: Vec<DispatchedUnit>) -> BoxFuture<'_, Result<()>> {
        {
            let mut guard = self.batches.lock().unwrap();
            guard.push(units.iter().map(|u| u.label.clone()).collect());
        }
        self.queue.extend(units);
        Box::pin(async { Ok(()) })
    }

    fn next_event(&mut self) -> BoxFuture<'_, Option<RuntimeEvent>> {
        Box::pin(async move {
            let unit = self.queue.pop_front()?;
            Some(run_unit(unit).await)
        })
    }

    fn in_flight(&self) -> usize {
        self.queue.len()
    }

    fn cancel_all(&mut self) {
        self.queue.clear();
    }
}
