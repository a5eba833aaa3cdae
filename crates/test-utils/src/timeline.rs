//! Instrumented middlewares for observing dispatch order and concurrency.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde_json::Value;

use middag::config::MiddlewareSpec;
use middag::middleware::{BoxFuture, Middleware, MiddlewareRegistry};
use middag::state::{SharedState, StateDelta};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    Started(String),
    Finished(String),
    Failed(String),
}

#[derive(Debug, Default)]
struct TimelineLog {
    events: Vec<(TimelineEvent, Instant)>,
    current: usize,
    peak: usize,
}

/// Shared recorder. Clones observe the same log.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    log: Arc<Mutex<TimelineLog>>,
}

/// Marks a unit as in flight until dropped, including when its task is
/// aborted.
struct InFlight {
    timeline: Timeline,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut log = self.timeline.log.lock().unwrap();
        log.current -= 1;
    }
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self, label: &str) -> InFlight {
        let mut log = self.log.lock().unwrap();
        log.events
            .push((TimelineEvent::Started(label.to_string()), Instant::now()));
        log.current += 1;
        log.peak = log.peak.max(log.current);
        InFlight {
            timeline: self.clone(),
        }
    }

    fn record(&self, event: TimelineEvent) {
        self.log.lock().unwrap().events.push((event, Instant::now()));
    }

    pub fn events(&self) -> Vec<TimelineEvent> {
        self.log
            .lock()
            .unwrap()
            .events
            .iter()
            .map(|(e, _)| e.clone())
            .collect()
    }

    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TimelineEvent::Started(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TimelineEvent::Finished(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    /// Highest number of recording middlewares running at once.
    pub fn peak(&self) -> usize {
        self.log.lock().unwrap().peak
    }

    pub fn in_flight(&self) -> usize {
        self.log.lock().unwrap().current
    }

    fn time_of(&self, wanted: &TimelineEvent) -> Option<Instant> {
        self.log
            .lock()
            .unwrap()
            .events
            .iter()
            .find(|(e, _)| e == wanted)
            .map(|(_, t)| *t)
    }

    /// Whether `first` finished no later than `second` started.
    pub fn finished_before_started(&self, first: &str, second: &str) -> bool {
        match (
            self.time_of(&TimelineEvent::Finished(first.to_string())),
            self.time_of(&TimelineEvent::Started(second.to_string())),
        ) {
            (Some(end), Some(start)) => end <= start,
            _ => false,
        }
    }

    /// Whether `second` started before `first` finished (they overlapped).
    pub fn overlapped(&self, first: &str, second: &str) -> bool {
        let started = |l: &str| self.time_of(&TimelineEvent::Started(l.to_string()));
        let ended = |l: &str| self.time_of(&TimelineEvent::Finished(l.to_string()));
        match (started(first), ended(first), started(second), ended(second)) {
            (Some(s1), Some(e1), Some(s2), Some(e2)) => s1 < e2 && s2 < e1,
            _ => false,
        }
    }
}

/// Sleeps, then returns a fixed delta (or fails), reporting to a [`Timeline`].
#[derive(Debug, Clone)]
pub struct RecordingMiddleware {
    label: String,
    delay: Duration,
    delta: StateDelta,
    failure: Option<String>,
    timeline: Timeline,
}

impl RecordingMiddleware {
    pub fn new(label: impl Into<String>, timeline: &Timeline) -> Self {
        Self {
            label: label.into(),
            delay: Duration::ZERO,
            delta: StateDelta::new(),
            failure: None,
            timeline: timeline.clone(),
        }
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn sets(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.delta.set(key, value);
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }
}

impl Middleware for RecordingMiddleware {
    fn kind(&self) -> &str {
        "record"
    }

    fn apply(&self, _state: SharedState) -> BoxFuture<'_, anyhow::Result<StateDelta>> {
        Box::pin(async move {
            let _guard = self.timeline.enter(&self.label);
            tokio::time::sleep(self.delay).await;

            if let Some(message) = &self.failure {
                self.timeline.record(TimelineEvent::Failed(self.label.clone()));
                return Err(anyhow!("{message}"));
            }

            self.timeline.record(TimelineEvent::Finished(self.label.clone()));
            Ok(self.delta.clone())
        })
    }
}

/// A recording middleware that always fails after its delay.
#[derive(Debug, Clone)]
pub struct FailingMiddleware(RecordingMiddleware);

impl FailingMiddleware {
    pub fn new(label: impl Into<String>, timeline: &Timeline, ms: u64) -> Self {
        let label = label.into();
        let message = format!("{label} failed on purpose");
        Self(RecordingMiddleware::new(label, timeline).with_delay(ms).failing(message))
    }
}

impl Middleware for FailingMiddleware {
    fn kind(&self) -> &str {
        "failing"
    }

    fn apply(&self, state: SharedState) -> BoxFuture<'_, anyhow::Result<StateDelta>> {
        self.0.apply(state)
    }
}

/// Builtins plus `record` and `failing` kinds bound to `timeline`.
///
/// `record` params: `ms` (delay), `set` (table merged as the delta).
/// `failing` params: `ms`. The label is the entry's name, then key.
pub fn recording_registry(timeline: &Timeline) -> MiddlewareRegistry {
    let mut registry = MiddlewareRegistry::with_builtins();

    let p = timeline.clone();
    registry.register("record", move |spec, _| {
        let mut mw = RecordingMiddleware::new(label_of(spec), &p).with_delay(delay_of(spec));
        if let Some(Value::Object(set)) = spec.params.get("set") {
            for (k, v) in set {
                mw = mw.sets(k.clone(), v.clone());
            }
        }
        Ok(Arc::new(mw) as Arc<dyn Middleware>)
    });

    let p = timeline.clone();
    registry.register("failing", move |spec, _| {
        Ok(Arc::new(FailingMiddleware::new(label_of(spec), &p, delay_of(spec))) as Arc<dyn Middleware>)
    });

    registry
}

fn label_of(spec: &MiddlewareSpec) -> String {
    spec.name
        .clone()
        .or_else(|| spec.key.clone())
        .unwrap_or_else(|| "record".to_string())
}

fn delay_of(spec: &MiddlewareSpec) -> u64 {
    spec.params.get("ms").and_then(Value::as_u64).unwrap_or(0)
}
