//! Progress and diagnostic reporting
//!
//! Transforms never log through a global; they receive a [`Reporter`].
use std::sync::{Mutex, MutexGuard};

/// Progress and diagnostics sink handed to every transform
pub trait Reporter: Send + Sync {
    /// A phase started
    fn start(&self, label: &str);
    /// The current phase succeeded, optionally with a closing message
    fn succeed(&self, label: Option<&str>);
    /// The current phase failed
    fn fail(&self);
    fn info(&self, text: &str);
    fn warn(&self, text: &str);
    fn debug(&self, text: &str);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Forwards everything to `tracing`
#[derive(Debug, Default)]
pub struct TracingReporter {
    phase: Mutex<Option<String>>,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_phase(&self) -> Option<String> {
        lock(&self.phase).clone()
    }
}

impl Reporter for TracingReporter {
    fn start(&self, label: &str) {
        *lock(&self.phase) = Some(label.to_string());
        tracing::info!(phase = label, "started");
    }

    fn succeed(&self, label: Option<&str>) {
        let phase = self.current_phase().unwrap_or_default();
        match label {
            Some(label) => tracing::info!(phase = %phase, "{}", label),
            None => tracing::info!(phase = %phase, "succeeded"),
        }
    }

    fn fail(&self) {
        let phase = self.current_phase().unwrap_or_default();
        tracing::error!(phase = %phase, "failed");
    }

    fn info(&self, text: &str) {
        tracing::info!("{}", text);
    }

    fn warn(&self, text: &str) {
        tracing::warn!("{}", text);
    }

    fn debug(&self, text: &str) {
        tracing::debug!("{}", text);
    }
}

/// A recorded reporter event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    Start(String),
    Succeed(Option<String>),
    Fail,
    Info(String),
    Warn(String),
    Debug(String),
}

/// Records events in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        lock(&self.events).clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Warn(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Info(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Labels of phases that were started
    pub fn phases(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReportEvent::Start(label) => Some(label),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ReportEvent) {
        lock(&self.events).push(event);
    }
}

impl Reporter for MemoryReporter {
    fn start(&self, label: &str) {
        self.record(ReportEvent::Start(label.to_string()));
    }

    fn succeed(&self, label: Option<&str>) {
        self.record(ReportEvent::Succeed(label.map(str::to_string)));
    }

    fn fail(&self) {
        self.record(ReportEvent::Fail);
    }

    fn info(&self, text: &str) {
        self.record(ReportEvent::Info(text.to_string()));
    }

    fn warn(&self, text: &str) {
        self.record(ReportEvent::Warn(text.to_string()));
    }

    fn debug(&self, text: &str) {
        self.record(ReportEvent::Debug(text.to_string()));
    }
}
