//! Thread-safe [`ProgressUi`] the foreground thread polls for redraws

use super::{ProgressSnapshot, ProgressUi};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
struct ProgressState {
    percentage: u8,
    status: String,
    pending_logs: Vec<String>,
    result: Option<ProgressSnapshot>,
}

/// Written by the monitor worker, read and cancelled by the UI
#[derive(Debug, Default)]
pub struct SharedProgress {
    state: Mutex<ProgressState>,
    cancelled: AtomicBool,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn percentage(&self) -> u8 {
        self.state.lock().map(|s| s.percentage).unwrap_or(0)
    }

    pub fn status(&self) -> String {
        self.state.lock().map(|s| s.status.clone()).unwrap_or_default()
    }

    /// Log lines appended since the last call
    pub fn take_logs(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|mut s| std::mem::take(&mut s.pending_logs))
            .unwrap_or_default()
    }

    pub fn result(&self) -> Option<ProgressSnapshot> {
        self.state.lock().ok().and_then(|s| s.result.clone())
    }
}

impl ProgressUi for SharedProgress {
    fn report_progress(&self, percentage: u8) {
        if let Ok(mut s) = self.state.lock() {
            s.percentage = percentage.min(100);
        }
    }

    fn append_log(&self, text: &str) {
        if let Ok(mut s) = self.state.lock() {
            s.pending_logs.push(text.to_string());
        }
    }

    fn set_status(&self, text: &str) {
        if let Ok(mut s) = self.state.lock() {
            s.status = text.to_string();
        }
    }

    fn set_result(&self, snapshot: &ProgressSnapshot) {
        if let Ok(mut s) = self.state.lock() {
            s.result = Some(snapshot.clone());
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
