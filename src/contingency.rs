//! Contingency windows for provider outages.
//!
//! When a provider cannot be reached, the document receives a locally
//! issued access number and is filed under a contingency window. At most
//! one window is open at a time; further failures extend it. The window
//! closes when a document filed under it certifies, releasing every
//! reference it held for re-submission.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One provider-outage period and the documents issued during it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyWindow {
    pub id: u32,
    pub opened_at: NaiveDateTime,
    pub closed_at: Option<NaiveDateTime>,
    /// Issuing location, when the host distinguishes one.
    pub location: String,
    /// Provider description of the failure that opened the window.
    pub source: String,
    /// References of the documents filed under this window.
    pub references: Vec<String>,
}

impl ContingencyWindow {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// Keeper of the contingency windows, past and present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyTracker {
    windows: Vec<ContingencyWindow>,
    next_id: u32,
}

impl Default for ContingencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ContingencyTracker {
    pub fn new() -> Self {
        Self {
            windows: Vec::new(),
            next_id: 1,
        }
    }

    /// The currently open window, if any.
    pub fn open_window(&self) -> Option<&ContingencyWindow> {
        self.windows.iter().find(|w| w.is_open())
    }

    /// File a document under the open window, opening one if needed.
    /// Returns the window id.
    pub fn open_or_extend(
        &mut self,
        reference: impl Into<String>,
        source: impl Into<String>,
        now: NaiveDateTime,
    ) -> u32 {
        let reference = reference.into();
        if let Some(window) = self.windows.iter_mut().find(|w| w.is_open()) {
            if !window.references.contains(&reference) {
                window.references.push(reference);
            }
            return window.id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.windows.push(ContingencyWindow {
            id,
            opened_at: now,
            closed_at: None,
            location: String::new(),
            source: source.into(),
            references: vec![reference],
        });
        id
    }

    /// Close the open window and release the references it held, so the
    /// host can re-queue them for certification.
    pub fn close(&mut self, now: NaiveDateTime) -> Vec<String> {
        match self.windows.iter_mut().find(|w| w.is_open()) {
            Some(window) => {
                window.closed_at = Some(now);
                std::mem::take(&mut window.references)
            }
            None => Vec::new(),
        }
    }

    pub fn windows(&self) -> &[ContingencyWindow] {
        &self.windows
    }
}
