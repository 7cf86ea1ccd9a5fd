//! Bounded log of recent request outcomes.

use crate::error::TransportErrorKind;
use crate::response::{QueueMode, TransferInfo};
use serde::Serialize;
use std::time::Duration;

/// Default number of entries kept by a [`ProfilingLog`]
pub const DEFAULT_PROFILING_MAX: usize = 20;

/// Summary of one request attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProfilingEntry {
    Success {
        url: String,
        http_code: u16,
        total_time: Duration,
        starttransfer_time: Duration,
        queue: QueueMode,
    },
    Failure {
        url: String,
        error_code: TransportErrorKind,
        error: String,
        queue: QueueMode,
    },
}

impl ProfilingEntry {
    /// Summarize the transfer metadata of a response
    #[must_use]
    pub fn from_info(info: &TransferInfo) -> Self {
        match (info.error_code, &info.error) {
            (Some(error_code), error) => Self::Failure {
                url: info.url.clone(),
                error_code,
                error: error.clone().unwrap_or_default(),
                queue: info.queue,
            },
            (None, _) => Self::Success {
                url: info.url.clone(),
                http_code: info.http_code,
                total_time: info.total_time,
                starttransfer_time: info.starttransfer_time,
                queue: info.queue,
            },
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Success { url, .. } | Self::Failure { url, .. } => url,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Append-only list capped at `max` entries; later entries are dropped.
#[derive(Debug, Clone)]
pub struct ProfilingLog {
    max: usize,
    entries: Vec<ProfilingEntry>,
}

impl Default for ProfilingLog {
    fn default() -> Self {
        Self::new(DEFAULT_PROFILING_MAX)
    }
}

impl ProfilingLog {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            entries: Vec::new(),
        }
    }

    /// Append an entry; returns `false` once the log is full
    pub fn record(&mut self, entry: ProfilingEntry) -> bool {
        if self.entries.len() >= self.max {
            return false;
        }
        self.entries.push(entry);
        true
    }

    #[must_use]
    pub fn entries(&self) -> &[ProfilingEntry] {
        &self.entries
    }

    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
