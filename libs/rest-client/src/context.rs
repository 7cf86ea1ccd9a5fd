use crate::config::{ServiceConfig, ServicesConfig, Settings};
use crate::profiling::{DEFAULT_PROFILING_MAX, ProfilingEntry, ProfilingLog};
use crate::queue::{self, BatchQueue, QueueEntry};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

struct ContextInner {
    services: Mutex<ServicesConfig>,
    profiling: Mutex<ProfilingLog>,
    queue: Mutex<BatchQueue>,
}

/// Shared state for every client built from it: the service registry, the
/// profiling log and the batch queue.
///
/// Cloning is cheap and every clone sees the same state. Locks are never
/// held across an `.await`.
#[derive(Clone)]
pub struct ClientContext {
    inner: Arc<ContextInner>,
}

impl Default for ClientContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("services", &self.inner.services.lock().len())
            .field("profiling", &self.inner.profiling.lock().len())
            .field("queued", &self.inner.queue.lock().len())
            .finish()
    }
}

impl ClientContext {
    #[must_use]
    pub fn new() -> Self {
        Self::with_profiling_max(DEFAULT_PROFILING_MAX)
    }

    #[must_use]
    pub fn with_profiling_max(max: usize) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                services: Mutex::new(ServicesConfig::default()),
                profiling: Mutex::new(ProfilingLog::new(max)),
                queue: Mutex::new(BatchQueue::default()),
            }),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let context = Self::with_profiling_max(settings.profiling_max);
        context.load_config(settings.services.clone());
        context
    }

    /// Replace the service registry
    pub fn load_config(&self, services: ServicesConfig) {
        *self.inner.services.lock() = services;
    }

    #[must_use]
    pub fn service_config(&self, name: &str) -> Option<ServiceConfig> {
        self.inner.services.lock().get(name).cloned()
    }

    /// Append to the profiling log; returns `false` when the log is full
    pub fn log_profiling(&self, entry: ProfilingEntry) -> bool {
        self.inner.profiling.lock().record(entry)
    }

    /// Snapshot of the profiling log
    #[must_use]
    pub fn profiling(&self) -> Vec<ProfilingEntry> {
        self.inner.profiling.lock().entries().to_vec()
    }

    /// Drop every pending batch request
    pub fn init_queue(&self) {
        self.inner.queue.lock().clear();
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    pub(crate) fn enqueue(&self, entry: QueueEntry) {
        self.inner.queue.lock().push(entry);
    }

    /// Execute every queued request concurrently.
    ///
    /// Returns `false` if nothing was queued. Otherwise waits for all
    /// requests, then, in enqueue order, records each outcome in the
    /// profiling log and hands the response to its callback. Requests
    /// queued by a callback wait for the next call.
    pub async fn process_queue(&self) -> bool {
        let entries = self.inner.queue.lock().take();
        if entries.is_empty() {
            return false;
        }

        let count = entries.len();
        tracing::debug!(count, "processing request queue");

        for (response, callback) in queue::execute_batch(entries).await {
            self.log_profiling(ProfilingEntry::from_info(response.meta()));
            if let Some(callback) = callback {
                callback(response);
            }
        }

        tracing::debug!(count, "request queue processed");
        true
    }
}
