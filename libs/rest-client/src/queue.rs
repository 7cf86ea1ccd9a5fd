//! Pending batch requests and their concurrent execution.

use crate::error::{TransportError, TransportErrorKind};
use crate::response::{QueueMode, Response};
use crate::transport::{PreparedRequest, Transport};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Completion callback; invoked exactly once with the request's response
pub type Callback = Box<dyn FnOnce(Response) + Send + 'static>;

pub(crate) struct QueueEntry {
    pub(crate) url: String,
    pub(crate) request: PreparedRequest,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) callback: Option<Callback>,
}

impl fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEntry")
            .field("url", &self.url)
            .field("request", &self.request)
            .field("has_callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub(crate) struct BatchQueue {
    entries: Vec<QueueEntry>,
}

impl BatchQueue {
    pub(crate) fn push(&mut self, entry: QueueEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Remove every pending entry, leaving the queue empty
    pub(crate) fn take(&mut self) -> Vec<QueueEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// Run all entries concurrently and pair each response with its callback,
/// in enqueue order. Batched requests are not retried.
pub(crate) async fn execute_batch(entries: Vec<QueueEntry>) -> Vec<(Response, Option<Callback>)> {
    let mut pending = Vec::with_capacity(entries.len());
    let mut tasks = Vec::with_capacity(entries.len());

    for entry in entries {
        let QueueEntry {
            url,
            request,
            transport,
            callback,
        } = entry;
        tasks.push(tokio::spawn(async move {
            let start = Instant::now();
            let result = transport.execute(request).await;
            (result, start.elapsed())
        }));
        pending.push((url, callback));
    }

    let results = join_all(tasks).await;

    pending
        .into_iter()
        .zip(results)
        .map(|((url, callback), joined)| {
            let response = match joined {
                Ok((Ok(raw), _)) => Response::from_raw(raw, QueueMode::Batch),
                Ok((Err(err), elapsed)) => {
                    Response::from_error(url, &err, elapsed, QueueMode::Batch)
                }
                Err(join_err) => {
                    tracing::warn!(url = %url, error = %join_err, "batch request task failed");
                    let err = TransportError::new(
                        TransportErrorKind::Other,
                        format!("request task failed: {join_err}"),
                    );
                    Response::from_error(url, &err, Duration::ZERO, QueueMode::Batch)
                }
            };
            (response, callback)
        })
        .collect()
}
