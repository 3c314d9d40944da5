use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use super::sql_client::{SqlRow, SqlTransport};

/// Visible outcome of the most recent accepted request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryState {
    pub data: Vec<SqlRow>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Runs one query at a time against the indexer and only ever commits the
/// outcome of the newest request.
///
/// Every dispatch bumps a generation counter. When a request completes, its
/// captured generation is compared to the live one and the outcome is dropped
/// if they differ. The in-flight HTTP call itself is not aborted.
pub struct GuardedFetcher<T: SqlTransport> {
    transport: Arc<T>,
    generation: AtomicU64,
    last_query: Mutex<Option<String>>,
    state: watch::Sender<QueryState>,
}

impl<T: SqlTransport> GuardedFetcher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            transport,
            generation: AtomicU64::new(0),
            last_query: Mutex::new(None),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> QueryState {
        self.state.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Discards whatever request is still in flight.
    pub fn invalidate(&self) -> u64 {
        let mut next = 0;
        // Bumped under the state lock so no commit can interleave with it.
        self.state.send_if_modified(|_| {
            next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            false
        });
        next
    }

    // Internal helper that applies `update` only if `generation` is still current,
    // checking and writing under the same lock.
    fn commit<F>(&self, generation: u64, update: F) -> bool
    where
        F: FnOnce(&mut QueryState),
    {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            update(state);
            true
        })
    }

    /// Runs `query`, returning whether its outcome was committed.
    ///
    /// `None` or a blank query resets the state synchronously without touching
    /// the network. Errors are written into the state, never returned.
    pub async fn execute(&self, query: Option<&str>) -> bool {
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        *self.last_query.lock().unwrap_or_else(PoisonError::into_inner) =
            query.map(str::to_string);

        let generation = self.invalidate();

        let Some(query) = query else {
            return self.commit(generation, |state| *state = QueryState::default());
        };

        if !self.commit(generation, |state| state.loading = true) {
            return false;
        }

        let outcome = self.transport.query(query).await;

        let next = match outcome {
            Ok(rows) => QueryState {
                data: rows,
                loading: false,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Indexer query failed: {}", e);
                QueryState {
                    data: Vec::new(),
                    loading: false,
                    error: Some(e.to_string()),
                }
            }
        };
        let committed = self.commit(generation, move |state| *state = next);
        if !committed {
            tracing::debug!(
                "Dropping stale indexer response (generation {} superseded)",
                generation
            );
        }
        committed
    }

    /// Re-runs the last query only when `query` differs from it.
    pub async fn set_query(&self, query: Option<&str>) -> bool {
        let next = query.map(str::trim).filter(|q| !q.is_empty());
        let unchanged = {
            let last = self.last_query.lock().unwrap_or_else(PoisonError::into_inner);
            last.as_deref() == next
        };
        if unchanged {
            return false;
        }
        self.execute(next).await
    }

    /// Re-runs the last query, e.g. after an explicit retry.
    pub async fn refresh(&self) -> bool {
        let last = self
            .last_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.execute(last.as_deref()).await
    }
}

impl<T: SqlTransport> Drop for GuardedFetcher<T> {
    fn drop(&mut self) {
        self.invalidate();
    }
}
