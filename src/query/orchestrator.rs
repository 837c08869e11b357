use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, error, warn};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use super::{CancellationToken, QueryError, QueryKey};
use crate::retry::{FailureInfo, RetryPolicy};
use crate::schema::{self, Schema};

pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// How long a validated result is served from cache after it arrived.
    pub stale_time: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            stale_time: DEFAULT_STALE_TIME,
            retry: RetryPolicy::default(),
        }
    }
}

type Outcome<T> = Result<Arc<T>, QueryError>;
type SharedOutcome<T> = Shared<BoxFuture<'static, Outcome<T>>>;

struct CacheEntry<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

struct InFlight<T> {
    id: u64,
    outcome: SharedOutcome<T>,
    waiters: usize,
    abort: AbortHandle,
}

struct State<T> {
    entries: HashMap<QueryKey, CacheEntry<T>>,
    in_flight: HashMap<QueryKey, InFlight<T>>,
    next_id: u64,
}

fn lock<T>(state: &Mutex<State<T>>) -> MutexGuard<'_, State<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cache and executor for validated query results.
///
/// At most one fetch runs per key; callers arriving while it runs wait on
/// the same outcome. Successful results are served from cache until
/// `stale_time` has passed since they arrived, after which the next call
/// fetches again. Nothing refreshes in the background; expired entries are
/// evicted whenever a new result is stored.
pub struct QueryOrchestrator<T> {
    state: Arc<Mutex<State<T>>>,
    options: QueryOptions,
}

impl<T> QueryOrchestrator<T>
where
    T: Schema + Send + Sync + 'static,
{
    pub fn new(options: QueryOptions) -> Self {
        QueryOrchestrator {
            state: Arc::new(Mutex::new(State {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                next_id: 0,
            })),
            options,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Returns the fresh cached result for `key`, or runs `fetch` (retrying
    /// per the policy) and validates the body it yields.
    ///
    /// `fetch` is called once per attempt. Cancelling `token` makes this call
    /// return [`QueryError::Cancelled`]; the fetch keeps running while other
    /// callers still wait on it.
    pub async fn execute<F, Fut>(
        &self,
        key: QueryKey,
        token: &CancellationToken,
        fetch: F,
    ) -> Result<Arc<T>, QueryError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, FailureInfo>> + Send + 'static,
    {
        if token.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let (id, shared) = {
            let mut state = lock(&self.state);
            if let Some(value) = self.fresh(&mut state, &key) {
                return Ok(value);
            }
            match state.in_flight.get_mut(&key) {
                Some(flight) => {
                    flight.waiters += 1;
                    debug!("joining in-flight fetch for {}", key);
                    (flight.id, flight.outcome.clone())
                }
                None => self.start(&mut state, key.clone(), fetch),
            }
        };

        let mut waiter = Waiter {
            state: &self.state,
            key: &key,
            id,
            settled: false,
        };

        tokio::select! {
            outcome = shared => {
                waiter.settled = true;
                outcome
            }
            _ = token.cancelled() => {
                debug!("caller cancelled while waiting for {}", key);
                Err(QueryError::Cancelled)
            }
        }
    }

    /// Runs a state-changing call through [`mutate`].
    pub async fn mutate<F, Fut>(&self, token: &CancellationToken, fetch: F) -> Result<T, QueryError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, FailureInfo>>,
    {
        mutate(token, fetch).await
    }

    /// Fresh cached result, if any. Never fetches.
    pub fn cached(&self, key: &QueryKey) -> Option<Arc<T>> {
        let state = lock(&self.state);
        state
            .entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.options.stale_time)
            .map(|entry| Arc::clone(&entry.value))
    }

    /// Drops the cached result for `key`. Returns whether one was cached.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        lock(&self.state).entries.remove(key).is_some()
    }

    /// Empties the cache and aborts every running fetch. Callers waiting on
    /// an aborted fetch get [`QueryError::Cancelled`].
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.entries.clear();
        for (key, flight) in state.in_flight.drain() {
            debug!("aborting fetch for {}", key);
            flight.abort.abort();
        }
    }

    /// Drops every entry past its staleness window. Returns how many went.
    pub fn evict_stale(&self) -> usize {
        let mut state = lock(&self.state);
        evict_stale(&mut state.entries, self.options.stale_time)
    }

    /// Number of cached entries, stale ones not yet evicted included.
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.state).in_flight.len()
    }

    fn fresh(&self, state: &mut State<T>, key: &QueryKey) -> Option<Arc<T>> {
        let entry = state.entries.get(key)?;
        if entry.fetched_at.elapsed() < self.options.stale_time {
            debug!("cache hit for {}", key);
            return Some(Arc::clone(&entry.value));
        }
        debug!("cached result for {} is stale", key);
        state.entries.remove(key);
        None
    }

    fn start<F, Fut>(&self, state: &mut State<T>, key: QueryKey, fetch: F) -> (u64, SharedOutcome<T>)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, FailureInfo>> + Send + 'static,
    {
        let id = state.next_id;
        state.next_id += 1;
        debug!("cache miss for {}, fetching", key);

        let shared_state = Arc::clone(&self.state);
        let retry = self.options.retry;
        let stale_time = self.options.stale_time;
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = fetch_with_retry::<T, _, _>(&task_key, &retry, &fetch)
                .await
                .map(Arc::new);

            // A cleared or abandoned fetch must not touch the cache.
            let mut state = lock(&shared_state);
            if state.in_flight.get(&task_key).map(|f| f.id) == Some(id) {
                state.in_flight.remove(&task_key);
                if let Ok(value) = &outcome {
                    evict_stale(&mut state.entries, stale_time);
                    state.entries.insert(
                        task_key,
                        CacheEntry {
                            value: Arc::clone(value),
                            fetched_at: Instant::now(),
                        },
                    );
                }
            }
            outcome
        });

        let abort = handle.abort_handle();
        let panic_state = Arc::clone(&self.state);
        let panic_key = key.clone();
        let outcome = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    let reason = panic_message(e.into_panic());
                    error!("fetch for {} panicked: {}", panic_key, reason);
                    // The task died before it could retire its own flight.
                    let mut state = lock(&panic_state);
                    if state.in_flight.get(&panic_key).map(|f| f.id) == Some(id) {
                        state.in_flight.remove(&panic_key);
                    }
                    Err(QueryError::Internal { reason })
                }
                Err(_) => Err(QueryError::Cancelled),
            }
        }
        .boxed()
        .shared();

        state.in_flight.insert(
            key,
            InFlight {
                id,
                outcome: outcome.clone(),
                waiters: 1,
                abort,
            },
        );
        (id, outcome)
    }
}

impl<T> Drop for QueryOrchestrator<T> {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        for (_, flight) in state.in_flight.drain() {
            flight.abort.abort();
        }
    }
}

/// Runs a state-changing call: one attempt, validated, never cached and
/// never retried.
pub async fn mutate<T, F, Fut>(token: &CancellationToken, fetch: F) -> Result<T, QueryError>
where
    T: Schema,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<String, FailureInfo>>,
{
    if token.is_cancelled() {
        return Err(QueryError::Cancelled);
    }

    let attempt = async {
        let body = fetch()
            .await
            .map_err(|failure| QueryError::from_failure(failure, 1))?;
        schema::parse_and_validate::<T>(&body).map_err(QueryError::from)
    };

    tokio::select! {
        outcome = attempt => outcome,
        _ = token.cancelled() => Err(QueryError::Cancelled),
    }
}

fn evict_stale<T>(entries: &mut HashMap<QueryKey, CacheEntry<T>>, stale_time: Duration) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.fetched_at.elapsed() < stale_time);
    let evicted = before - entries.len();
    if evicted > 0 {
        debug!("evicted {} stale cache entries", evicted);
    }
    evicted
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(s) => s.to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

async fn fetch_with_retry<T, F, Fut>(
    key: &QueryKey,
    retry: &RetryPolicy,
    fetch: &F,
) -> Result<T, QueryError>
where
    T: Schema,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<String, FailureInfo>>,
{
    let mut attempt_index = 0;
    loop {
        match fetch().await {
            // A malformed body would come back malformed again; no retry.
            Ok(body) => {
                return schema::parse_and_validate::<T>(&body).map_err(|errors| {
                    warn!("{}: response rejected: {}", key, errors);
                    QueryError::Validation(errors)
                });
            }
            Err(failure) if retry.should_retry(attempt_index, &failure) => {
                let delay = retry.backoff_delay(attempt_index);
                warn!(
                    "{}: attempt {} failed ({}), retrying in {:?}",
                    key,
                    attempt_index + 1,
                    failure,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt_index += 1;
            }
            Err(failure) => return Err(QueryError::from_failure(failure, attempt_index + 1)),
        }
    }
}

/// One caller's interest in an in-flight fetch. Dropping it before the
/// outcome arrives detaches the caller; the last one to leave aborts the
/// fetch.
struct Waiter<'a, T> {
    state: &'a Mutex<State<T>>,
    key: &'a QueryKey,
    id: u64,
    settled: bool,
}

impl<T> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = lock(self.state);
        let Some(flight) = state.in_flight.get_mut(self.key) else {
            return;
        };
        if flight.id != self.id {
            return;
        }
        flight.waiters -= 1;
        if flight.waiters == 0 {
            debug!("no caller left waiting for {}, aborting fetch", self.key);
            if let Some(flight) = state.in_flight.remove(self.key) {
                flight.abort.abort();
            }
        }
    }
}
