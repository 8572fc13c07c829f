//! Keyed read cache with generation-based invalidation.
//!
//! Each key holds the last successful value, a status, the last error and a
//! generation counter. Reads for the current generation are shared, so
//! concurrent callers of the same key cost one command. Invalidation bumps
//! the generation; a read that completes for an older generation is dropped
//! on arrival and its callers retry against the newer one.

use std::{any::Any, collections::HashMap, fmt, future::Future, sync::Arc};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::error::CommandError;

type AnyValue = Arc<dyn Any + Send + Sync>;
type ReadOutcome = Result<AnyValue, CommandError>;
type SharedRead = Shared<BoxFuture<'static, ReadOutcome>>;
type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, ReadOutcome> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Nothing has been read yet.
    Idle,
    Loading,
    Fresh,
    Errored,
}

/// Point-in-time view of one entry.
///
/// Equality compares data by pointer, so two snapshots are equal only if the
/// entry was not touched in between.
#[derive(Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub status: Status,
    /// Set by invalidation, cleared by the next successful read.
    pub stale: bool,
    data: Option<AnyValue>,
    error: Option<CommandError>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            status: Status::Idle,
            stale: false,
            data: None,
            error: None,
        }
    }

    /// Last successful value. Still present while loading or errored.
    pub fn data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data.clone()?.downcast::<T>().ok()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        let same_data = match (&self.data, &other.data) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        self.generation == other.generation
            && self.status == other.status
            && self.stale == other.stale
            && same_data
            && self.error == other.error
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("generation", &self.generation)
            .field("status", &self.status)
            .field("stale", &self.stale)
            .field("has_data", &self.data.is_some())
            .field("error", &self.error)
            .finish()
    }
}

struct Entry {
    generation: u64,
    status: Status,
    stale: bool,
    data: Option<AnyValue>,
    error: Option<CommandError>,
    /// Sequence number of the running read, paired with its handle.
    in_flight: Option<(u64, SharedRead)>,
    next_read: u64,
    fetcher: Option<Fetcher>,
    notify: watch::Sender<Snapshot>,
}

impl Entry {
    fn new() -> Self {
        let (notify, _) = watch::channel(Snapshot::empty());
        Self {
            generation: 0,
            status: Status::Idle,
            stale: false,
            data: None,
            error: None,
            in_flight: None,
            next_read: 0,
            fetcher: None,
            notify,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            generation: self.generation,
            status: self.status,
            stale: self.stale,
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }

    fn publish(&self) {
        self.notify.send_replace(self.snapshot());
    }

    fn is_fresh(&self) -> bool {
        self.status == Status::Fresh && !self.stale && self.data.is_some()
    }
}

/// Shared, cloneable handle; clones see the same entries.
#[derive(Clone, Default)]
pub struct QueryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, reading it through `fetcher` when
    /// the entry is not fresh. The fetcher is remembered so invalidation can
    /// refetch for live observers.
    pub async fn fetch<T, F, Fut>(&self, key: &str, fetcher: F) -> Result<Arc<T>, CommandError>
    where
        T: Any + Send + Sync,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, CommandError>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || {
            let read = fetcher();
            async move { read.await.map(|value| Arc::new(value) as AnyValue) }.boxed()
        });
        let value = self.read(key, Some(fetcher)).await?;
        value.downcast::<T>().map_err(|_| CommandError::Decode {
            command: key.to_string(),
            message: "cached value has a different type".into(),
        })
    }

    async fn read(&self, key: &str, fetcher: Option<Fetcher>) -> ReadOutcome {
        loop {
            let (generation, seq, read) = {
                let mut entries = self.entries.lock();
                let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
                if let Some(fetcher) = &fetcher {
                    entry.fetcher = Some(Arc::clone(fetcher));
                }
                if entry.is_fresh() {
                    if let Some(data) = &entry.data {
                        return Ok(Arc::clone(data));
                    }
                }
                let current = entry.generation;
                if let Some((seq, read)) = &entry.in_flight {
                    trace!(key, generation = current, seq, "joining in-flight read");
                    (current, *seq, read.clone())
                } else {
                    let Some(fetch) = entry.fetcher.clone() else {
                        return Err(CommandError::Transport(format!(
                            "no reader registered for {key}"
                        )));
                    };
                    let read = fetch().shared();
                    let seq = entry.next_read;
                    entry.next_read += 1;
                    entry.in_flight = Some((seq, read.clone()));
                    entry.status = Status::Loading;
                    entry.publish();
                    debug!(key, generation = current, seq, "starting read");
                    (current, seq, read)
                }
            };

            let outcome = read.await;

            {
                let mut entries = self.entries.lock();
                if let Some(entry) = entries.get_mut(key) {
                    if entry.generation != generation {
                        debug!(key, generation, current = entry.generation, "discarding stale read");
                        continue;
                    }
                    // A failed read leaves the generation alone, so a retry may
                    // already be running for it. Only the read's own waiters settle it.
                    let owns_read = matches!(&entry.in_flight, Some((s, _)) if *s == seq);
                    if owns_read {
                        entry.in_flight = None;
                        match &outcome {
                            Ok(value) => {
                                entry.data = Some(Arc::clone(value));
                                entry.error = None;
                                entry.status = Status::Fresh;
                                entry.stale = false;
                            }
                            Err(err) => {
                                entry.error = Some(err.clone());
                                entry.status = Status::Errored;
                            }
                        }
                        entry.publish();
                    }
                }
            }
            return outcome;
        }
    }

    /// Marks `key` stale and bumps its generation. If anything is observing
    /// the key, a refetch is spawned on the current runtime.
    pub fn invalidate(&self, key: &str) {
        let refetch = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            entry.generation += 1;
            entry.in_flight = None;
            entry.stale = true;
            entry.publish();
            debug!(key, generation = entry.generation, "invalidated");
            entry.fetcher.is_some() && entry.notify.receiver_count() > 0
        };

        if !refetch {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let cache = self.clone();
                let key = key.to_string();
                handle.spawn(async move {
                    if let Err(err) = cache.read(&key, None).await {
                        debug!(key = %key, error = %err, "background refetch failed");
                    }
                });
            }
            Err(_) => debug!(key, "no runtime, refetch deferred to next read"),
        }
    }

    pub fn snapshot(&self, key: &str) -> Option<Snapshot> {
        self.entries.lock().get(key).map(Entry::snapshot)
    }

    pub fn observe(&self, key: &str) -> Observer {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(Entry::new);
        Observer {
            rx: entry.notify.subscribe(),
        }
    }
}

/// Change notifications for one key. Dropping it is disposal.
pub struct Observer {
    rx: watch::Receiver<Snapshot>,
}

impl Observer {
    pub fn snapshot(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// True if the entry changed since the last `changed()`.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Waits for the next change. `None` once the cache is dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn dispose(self) {}
}
