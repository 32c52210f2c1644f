//! Ticket-tracker adapter.
//!
//! Keeps the real third-party issue-tracker client out of core scope: a
//! `TicketTracker` trait (mirroring the [`crate::parser::LanguageAnalyzer`]
//! trait-object pattern) with a `NullTicketTracker` default, plus a
//! `CachedTicketTracker` decorator that adds rate-limit-friendly,
//! read-through caching around any implementation.

use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::error::OmniResult;

/// A single ticket/issue record, tracker-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Tracker-assigned id (e.g. `"PROJ-123"`).
    pub id: String,
    /// Which tracker this came from (e.g. `"jira"`, `"github"`, `"linear"`).
    pub source: String,
    /// Ticket title.
    pub title: String,
    /// Ticket body/description.
    pub body: String,
    /// Current status (tracker-specific string, e.g. `"open"`, `"done"`).
    pub status: String,
    /// Labels/tags attached to the ticket.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Tracker-side version/revision marker, used as part of the cache key
    /// so a cached entry is invalidated when the ticket actually changes.
    pub version: String,
}

/// A tracker-agnostic search filter for `search_tickets`.
#[derive(Debug, Clone, Default)]
pub struct TicketQuery {
    /// Free-text query.
    pub query: String,
    /// Restrict to this status, if set.
    pub status: Option<String>,
    /// Restrict to tickets carrying all of these labels.
    pub labels: Vec<String>,
    /// Restrict to this source tracker, if set.
    pub source: Option<String>,
}

/// Adapter over an external issue tracker.
///
/// Implementations are expected to be cheap to clone/share (e.g. holding
/// only an HTTP client and credentials) since the retrieval server calls
/// through a shared reference.
pub trait TicketTracker: Send + Sync {
    /// Identifies which tracker this adapter talks to (e.g. `"jira"`).
    fn source(&self) -> &str;

    /// Free-text/filtered search over tickets.
    fn search(&self, query: &TicketQuery) -> OmniResult<Vec<Ticket>>;

    /// Fetch a single ticket by id. `Ok(None)` means not found (distinct
    /// from a transient provider error, which should be returned as `Err`).
    fn get(&self, id: &str) -> OmniResult<Option<Ticket>>;

    /// Cheaply check the tracker-side version of a ticket without fetching
    /// its full body, used by [`CachedTicketTracker`] to decide whether a
    /// cached copy is still fresh. Trackers with a lightweight metadata
    /// endpoint (an ETag, a `updated_at` field) should override this; the
    /// default falls back to a full `get`.
    fn current_version(&self, id: &str) -> OmniResult<Option<String>> {
        Ok(self.get(id)?.map(|t| t.version))
    }
}

/// Safe default tracker: always empty/not-found, never errors. Used when
/// no real tracker is configured so `search_tickets`/`get_ticket` degrade
/// gracefully instead of requiring one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTicketTracker;

impl TicketTracker for NullTicketTracker {
    fn source(&self) -> &str {
        "none"
    }

    fn search(&self, _query: &TicketQuery) -> OmniResult<Vec<Ticket>> {
        Ok(Vec::new())
    }

    fn get(&self, _id: &str) -> OmniResult<Option<Ticket>> {
        Ok(None)
    }
}

/// Cache key: a ticket is only reused from cache while its tracker-side
/// version is unchanged, so external edits still show up promptly.
type CacheKey = (String, String, String);

/// Read-through caching decorator around any [`TicketTracker`].
///
/// Only `get` is cached (keyed on `(source, id, version)`); `search` always
/// hits the inner tracker, since result sets go stale too quickly to cache
/// usefully and the point of caching here is to absorb repeated
/// `get_ticket` calls for the same id across a session.
pub struct CachedTicketTracker<T: TicketTracker> {
    inner: T,
    cache: Mutex<LruCache<CacheKey, Ticket>>,
}

impl<T: TicketTracker> CachedTicketTracker<T> {
    /// Wrap `inner`, caching up to `capacity` tickets.
    pub fn new(inner: T, capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<T: TicketTracker> TicketTracker for CachedTicketTracker<T> {
    fn source(&self) -> &str {
        self.inner.source()
    }

    fn search(&self, query: &TicketQuery) -> OmniResult<Vec<Ticket>> {
        self.inner.search(query)
    }

    fn get(&self, id: &str) -> OmniResult<Option<Ticket>> {
        let Some(current_version) = self.inner.current_version(id)? else {
            return Ok(None);
        };
        let key: CacheKey = (self.inner.source().to_string(), id.to_string(), current_version);

        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.get(&key) {
                return Ok(Some(cached.clone()));
            }
        }

        let ticket = self.inner.get(id)?;
        if let Some(ticket) = &ticket {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.put(key, ticket.clone());
        }
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTracker {
        probe_calls: AtomicUsize,
        full_fetch_calls: AtomicUsize,
        ticket: Ticket,
    }

    impl TicketTracker for CountingTracker {
        fn source(&self) -> &str {
            "counting"
        }

        fn search(&self, _query: &TicketQuery) -> OmniResult<Vec<Ticket>> {
            Ok(vec![self.ticket.clone()])
        }

        fn get(&self, _id: &str) -> OmniResult<Option<Ticket>> {
            self.full_fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.ticket.clone()))
        }

        fn current_version(&self, _id: &str) -> OmniResult<Option<String>> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.ticket.version.clone()))
        }
    }

    fn sample_ticket() -> Ticket {
        Ticket {
            id: "PROJ-1".to_string(),
            source: "counting".to_string(),
            title: "Sample".to_string(),
            body: "Body".to_string(),
            status: "open".to_string(),
            labels: Vec::new(),
            version: "v1".to_string(),
        }
    }

    #[test]
    fn test_null_tracker_always_empty() {
        let tracker = NullTicketTracker;
        assert!(tracker.search(&TicketQuery::default()).unwrap().is_empty());
        assert!(tracker.get("ANY-1").unwrap().is_none());
    }

    #[test]
    fn test_cached_tracker_avoids_refetching_unchanged_ticket() {
        let inner = CountingTracker {
            probe_calls: AtomicUsize::new(0),
            full_fetch_calls: AtomicUsize::new(0),
            ticket: sample_ticket(),
        };
        let cached = CachedTicketTracker::new(inner, 10);

        let first = cached.get("PROJ-1").unwrap();
        let second = cached.get("PROJ-1").unwrap();
        assert_eq!(first, second);
        assert_eq!(cached.inner.full_fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached.inner.probe_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cached_tracker_passes_through_not_found() {
        struct EmptyTracker;
        impl TicketTracker for EmptyTracker {
            fn source(&self) -> &str {
                "empty"
            }
            fn search(&self, _query: &TicketQuery) -> OmniResult<Vec<Ticket>> {
                Ok(Vec::new())
            }
            fn get(&self, _id: &str) -> OmniResult<Option<Ticket>> {
                Ok(None)
            }
        }
        let cached = CachedTicketTracker::new(EmptyTracker, 10);
        assert!(cached.get("MISSING-1").unwrap().is_none());
    }
}
