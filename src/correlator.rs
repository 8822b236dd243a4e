use crate::protocol::{Method, Request};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Age after which an unanswered request is dropped from the pending table
pub const STALE_AFTER: Duration = Duration::from_secs(30);

/// A request that was sent and has not been answered yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub id: u64,
    pub method: Method,
    pub params: Vec<Value>,
    pub enqueued_at: Instant,
}

impl PendingCommand {
    fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.enqueued_at) >= STALE_AFTER
    }
}

/// Matches replies to the requests that caused them
///
/// Ids come from an atomic counter, so concurrent senders never share an id;
/// the table itself is only touched under its mutex.
pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingCommand>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate an id, record the request as pending and return it ready to send
    pub fn register(&self, method: Method, params: Vec<Value>, now: Instant) -> Request {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            id,
            PendingCommand {
                id,
                method,
                params: params.clone(),
                enqueued_at: now,
            },
        );
        Request::new(id, method, params)
    }

    /// Forget a request that could not be written
    pub fn cancel(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Sweep stale entries, then remove and return the entry for `id`
    pub fn take(&self, id: u64, now: Instant) -> Option<PendingCommand> {
        let mut pending = self.lock();
        Self::sweep_locked(&mut pending, now);
        pending.remove(&id)
    }

    /// Drop every entry older than [`STALE_AFTER`], returning how many went
    pub fn sweep(&self, now: Instant) -> usize {
        Self::sweep_locked(&mut self.lock(), now)
    }

    /// Number of requests still awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn contains(&self, id: u64) -> bool {
        self.lock().contains_key(&id)
    }

    fn sweep_locked(pending: &mut HashMap<u64, PendingCommand>, now: Instant) -> usize {
        let before = pending.len();
        pending.retain(|_, command| !command.is_stale(now));
        let evicted = before - pending.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} stale pending command(s)", evicted);
        }
        evicted
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingCommand>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_ids_increase() {
        let correlator = Correlator::new();
        let now = Instant::now();
        let first = correlator.register(Method::Toggle, vec![], now);
        let second = correlator.register(Method::Toggle, vec![], now);
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(correlator.pending_count(), 2);
    }

    #[test]
    fn test_take_matches_once() {
        let correlator = Correlator::new();
        let now = Instant::now();
        let request = correlator.register(Method::SetBright, vec![json!(40)], now);

        let pending = correlator.take(request.id, now).unwrap();
        assert_eq!(pending.method, Method::SetBright);
        assert_eq!(pending.params, vec![json!(40)]);

        // duplicate reply
        assert!(correlator.take(request.id, now).is_none());
        assert!(correlator.take(999, now).is_none());
    }

    #[test]
    fn test_stale_entries_swept_on_any_message() {
        let correlator = Correlator::new();
        let start = Instant::now();
        let old = correlator.register(Method::SetPower, vec![json!("on")], start);
        let fresh = correlator.register(Method::Toggle, vec![], start + Duration::from_secs(20));

        // an unrelated reply 31s later still evicts the old entry
        assert!(correlator.take(12345, start + Duration::from_secs(31)).is_none());
        assert!(!correlator.contains(old.id));
        assert!(correlator.contains(fresh.id));

        assert_eq!(correlator.sweep(start + Duration::from_secs(51)), 1);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_cancel() {
        let correlator = Correlator::new();
        let request = correlator.register(Method::Toggle, vec![], Instant::now());
        correlator.cancel(request.id);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_concurrent_registration_yields_unique_ids() {
        let correlator = Arc::new(Correlator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let correlator = correlator.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| correlator.register(Method::GetProp, vec![], Instant::now()).id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 800);
        assert_eq!(correlator.pending_count(), 800);
    }
}
