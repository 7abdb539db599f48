use std::time::{Duration, Instant};

/// A value plus the moment it was captured.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub captured_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            captured_at: Instant::now(),
        }
    }

    /// Valid iff `now - captured_at < ttl`.
    pub fn is_fresh_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.captured_at) < ttl
    }
}

/// Single-slot in-process TTL cache.
#[derive(Debug)]
pub struct MemoryCache<T> {
    ttl: Duration,
    entry: Option<CacheEntry<T>>,
}

impl<T: Clone> MemoryCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached payload if still fresh.
    pub fn get(&self) -> Option<T> {
        self.entry
            .as_ref()
            .filter(|entry| entry.is_fresh_at(Instant::now(), self.ttl))
            .map(|entry| entry.payload.clone())
    }

    /// Returns the fresh payload or recomputes and stores a new one.
    pub fn get_or_compute<F>(&mut self, compute: F) -> T
    where
        F: FnOnce() -> T,
    {
        if let Some(payload) = self.get() {
            tracing::trace!("Memory cache hit");
            return payload;
        }
        let payload = compute();
        self.entry = Some(CacheEntry::new(payload.clone()));
        payload
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn computes_once_within_ttl() {
        let calls = Cell::new(0);
        let mut cache = MemoryCache::new(Duration::from_secs(60));

        let first = cache.get_or_compute(|| {
            calls.set(calls.get() + 1);
            vec![1, 2, 3]
        });
        let second = cache.get_or_compute(|| {
            calls.set(calls.get() + 1);
            vec![9]
        });

        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn zero_ttl_always_recomputes() {
        let calls = Cell::new(0);
        let mut cache = MemoryCache::new(Duration::ZERO);
        for _ in 0..3 {
            cache.get_or_compute(|| calls.set(calls.get() + 1));
        }
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let mut cache = MemoryCache::new(Duration::from_secs(60));
        assert_eq!(cache.get_or_compute(|| 1), 1);
        cache.invalidate();
        assert!(cache.get().is_none());
        assert_eq!(cache.get_or_compute(|| 2), 2);
    }

    #[test]
    fn entry_freshness_boundary_is_exclusive() {
        let entry = CacheEntry::new(());
        let ttl = Duration::from_millis(500);
        assert!(entry.is_fresh_at(entry.captured_at, ttl));
        assert!(entry.is_fresh_at(entry.captured_at + Duration::from_millis(499), ttl));
        assert!(!entry.is_fresh_at(entry.captured_at + ttl, ttl));
    }
}
