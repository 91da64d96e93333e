//! Cache cell — TTL-bounded memoization of one opaque value with
//! synchronous refill on miss. Single-writer contract: a host sharing one
//! cell across threads is expected to put it behind its own mutex.

use std::time::{Duration, Instant};

pub struct Cell<T> {
    ttl: Duration,
    stored: Option<(Instant, T)>,
}

impl<T: Clone> Cell<T> {
    pub fn new(ttl: Duration) -> Cell<T> {
        Cell { ttl, stored: None }
    }

    /// Returns `(value, true)` on a hit, `(_, false)` on a miss, clearing
    /// any stale entry in the process.
    pub fn get(&mut self, now: Instant) -> Option<T> {
        match &self.stored {
            Some((stored_at, v)) if *stored_at + self.ttl > now => Some(v.clone()),
            Some(_) => {
                self.stored = None;
                None
            }
            None => None,
        }
    }

    pub fn set(&mut self, v: T, now: Instant) {
        self.stored = Some((now, v));
    }

    /// Get-or-refill: return the cached value if still fresh, otherwise
    /// invoke `refill` and cache its result.
    pub fn get_or_refill<E>(&mut self, now: Instant, refill: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        if let Some(v) = self.get(now) {
            return Ok(v);
        }
        let v = refill()?;
        self.set(v.clone(), now);
        Ok(v)
    }

    /// `stored_at + ttl`, or `None` if nothing is cached.
    pub fn expires_at(&self) -> Option<Instant> {
        self.stored.as_ref().map(|(at, _)| *at + self.ttl)
    }

    /// Override the cell's TTL, e.g. a command provider response that
    /// advertises its own TTL. Does not affect the currently-stored entry's
    /// expiry, only future `set` calls' effective window.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl_miss_after() {
        let t0 = Instant::now();
        let mut cell: Cell<String> = Cell::new(Duration::from_secs(60));
        cell.set("v".to_string(), t0);

        assert_eq!(cell.get(t0 + Duration::from_secs(5)), Some("v".to_string()));
        assert_eq!(cell.get(t0 + Duration::from_secs(65)), None);
    }

    #[test]
    fn miss_clears_stale_entry() {
        let t0 = Instant::now();
        let mut cell: Cell<i32> = Cell::new(Duration::from_millis(10));
        cell.set(1, t0);
        assert_eq!(cell.get(t0 + Duration::from_millis(20)), None);
        // still None even if queried again at the same instant (cleared)
        assert_eq!(cell.get(t0 + Duration::from_millis(20)), None);
    }

    #[test]
    fn get_or_refill_only_calls_closure_on_miss() {
        let t0 = Instant::now();
        let mut cell: Cell<i32> = Cell::new(Duration::from_secs(60));
        let mut calls = 0;
        let v: Result<i32, String> = cell.get_or_refill(t0, || { calls += 1; Ok(42) });
        assert_eq!(v.unwrap(), 42);
        let v2: Result<i32, String> = cell.get_or_refill(t0 + Duration::from_secs(1), || { calls += 1; Ok(99) });
        assert_eq!(v2.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn cache_ttl_schedule_staggers_independently() {
        // discovery-ttl=60s, var1-ttl=3600s, var2-ttl=18000s
        let t0 = Instant::now();
        let mut discovery: Cell<i32> = Cell::new(Duration::from_secs(60));
        let mut var1: Cell<i32> = Cell::new(Duration::from_secs(3600));
        let mut var2: Cell<i32> = Cell::new(Duration::from_secs(18000));
        discovery.set(0, t0);
        var1.set(0, t0);
        var2.set(0, t0);

        let mut refills_at = |offset_secs: u64| -> (bool, bool, bool) {
            let now = t0 + Duration::from_secs(offset_secs);
            let d_hit = discovery.get(now).is_some();
            if !d_hit { discovery.set(0, now); }
            let v1_hit = var1.get(now).is_some();
            if !v1_hit { var1.set(0, now); }
            let v2_hit = var2.get(now).is_some();
            if !v2_hit { var2.set(0, now); }
            (d_hit, v1_hit, v2_hit)
        };

        assert_eq!(refills_at(5), (true, true, true));
        assert_eq!(refills_at(65), (false, true, true));
        assert_eq!(refills_at(3665), (false, false, true));
        assert_eq!(refills_at(21665), (false, false, false));
        assert_eq!(refills_at(21670), (true, true, true));
    }
}
