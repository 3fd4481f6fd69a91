use std::fmt;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Count of outstanding operations that other threads can wait on.
///
/// Decrementing never goes below zero, and the decrement that reaches zero
/// wakes every waiter.
#[derive(Default)]
pub struct WaitCounter {
    count: Mutex<usize>,
    zero: Condvar,
}

impl fmt::Debug for WaitCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ count: {} }}", self.count())
    }
}

impl WaitCounter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc(&self) {
        *self.count.lock() += 1;
    }

    #[inline]
    pub fn dec(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        *self.count.lock()
    }

    /// Blocks until the count is zero. Each time `interval` passes without
    /// that happening the wait is logged and resumed. A zero interval is
    /// treated as one millisecond.
    pub fn wait_zero(&self, interval: Duration) {
        let interval = interval.max(Duration::from_millis(1));
        let mut count = self.count.lock();
        while *count > 0 {
            if self.zero.wait_for(&mut count, interval).timed_out() && *count > 0 {
                log::debug!("still waiting for {} outstanding operations", *count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_saturating_dec() {
        let c = WaitCounter::new();
        c.dec();
        assert_eq!(c.count(), 0);
        c.inc();
        c.inc();
        assert_eq!(c.count(), 2);
        c.dec();
        c.dec();
        c.dec();
        assert_eq!(c.count(), 0);
        assert_eq!(format!("{c:?}"), "{ count: 0 }");
    }

    #[test]
    fn test_wait_zero_wakes_all() {
        let c = Arc::new(WaitCounter::new());
        for _ in 0..8 {
            c.inc();
        }

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let c = c.clone();
                thread::spawn(move || {
                    c.wait_zero(Duration::from_millis(5));
                    c.count()
                })
            })
            .collect();

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let c = c.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(i * 3));
                    c.dec();
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        for w in waiters {
            assert_eq!(w.join().unwrap(), 0);
        }
    }

    #[test]
    fn test_wait_zero_with_zero_interval() {
        let c = Arc::new(WaitCounter::new());
        c.inc();
        let c2 = c.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            c2.dec();
        });
        c.wait_zero(Duration::ZERO);
        assert_eq!(c.count(), 0);
        t.join().unwrap();
    }
}
