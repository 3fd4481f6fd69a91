//! Shared pool that runs connection exception deliveries.
//!
//! The pool is built on first use, sized by `exception.max_threads`. If it
//! cannot be built the caller runs the work itself and the build is retried
//! on the next submission.

use std::panic::{catch_unwind, AssertUnwindSafe};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};

use jmsbus_conf::Settings;

static EXCEPTION_POOL: OnceCell<ThreadPool> = OnceCell::new();
static INIT_LOCK: Mutex<()> = parking_lot::const_mutex(());

fn exception_pool() -> Option<&'static ThreadPool> {
    if let Some(pool) = EXCEPTION_POOL.get() {
        return Some(pool);
    }
    let _guard = INIT_LOCK.lock();
    let max_threads = Settings::instance().exception.max_threads;
    EXCEPTION_POOL
        .get_or_try_init(|| {
            ThreadPoolBuilder::new()
                .num_threads(max_threads)
                .thread_name(|i| format!("jmsbus-exception-{i}"))
                .panic_handler(|_| log::error!("exception delivery task panicked"))
                .build()
        })
        .map_err(|e| log::warn!("failed to build the exception delivery pool, {e}"))
        .ok()
}

/// Runs `task` on the exception pool, or on the calling thread if the pool
/// is unavailable.
pub(crate) fn spawn_exception_task<F>(task: F)
where
    F: FnOnce() + Send + 'static,
{
    match exception_pool() {
        Some(pool) => pool.spawn(task),
        None => task(),
    }
}

/// Calls a user callback, containing any panic it raises.
pub(crate) fn call_listener<F: FnOnce()>(what: &str, f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::warn!("{what} panicked, ignored");
    }
}
