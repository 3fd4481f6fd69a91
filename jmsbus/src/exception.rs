use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::JmsError;
use crate::executor::{call_listener, spawn_exception_task};
use crate::spi::CoreError;
use crate::types::ExceptionListenerRef;

#[derive(Default)]
struct Pending {
    queue: VecDeque<JmsError>,
    active: bool,
}

/// Delivers one connection's exceptions to its listener, oldest first and
/// one at a time, on the shared exception pool.
#[derive(Default)]
pub(crate) struct ExceptionDelivery {
    pending: Mutex<Pending>,
    listener: RwLock<Option<ExceptionListenerRef>>,
}

impl ExceptionDelivery {
    #[inline]
    pub(crate) fn listener(&self) -> Option<ExceptionListenerRef> {
        self.listener.read().clone()
    }

    #[inline]
    pub(crate) fn set_listener(&self, listener: Option<ExceptionListenerRef>) {
        *self.listener.write() = listener;
    }

    pub(crate) fn report(self: &Arc<Self>, err: JmsError) {
        if self.listener.read().is_none() {
            log::debug!("no exception listener, dropping {err}");
            return;
        }

        {
            let mut pending = self.pending.lock();
            pending.queue.push_back(err);
            if pending.active {
                return;
            }
            pending.active = true;
        }

        let this = self.clone();
        spawn_exception_task(move || this.deliver());
    }

    fn deliver(&self) {
        loop {
            let err = {
                let mut pending = self.pending.lock();
                match pending.queue.pop_front() {
                    Some(err) => err,
                    None => {
                        pending.active = false;
                        return;
                    }
                }
            };
            if let Some(listener) = self.listener() {
                call_listener("exception listener", || listener.on_exception(&err));
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.pending.lock().queue.len()
    }
}

/// Handed to the core so it can report failures it detects on its own,
/// such as a lost connection.
#[derive(Clone)]
pub struct ConnectionListener {
    delivery: Arc<ExceptionDelivery>,
}

impl ConnectionListener {
    #[inline]
    pub(crate) fn new(delivery: Arc<ExceptionDelivery>) -> Self {
        Self { delivery }
    }

    pub fn communication_error(&self, err: CoreError) {
        log::debug!("core reported {err}");
        self.delivery.report(err.into());
    }
}
