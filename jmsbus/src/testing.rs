//! In-memory core used by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use jmsbus_codec::{DestinationAddress, DestinationKind};

use crate::message::Message;
use crate::spi::{CoreConnection, CoreError, CoreResult, CoreTransaction, ProducerSession};

/// Routes log output of the code under test to stdout, once per process.
pub(crate) fn init_log() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Debug).init();
    });
}

#[derive(Debug, Clone)]
pub(crate) struct Sent {
    pub(crate) address: DestinationAddress,
    pub(crate) message: Message,
    pub(crate) bound: bool,
    pub(crate) transacted: bool,
}

#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) sent: Mutex<Vec<Sent>>,
    pub(crate) fail_sends: Mutex<Option<CoreError>>,
    pub(crate) panic_sends: AtomicBool,
    pub(crate) send_delay: Mutex<Duration>,
    pub(crate) producers: Mutex<Vec<DestinationAddress>>,
    pub(crate) producers_closed: AtomicUsize,
    pub(crate) outcomes: Mutex<Vec<&'static str>>,
    pub(crate) temporaries: Mutex<Vec<(DestinationKind, String)>>,
    pub(crate) deleted: Mutex<Vec<String>>,
    closed: AtomicUsize,
}

impl Shared {
    fn record(&self, address: &DestinationAddress, msg: &Message, bound: bool, tx: Option<&dyn CoreTransaction>) -> CoreResult<()> {
        let delay = *self.send_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.panic_sends.load(Ordering::SeqCst) {
            panic!("core send failure");
        }
        if let Some(err) = self.fail_sends.lock().clone() {
            return Err(err);
        }
        self.sent.lock().push(Sent { address: address.clone(), message: msg.clone(), bound, transacted: tx.is_some() });
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockCore {
    pub(crate) shared: Arc<Shared>,
}

impl MockCore {
    pub(crate) fn new() -> Arc<Self> {
        init_log();
        Arc::new(Self::default())
    }

    #[inline]
    pub(crate) fn closed_count(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }

    #[inline]
    pub(crate) fn sent(&self) -> Vec<Sent> {
        self.shared.sent.lock().clone()
    }

    #[inline]
    pub(crate) fn set_send_delay(&self, delay: Duration) {
        *self.shared.send_delay.lock() = delay;
    }

    #[inline]
    pub(crate) fn temporaries(&self) -> Vec<(DestinationKind, String)> {
        self.shared.temporaries.lock().clone()
    }

    #[inline]
    pub(crate) fn deleted(&self) -> Vec<String> {
        self.shared.deleted.lock().clone()
    }

    #[inline]
    pub(crate) fn fail_sends(&self, err: Option<CoreError>) {
        *self.shared.fail_sends.lock() = err;
    }
}

struct MockProducer {
    address: DestinationAddress,
    shared: Arc<Shared>,
}

impl ProducerSession for MockProducer {
    fn send(&self, message: &Message, transaction: Option<&dyn CoreTransaction>) -> CoreResult<()> {
        self.shared.record(&self.address, message, true, transaction)
    }

    fn close(&self) -> CoreResult<()> {
        self.shared.producers_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockTransaction {
    shared: Arc<Shared>,
}

impl CoreTransaction for MockTransaction {
    fn commit(&self) -> CoreResult<()> {
        self.shared.outcomes.lock().push("commit");
        Ok(())
    }

    fn rollback(&self) -> CoreResult<()> {
        self.shared.outcomes.lock().push("rollback");
        Ok(())
    }
}

impl CoreConnection for MockCore {
    fn create_producer_session(&self, address: &DestinationAddress) -> CoreResult<Box<dyn ProducerSession>> {
        if address.name == "forbidden" {
            return Err(CoreError::NotAuthorized(address.name.clone()));
        }
        self.shared.producers.lock().push(address.clone());
        Ok(Box::new(MockProducer { address: address.clone(), shared: self.shared.clone() }))
    }

    fn send(&self, address: &DestinationAddress, message: &Message, transaction: Option<&dyn CoreTransaction>) -> CoreResult<()> {
        self.shared.record(address, message, false, transaction)
    }

    fn create_transaction(&self) -> CoreResult<Box<dyn CoreTransaction>> {
        Ok(Box::new(MockTransaction { shared: self.shared.clone() }))
    }

    fn create_temporary_destination(&self, kind: DestinationKind, address: &DestinationAddress) -> CoreResult<()> {
        self.shared.temporaries.lock().push((kind, address.name.clone()));
        Ok(())
    }

    fn delete_temporary_destination(&self, address: &DestinationAddress) -> CoreResult<()> {
        let mut temporaries = self.shared.temporaries.lock();
        let Some(pos) = temporaries.iter().position(|(_, name)| *name == address.name) else {
            return Err(CoreError::NotFound(address.name.clone()));
        };
        temporaries.remove(pos);
        self.shared.deleted.lock().push(address.name.clone());
        Ok(())
    }

    fn close(&self) -> CoreResult<()> {
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
