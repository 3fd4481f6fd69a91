//! Sessions and their asynchronous send worker.
//!
//! Each session starts one worker thread the first time one of its
//! producers sends asynchronously. The worker runs the queued sends in
//! order and calls their completion listeners. `commit`, `rollback` and
//! `close` wait for the queue to drain first.

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;
use uuid::Uuid;

use jmsbus_codec::uri::RESERVED_PREFIX;
use jmsbus_codec::{Destination, DestinationKind};
use jmsbus_utils::WaitCounter;

use crate::connection::ConnectionInner;
use crate::error::{JmsError, Result};
use crate::executor::call_listener;
use crate::message::Message;
use crate::producer::{MessageProducer, ProducerInner, SendOp};
use crate::spi::{CoreConnection, CoreTransaction};
use crate::types::{next_id, AckMode, CompletionListenerRef, DashMap, ProducerId, SessionId};

std::thread_local! {
    //(connection id, session id) of the session whose worker is this thread.
    static CALLBACK_OWNER: Cell<Option<(u64, SessionId)>> = const { Cell::new(None) };
}

#[inline]
pub(crate) fn callback_owner() -> Option<(u64, SessionId)> {
    CALLBACK_OWNER.with(|o| o.get())
}

/// A queued asynchronous send.
pub(crate) struct AsyncSend {
    pub(crate) producer: Arc<ProducerInner>,
    pub(crate) op: SendOp,
    pub(crate) message: Message,
    pub(crate) listener: CompletionListenerRef,
}

impl AsyncSend {
    fn run(self) {
        let AsyncSend { producer, op, message, listener } = self;
        //A panicking core must not leave the in-flight count raised.
        let result = panic::catch_unwind(AssertUnwindSafe(|| producer.deliver(&op, &message)))
            .unwrap_or_else(|_| Err(JmsError::Internal("core panicked during an asynchronous send".into())));
        match result {
            Ok(()) => call_listener("completion listener", || listener.on_completion(&message)),
            Err(e) => {
                log::debug!("async send on producer {} failed, {e}", producer.id);
                call_listener("completion listener", || listener.on_exception(&message, &e))
            }
        }
        producer.inflight.dec();
    }
}

struct Worker {
    tx: Sender<AsyncSend>,
    handle: JoinHandle<()>,
}

pub(crate) struct SessionInner {
    pub(crate) id: SessionId,
    pub(crate) connection_id: u64,
    connection: Weak<ConnectionInner>,
    pub(crate) core: Arc<dyn CoreConnection>,
    transacted: bool,
    ack_mode: AckMode,
    transaction: Mutex<Option<Arc<dyn CoreTransaction>>>,
    closing: AtomicBool,
    closed: AtomicBool,
    producers: DashMap<ProducerId, MessageProducer>,
    worker: Mutex<Option<Worker>>,
    //Queued asynchronous sends that have not finished their callback.
    pending: Arc<WaitCounter>,
    pub(crate) wait_interval: std::time::Duration,
}

impl SessionInner {
    /// True on this session's worker thread.
    #[inline]
    pub(crate) fn on_worker(&self) -> bool {
        matches!(callback_owner(), Some((_, id)) if id == self.id)
    }

    /// Sync callers are refused once closing starts; queued sends still run.
    pub(crate) fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || (self.closing.load(Ordering::SeqCst) && !self.on_worker()) {
            Err(JmsError::closed("session"))
        } else {
            Ok(())
        }
    }

    /// The open transaction, started on first use. `None` when not transacted.
    pub(crate) fn transaction(&self) -> Result<Option<Arc<dyn CoreTransaction>>> {
        if !self.transacted {
            return Ok(None);
        }
        let mut tx = self.transaction.lock();
        if tx.is_none() {
            *tx = Some(Arc::from(self.core.create_transaction()?));
        }
        Ok(tx.clone())
    }

    pub(crate) fn enqueue(&self, work: AsyncSend) -> Result<()> {
        self.check_open()?;
        let mut worker = self.worker.lock();
        if worker.is_none() {
            *worker = Some(self.start_worker()?);
        }
        let Some(w) = worker.as_ref() else {
            return Err(JmsError::Internal("async send worker missing".into()));
        };
        self.pending.inc();
        if let Err(e) = w.tx.send(work) {
            self.pending.dec();
            return Err(JmsError::Internal(format!("async send worker gone, {e}")));
        }
        Ok(())
    }

    fn start_worker(&self) -> Result<Worker> {
        let (tx, rx) = unbounded::<AsyncSend>();
        let owner = (self.connection_id, self.id);
        let session = self.id;
        let pending = self.pending.clone();
        let handle = thread::Builder::new()
            .name(format!("jmsbus-session-{session}"))
            .spawn(move || {
                CALLBACK_OWNER.with(|o| o.set(Some(owner)));
                log::debug!("session {session} async send worker started");
                for work in rx.iter() {
                    work.run();
                    pending.dec();
                }
                log::debug!("session {session} async send worker stopped");
            })
            .map_err(|e| JmsError::ResourceAllocation(format!("cannot start async send worker, {e}")))?;
        Ok(Worker { tx, handle })
    }

    #[inline]
    fn drain(&self) {
        self.pending.wait_zero(self.wait_interval);
    }

    #[inline]
    pub(crate) fn remove_producer(&self, id: ProducerId) {
        self.producers.remove(&id);
    }
}

/// A single-threaded context for producing messages.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session {{ id: {}, transacted: {}, pending: {} }}",
            self.inner.id,
            self.inner.transacted,
            self.inner.pending.count()
        )
    }
}

impl Session {
    pub(crate) fn new(conn: &Arc<ConnectionInner>, transacted: bool, ack_mode: AckMode) -> Self {
        let inner = SessionInner {
            id: next_id(),
            connection_id: conn.id,
            connection: Arc::downgrade(conn),
            core: conn.core.clone(),
            transacted,
            ack_mode: if transacted { AckMode::Transacted } else { ack_mode },
            transaction: Mutex::new(None),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            producers: DashMap::default(),
            worker: Mutex::new(None),
            pending: Arc::new(WaitCounter::new()),
            wait_interval: conn.wait_interval,
        };
        Self { inner: Arc::new(inner) }
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    #[inline]
    pub fn transacted(&self) -> bool {
        self.inner.transacted
    }

    #[inline]
    pub fn acknowledge_mode(&self) -> AckMode {
        self.inner.ack_mode
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Asynchronous sends queued on this session that have not yet
    /// completed.
    #[inline]
    pub fn pending_async_sends(&self) -> usize {
        self.inner.pending.count()
    }

    fn connection(&self) -> Result<Arc<ConnectionInner>> {
        self.inner.connection.upgrade().ok_or_else(|| JmsError::closed("connection"))
    }

    /// A producer for `destination`, or an unidentified producer that names
    /// the destination on every send.
    pub fn create_producer(&self, destination: Option<&Destination>) -> Result<MessageProducer> {
        self.inner.check_open()?;
        let core_session = match destination {
            Some(dest) => Some(self.inner.core.create_producer_session(&dest.producer_address()?)?),
            None => None,
        };
        let producer = MessageProducer::new(self.inner.clone(), destination.cloned(), core_session);
        self.inner.producers.insert(producer.id(), producer.clone());
        Ok(producer)
    }

    /// Accepts a `queue://` URI or a plain queue name.
    pub fn create_queue(&self, name: &str) -> Result<Destination> {
        self.inner.check_open()?;
        self.parse(name, DestinationKind::Queue)
    }

    /// Accepts a `topic://` URI, `topicSpace:topicName` or a plain topic name.
    pub fn create_topic(&self, name: &str) -> Result<Destination> {
        self.inner.check_open()?;
        self.parse(name, DestinationKind::Topic)
    }

    /// A queue named in the reserved space that lives until it is deleted
    /// or the connection closes.
    pub fn create_temporary_queue(&self) -> Result<Destination> {
        self.create_temporary(DestinationKind::Queue)
    }

    /// A topic whose topic space is a fresh reserved name.
    pub fn create_temporary_topic(&self) -> Result<Destination> {
        self.create_temporary(DestinationKind::Topic)
    }

    fn create_temporary(&self, kind: DestinationKind) -> Result<Destination> {
        self.inner.check_open()?;
        let conn = self.connection()?;
        let dest = match kind {
            DestinationKind::Queue => Destination::queue(&format!("{RESERVED_PREFIX}Q{}", Uuid::new_v4().simple()))?,
            DestinationKind::Topic => {
                let dest = Destination::new(DestinationKind::Topic);
                dest.set_topic_space(Some(&format!("{RESERVED_PREFIX}T{}", Uuid::new_v4().simple())))?;
                dest
            }
        };
        self.inner.core.create_temporary_destination(kind, &dest.producer_address()?)?;
        let name = dest.dest_name().unwrap_or_default();
        log::debug!("session {} created temporary {kind} {name}", self.inner.id);
        conn.temporaries.insert(name, dest.clone());
        Ok(dest)
    }

    /// Deletes a temporary destination created through this session's
    /// connection.
    pub fn delete_temporary_destination(&self, dest: &Destination) -> Result<()> {
        self.inner.check_open()?;
        let conn = self.connection()?;
        let name = dest.dest_name().filter(|_| dest.is_temporary()).unwrap_or_default();
        if !conn.temporaries.contains_key(&name) {
            return Err(JmsError::InvalidDestination(format!("{dest} is not a temporary destination of this connection")));
        }
        self.inner.core.delete_temporary_destination(&dest.producer_address()?)?;
        conn.temporaries.remove(&name);
        log::debug!("session {} deleted temporary destination {name}", self.inner.id);
        Ok(())
    }

    fn parse(&self, text: &str, kind: DestinationKind) -> Result<Destination> {
        let dest = self.connection()?.uri_parser.parse(text, kind)?;
        if dest.kind() != kind {
            return Err(JmsError::InvalidDestination(format!("`{text}` is not a {kind}")));
        }
        Ok(dest)
    }

    pub fn create_message(&self) -> Result<Message> {
        self.inner.check_open()?;
        Ok(Message::new())
    }

    pub fn create_text_message(&self, text: &str) -> Result<Message> {
        self.inner.check_open()?;
        Ok(Message::text(text))
    }

    fn check_transacted_op(&self, op: &str) -> Result<()> {
        self.inner.check_open()?;
        if !self.inner.transacted {
            return Err(JmsError::IllegalState(format!("{op} on a session that is not transacted")));
        }
        if self.inner.on_worker() {
            return Err(JmsError::IllegalState(format!("{op} called from a completion listener of this session")));
        }
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        self.check_transacted_op("commit")?;
        self.inner.drain();
        let tx = self.inner.transaction.lock().take();
        if let Some(tx) = tx {
            tx.commit()?;
        }
        log::debug!("session {} committed", self.inner.id);
        Ok(())
    }

    pub fn rollback(&self) -> Result<()> {
        self.check_transacted_op("rollback")?;
        self.inner.drain();
        let tx = self.inner.transaction.lock().take();
        if let Some(tx) = tx {
            tx.rollback()?;
        }
        log::debug!("session {} rolled back", self.inner.id);
        Ok(())
    }

    /// Waits for queued asynchronous sends, closes the producers, rolls back
    /// any open transaction and stops the worker. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.inner.on_worker() {
            return Err(JmsError::IllegalState("a session cannot be closed from its own completion listener".into()));
        }
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.drain();

        let producers: Vec<MessageProducer> = self.inner.producers.iter().map(|e| e.value().clone()).collect();
        for p in producers {
            if let Err(e) = p.close() {
                log::warn!("session {} failed to close producer {}, {e}", self.inner.id, p.id());
            }
        }
        self.inner.producers.clear();

        if let Some(tx) = self.inner.transaction.lock().take() {
            if let Err(e) = tx.rollback() {
                log::warn!("session {} failed to roll back on close, {e}", self.inner.id);
            }
        }

        self.inner.closed.store(true, Ordering::SeqCst);

        if let Some(Worker { tx, handle }) = self.inner.worker.lock().take() {
            drop(tx);
            if handle.join().is_err() {
                log::warn!("session {} async send worker panicked", self.inner.id);
            }
        }

        if let Some(conn) = self.inner.connection.upgrade() {
            conn.sessions.remove(&self.inner.id);
        }
        log::debug!("session {} closed", self.inner.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use jmsbus_codec::property::values;

    use super::*;
    use crate::connection::Connection;
    use crate::spi::CoreError;
    use crate::testing::MockCore;
    use crate::types::CompletionListener;

    fn session(transacted: bool) -> (Connection, Session, Arc<MockCore>) {
        let core = MockCore::new();
        let conn = Connection::new(core.clone());
        let session = conn.create_session(transacted, AckMode::Client).unwrap();
        (conn, session, core)
    }

    #[derive(Default)]
    struct Count(AtomicUsize);

    impl CompletionListener for Count {
        fn on_completion(&self, _message: &Message) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn on_exception(&self, _message: &Message, _err: &JmsError) {}
    }

    #[test]
    fn test_create_destinations() {
        let (_conn, session, _core) = session(false);
        let q = session.create_queue("queue://my.queue?priority=5").unwrap();
        assert_eq!(q.queue_name().as_deref(), Some("my.queue"));
        assert_eq!(q.priority(), Some(5));

        let q = session.create_queue("queue://q?badnvp&priority=3").unwrap();
        assert_eq!(q.priority(), Some(3));

        let t = session.create_topic("sports:scores").unwrap();
        assert_eq!(t.topic_space().as_deref(), Some("sports"));
        assert_eq!(t.topic_name().as_deref(), Some("scores"));

        assert!(matches!(session.create_queue("topic://news"), Err(JmsError::InvalidDestination(_))));
        assert!(matches!(session.create_queue("_internal"), Err(JmsError::InvalidDestination(_))));
        assert!(matches!(session.create_queue("queue://qm/q"), Err(JmsError::InvalidDestination(_))));
    }

    #[test]
    fn test_temporary_destinations() {
        let (conn, session, core) = session(false);
        let q = session.create_temporary_queue().unwrap();
        let t = session.create_temporary_topic().unwrap();
        assert!(q.is_queue() && q.is_temporary());
        assert!(t.is_topic() && t.is_temporary());
        let qname = q.queue_name().unwrap();
        assert!(qname.starts_with("_Q"));
        assert!(t.topic_space().unwrap().starts_with("_T"));
        assert_ne!(session.create_temporary_queue().unwrap().queue_name(), Some(qname.clone()));
        assert_eq!(core.temporaries().len(), 3);
        assert_eq!(core.temporaries()[0], (DestinationKind::Queue, qname.clone()));
        assert_eq!(conn.temporary_destination_count(), 3);

        let producer = session.create_producer(Some(&q)).unwrap();
        producer.send(&mut Message::new()).unwrap();
        assert_eq!(core.sent()[0].address.name, qname);

        // the reserved space stays closed to applications
        assert!(matches!(session.create_queue(&qname), Err(JmsError::InvalidDestination(_))));

        session.delete_temporary_destination(&q).unwrap();
        assert_eq!(core.deleted(), vec![qname]);
        assert_eq!(conn.temporary_destination_count(), 2);
        assert!(matches!(session.delete_temporary_destination(&q), Err(JmsError::InvalidDestination(_))));
        let plain = session.create_queue("plain").unwrap();
        assert!(matches!(session.delete_temporary_destination(&plain), Err(JmsError::InvalidDestination(_))));

        let other = Connection::new(MockCore::new());
        let other_session = other.create_session(false, AckMode::Auto).unwrap();
        assert!(matches!(other_session.delete_temporary_destination(&t), Err(JmsError::InvalidDestination(_))));
    }

    #[test]
    fn test_ack_mode() {
        let (_conn, plain, _core) = session(false);
        assert_eq!(plain.acknowledge_mode(), AckMode::Client);
        let (_conn, tx, _core) = session(true);
        assert_eq!(tx.acknowledge_mode(), AckMode::Transacted);
        assert!(tx.transacted());
    }

    #[test]
    fn test_commit_requires_transacted_session() {
        let (_conn, session, _core) = session(false);
        assert!(matches!(session.commit(), Err(JmsError::IllegalState(_))));
        assert!(matches!(session.rollback(), Err(JmsError::IllegalState(_))));
    }

    #[test]
    fn test_commit_and_rollback() {
        let (_conn, session, core) = session(true);
        let q = session.create_queue("a").unwrap();
        let producer = session.create_producer(Some(&q)).unwrap();

        session.commit().unwrap();
        assert!(core.shared.outcomes.lock().is_empty());

        producer.send(&mut Message::new()).unwrap();
        session.commit().unwrap();
        producer.send(&mut Message::new()).unwrap();
        session.rollback().unwrap();
        assert_eq!(*core.shared.outcomes.lock(), vec!["commit", "rollback"]);
    }

    #[test]
    fn test_commit_waits_for_async_sends() {
        let (_conn, session, core) = session(true);
        core.set_send_delay(Duration::from_millis(3));
        let q = session.create_queue("a").unwrap();
        let producer = session.create_producer(Some(&q)).unwrap();
        let count = Arc::new(Count::default());
        for _ in 0..8 {
            producer.send_async(&mut Message::new(), count.clone()).unwrap();
        }
        session.commit().unwrap();
        assert_eq!(count.0.load(Ordering::SeqCst), 8);
        assert_eq!(session.pending_async_sends(), 0);
        assert_eq!(core.sent().len(), 8);
    }

    #[test]
    fn test_close() {
        let (conn, session, core) = session(true);
        core.set_send_delay(Duration::from_millis(2));
        let q = session.create_queue("a").unwrap();
        q.set_read_ahead(values::READ_AHEAD_OFF).unwrap();
        let producer = session.create_producer(Some(&q)).unwrap();
        let count = Arc::new(Count::default());
        for _ in 0..5 {
            producer.send_async(&mut Message::new(), count.clone()).unwrap();
        }

        session.close().unwrap();
        assert_eq!(count.0.load(Ordering::SeqCst), 5);
        assert!(session.is_closed());
        assert_eq!(core.shared.producers_closed.load(Ordering::SeqCst), 1);
        assert_eq!(*core.shared.outcomes.lock(), vec!["rollback"]);
        assert_eq!(conn.session_count(), 0);

        assert!(matches!(session.create_producer(None), Err(JmsError::IllegalState(_))));
        assert!(matches!(producer.send(&mut Message::new()), Err(JmsError::IllegalState(_))));
        session.close().unwrap();
    }

    #[test]
    fn test_create_producer_errors() {
        let (_conn, session, _core) = session(false);
        let q = session.create_queue("forbidden").unwrap();
        assert!(matches!(session.create_producer(Some(&q)), Err(JmsError::Security(_))));
        let unnamed = Destination::new(DestinationKind::Queue);
        assert!(matches!(session.create_producer(Some(&unnamed)), Err(JmsError::InvalidDestination(_))));
    }

    #[test]
    fn test_routing_path_address() {
        let (_conn, session, core) = session(false);
        let q = session.create_queue("target").unwrap();
        q.set_forward_routing_path(Some(vec!["hop1".into(), "target".into()]));
        let producer = session.create_producer(Some(&q)).unwrap();
        producer.send(&mut Message::new()).unwrap();
        assert_eq!(core.shared.producers.lock()[0].name, "hop1");
        assert_eq!(core.sent()[0].address.name, "hop1");
    }

    #[test]
    fn test_transaction_failure() {
        let (_conn, session, core) = session(true);
        let q = session.create_queue("a").unwrap();
        let producer = session.create_producer(Some(&q)).unwrap();
        core.fail_sends(Some(CoreError::LimitExceeded("a is full".into())));
        assert!(matches!(producer.send(&mut Message::new()), Err(JmsError::ResourceAllocation(_))));
    }
}
