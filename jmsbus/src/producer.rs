use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use jmsbus_codec::Destination;
use jmsbus_utils::{expiration, timestamp_millis, WaitCounter};

use crate::error::{JmsError, Result};
use crate::message::{Message, MESSAGE_ID_PREFIX};
use crate::session::{AsyncSend, SessionInner};
use crate::spi::ProducerSession;
use crate::types::{
    next_id, CompletionListenerRef, DeliveryMode, Priority, ProducerId, SendParams, TimeToLive,
    DEFAULT_DELIVERY_DELAY,
};

/// Which send a queued asynchronous send replays.
#[derive(Debug, Clone)]
pub(crate) enum SendOp {
    Send,
    SendWith(SendParams),
    SendTo(Destination),
    SendToWith(Destination, SendParams),
}

#[derive(Debug, Clone, Copy)]
struct ProducerOptions {
    params: SendParams,
    delivery_delay: i64,
    disable_message_id: bool,
    disable_timestamp: bool,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            params: SendParams::default(),
            delivery_delay: DEFAULT_DELIVERY_DELAY,
            disable_message_id: false,
            disable_timestamp: false,
        }
    }
}

pub(crate) struct ProducerInner {
    pub(crate) id: ProducerId,
    session: Arc<SessionInner>,
    destination: Option<Destination>,
    core: Option<Box<dyn ProducerSession>>,
    options: RwLock<ProducerOptions>,
    //Asynchronous sends enqueued and not yet through their callback.
    pub(crate) inflight: WaitCounter,
    closing: AtomicBool,
    closed: AtomicBool,
}

impl ProducerInner {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || (self.closing.load(Ordering::SeqCst) && !self.session.on_worker()) {
            return Err(JmsError::closed("producer"));
        }
        self.session.check_open()
    }

    /// Blocks until every asynchronous send has finished. Skipped on the
    /// session worker, where the remaining sends are queued behind the
    /// caller.
    fn wait_async(&self) {
        if !self.session.on_worker() {
            self.inflight.wait_zero(self.session.wait_interval);
        }
    }

    #[inline]
    fn defaults(&self) -> SendParams {
        self.options.read().params
    }

    /// Checks that can fail before a synchronous send starts waiting.
    fn precheck(&self, op: &SendOp) -> Result<()> {
        self.check_open()?;
        self.target(op)?.1.validate()
    }

    fn own_destination(&self) -> Result<&Destination> {
        self.destination
            .as_ref()
            .ok_or_else(|| JmsError::UnsupportedOperation("producer has no destination, name one on each send".into()))
    }

    fn unidentified(&self) -> Result<()> {
        match self.destination.as_ref() {
            Some(dest) => Err(JmsError::UnsupportedOperation(format!("producer is bound to {dest}"))),
            None => Ok(()),
        }
    }

    /// Destination, requested parameters, and whether the bound core
    /// producer is used.
    fn target<'a>(&'a self, op: &'a SendOp) -> Result<(&'a Destination, SendParams, bool)> {
        match op {
            SendOp::Send => Ok((self.own_destination()?, self.defaults(), true)),
            SendOp::SendWith(params) => Ok((self.own_destination()?, *params, true)),
            SendOp::SendTo(dest) => {
                self.unidentified()?;
                Ok((dest, self.defaults(), false))
            }
            SendOp::SendToWith(dest, params) => {
                self.unidentified()?;
                Ok((dest, *params, false))
            }
        }
    }

    /// Validates the send and writes its headers to `msg`.
    fn stamp(&self, op: &SendOp, msg: &mut Message) -> Result<()> {
        self.check_open()?;
        let (dest, mut params, _) = self.target(op)?;
        params.validate()?;
        dest.check_blocked_status()?;

        //Destination settings override the producer's.
        if let Some(mode) = DeliveryMode::from_destination(&dest.delivery_mode()) {
            params.delivery_mode = mode;
        }
        if let Some(priority) = dest.priority() {
            params.priority = priority;
        }
        if let Some(ttl) = dest.time_to_live() {
            params.time_to_live = ttl;
        }

        let opts = *self.options.read();
        let now = timestamp_millis();
        msg.set_destination(dest)?;
        msg.set_delivery_mode(params.delivery_mode);
        msg.set_priority(params.priority);
        msg.set_timestamp(if opts.disable_timestamp { 0 } else { now });
        msg.set_expiration(expiration(now, params.time_to_live));
        msg.set_delivery_time(now.saturating_add(opts.delivery_delay));
        msg.set_message_id(
            (!opts.disable_message_id).then(|| format!("{MESSAGE_ID_PREFIX}{}", Uuid::new_v4().simple())),
        );
        Ok(())
    }

    /// Hands an already stamped message to the core, inside the session's
    /// transaction if it has one.
    pub(crate) fn deliver(&self, op: &SendOp, msg: &Message) -> Result<()> {
        self.check_open()?;
        let (dest, _, bound) = self.target(op)?;
        let tx = self.session.transaction()?;
        match (bound, self.core.as_ref()) {
            (true, Some(core)) => core.send(msg, tx.as_deref())?,
            _ => self.session.core.send(&dest.producer_address()?, msg, tx.as_deref())?,
        }
        log::trace!("producer {} sent {:?} to {dest}", self.id, msg.message_id());
        Ok(())
    }
}

/// Sends messages, either to the destination it was created for or, when
/// unidentified, to the destination named on each send.
#[derive(Clone)]
pub struct MessageProducer {
    inner: Arc<ProducerInner>,
}

impl fmt::Debug for MessageProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageProducer")
            .field("id", &self.inner.id)
            .field("destination", &self.inner.destination)
            .field("inflight", &self.inner.inflight)
            .finish()
    }
}

impl MessageProducer {
    pub(crate) fn new(
        session: Arc<SessionInner>,
        destination: Option<Destination>,
        core: Option<Box<dyn ProducerSession>>,
    ) -> Self {
        let inner = ProducerInner {
            id: next_id(),
            session,
            destination,
            core,
            options: RwLock::new(ProducerOptions::default()),
            inflight: WaitCounter::new(),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };
        Self { inner: Arc::new(inner) }
    }

    #[inline]
    pub fn id(&self) -> ProducerId {
        self.inner.id
    }

    #[inline]
    pub fn destination(&self) -> Option<&Destination> {
        self.inner.destination.as_ref()
    }

    /// Asynchronous sends not yet through their completion listener.
    #[inline]
    pub fn inflight(&self) -> usize {
        self.inner.inflight.count()
    }

    #[inline]
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.inner.options.read().params.delivery_mode
    }

    pub fn set_delivery_mode(&self, mode: DeliveryMode) -> Result<()> {
        self.inner.check_open()?;
        self.inner.options.write().params.delivery_mode = mode;
        Ok(())
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.inner.options.read().params.priority
    }

    pub fn set_priority(&self, priority: Priority) -> Result<()> {
        self.inner.check_open()?;
        let mut opts = self.inner.options.write();
        SendParams { priority, ..opts.params }.validate()?;
        opts.params.priority = priority;
        Ok(())
    }

    #[inline]
    pub fn time_to_live(&self) -> TimeToLive {
        self.inner.options.read().params.time_to_live
    }

    pub fn set_time_to_live(&self, ttl: TimeToLive) -> Result<()> {
        self.inner.check_open()?;
        let mut opts = self.inner.options.write();
        SendParams { time_to_live: ttl, ..opts.params }.validate()?;
        opts.params.time_to_live = ttl;
        Ok(())
    }

    #[inline]
    pub fn delivery_delay(&self) -> i64 {
        self.inner.options.read().delivery_delay
    }

    pub fn set_delivery_delay(&self, delay: i64) -> Result<()> {
        self.inner.check_open()?;
        if delay < 0 {
            return Err(JmsError::Jms(format!("invalid delivery delay {delay}")));
        }
        self.inner.options.write().delivery_delay = delay;
        Ok(())
    }

    #[inline]
    pub fn disable_message_id(&self) -> bool {
        self.inner.options.read().disable_message_id
    }

    pub fn set_disable_message_id(&self, disable: bool) -> Result<()> {
        self.inner.check_open()?;
        self.inner.options.write().disable_message_id = disable;
        Ok(())
    }

    #[inline]
    pub fn disable_message_timestamp(&self) -> bool {
        self.inner.options.read().disable_timestamp
    }

    pub fn set_disable_message_timestamp(&self, disable: bool) -> Result<()> {
        self.inner.check_open()?;
        self.inner.options.write().disable_timestamp = disable;
        Ok(())
    }

    fn send_sync(&self, op: SendOp, msg: &mut Message) -> Result<()> {
        self.inner.precheck(&op)?;
        self.inner.wait_async();
        self.inner.stamp(&op, msg)?;
        self.inner.deliver(&op, msg)
    }

    /// Headers are written to `msg` before this returns; the core receives a
    /// copy from the session worker.
    fn send_async_op(&self, op: SendOp, msg: &mut Message, listener: CompletionListenerRef) -> Result<()> {
        self.inner.stamp(&op, msg)?;
        self.inner.inflight.inc();
        let work = AsyncSend { producer: self.inner.clone(), op, message: msg.clone(), listener };
        if let Err(e) = self.inner.session.enqueue(work) {
            self.inner.inflight.dec();
            return Err(e);
        }
        Ok(())
    }

    /// Sends to this producer's destination with its default parameters.
    #[inline]
    pub fn send(&self, msg: &mut Message) -> Result<()> {
        self.send_sync(SendOp::Send, msg)
    }

    #[inline]
    pub fn send_with(
        &self,
        msg: &mut Message,
        delivery_mode: DeliveryMode,
        priority: Priority,
        time_to_live: TimeToLive,
    ) -> Result<()> {
        self.send_sync(SendOp::SendWith(SendParams { delivery_mode, priority, time_to_live }), msg)
    }

    /// Unidentified producers only.
    #[inline]
    pub fn send_to(&self, dest: &Destination, msg: &mut Message) -> Result<()> {
        self.send_sync(SendOp::SendTo(dest.clone()), msg)
    }

    #[inline]
    pub fn send_to_with(
        &self,
        dest: &Destination,
        msg: &mut Message,
        delivery_mode: DeliveryMode,
        priority: Priority,
        time_to_live: TimeToLive,
    ) -> Result<()> {
        self.send_sync(SendOp::SendToWith(dest.clone(), SendParams { delivery_mode, priority, time_to_live }), msg)
    }

    /// Stamps `msg`, queues the send and returns. The outcome goes to
    /// `listener`.
    #[inline]
    pub fn send_async(&self, msg: &mut Message, listener: CompletionListenerRef) -> Result<()> {
        self.send_async_op(SendOp::Send, msg, listener)
    }

    #[inline]
    pub fn send_with_async(
        &self,
        msg: &mut Message,
        delivery_mode: DeliveryMode,
        priority: Priority,
        time_to_live: TimeToLive,
        listener: CompletionListenerRef,
    ) -> Result<()> {
        self.send_async_op(SendOp::SendWith(SendParams { delivery_mode, priority, time_to_live }), msg, listener)
    }

    #[inline]
    pub fn send_to_async(&self, dest: &Destination, msg: &mut Message, listener: CompletionListenerRef) -> Result<()> {
        self.send_async_op(SendOp::SendTo(dest.clone()), msg, listener)
    }

    #[inline]
    pub fn send_to_with_async(
        &self,
        dest: &Destination,
        msg: &mut Message,
        delivery_mode: DeliveryMode,
        priority: Priority,
        time_to_live: TimeToLive,
        listener: CompletionListenerRef,
    ) -> Result<()> {
        self.send_async_op(
            SendOp::SendToWith(dest.clone(), SendParams { delivery_mode, priority, time_to_live }),
            msg,
            listener,
        )
    }

    /// Waits for outstanding asynchronous sends, then releases the core
    /// producer. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.inner.session.on_worker() {
            return Err(JmsError::IllegalState("a producer cannot be closed from a completion listener of its session".into()));
        }
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.inflight.wait_zero(self.inner.session.wait_interval);
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.session.remove_producer(self.inner.id);
        if let Some(core) = self.inner.core.as_ref() {
            core.close()?;
        }
        log::debug!("producer {} closed", self.inner.id);
        Ok(())
    }
}
