//! The simplified JMS 2.0 API: one connection and one session behind a
//! single object, and lightweight producers configured fluently.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use jmsbus_codec::Destination;

use crate::connection::Connection;
use crate::error::{JmsError, Result};
use crate::message::{Message, Value};
use crate::producer::MessageProducer;
use crate::session::Session;
use crate::spi::CoreConnection;
use crate::types::{
    AckMode, CompletionListenerRef, DeliveryMode, ExceptionListenerRef, Priority, SendParams, TimeToLive,
    DEFAULT_DELIVERY_DELAY,
};

pub struct JmsContext {
    connection: Connection,
    session: Session,
    auto_start: bool,
}

impl fmt::Debug for JmsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JmsContext").field("connection", &self.connection).field("session", &self.session).finish()
    }
}

impl JmsContext {
    pub fn new(core: Arc<dyn CoreConnection>, session_mode: AckMode) -> Result<Self> {
        let connection = Connection::new(core);
        let transacted = session_mode == AckMode::Transacted;
        let session = connection.create_session(transacted, session_mode)?;
        Ok(Self { connection, session, auto_start: true })
    }

    #[inline]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    #[inline]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[inline]
    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    #[inline]
    pub fn set_auto_start(&mut self, auto_start: bool) {
        self.auto_start = auto_start;
    }

    #[inline]
    pub fn session_mode(&self) -> AckMode {
        self.session.acknowledge_mode()
    }

    #[inline]
    pub fn client_id(&self) -> Option<String> {
        self.connection.client_id()
    }

    #[inline]
    pub fn set_client_id(&self, client_id: &str) -> Result<()> {
        self.connection.set_client_id(client_id)
    }

    #[inline]
    pub fn set_exception_listener(&self, listener: Option<ExceptionListenerRef>) -> Result<()> {
        self.connection.set_exception_listener(listener)
    }

    #[inline]
    pub fn exception_listener(&self) -> Option<ExceptionListenerRef> {
        self.connection.exception_listener()
    }

    pub fn create_producer(&self) -> Result<JmsProducer> {
        if self.auto_start {
            self.connection.start()?;
        }
        Ok(JmsProducer::new(self.session.create_producer(None)?))
    }

    #[inline]
    pub fn create_queue(&self, name: &str) -> Result<Destination> {
        self.session.create_queue(name)
    }

    #[inline]
    pub fn create_topic(&self, name: &str) -> Result<Destination> {
        self.session.create_topic(name)
    }

    #[inline]
    pub fn create_temporary_queue(&self) -> Result<Destination> {
        self.session.create_temporary_queue()
    }

    #[inline]
    pub fn create_temporary_topic(&self) -> Result<Destination> {
        self.session.create_temporary_topic()
    }

    #[inline]
    pub fn create_message(&self) -> Result<Message> {
        self.session.create_message()
    }

    #[inline]
    pub fn create_text_message(&self, text: &str) -> Result<Message> {
        self.session.create_text_message(text)
    }

    #[inline]
    pub fn start(&self) -> Result<()> {
        self.connection.start()
    }

    #[inline]
    pub fn stop(&self) -> Result<()> {
        self.connection.stop()
    }

    #[inline]
    pub fn commit(&self) -> Result<()> {
        self.session.commit()
    }

    #[inline]
    pub fn rollback(&self) -> Result<()> {
        self.session.rollback()
    }

    #[inline]
    pub fn close(&self) -> Result<()> {
        self.connection.close()
    }
}

/// Sends through an unidentified producer, applying its own delivery
/// parameters, message properties and headers to every message.
pub struct JmsProducer {
    producer: MessageProducer,
    params: SendParams,
    delivery_delay: i64,
    disable_message_id: bool,
    disable_timestamp: bool,
    completion_listener: Option<CompletionListenerRef>,
    properties: BTreeMap<String, Value>,
    correlation_id: Option<String>,
    jms_type: Option<String>,
    reply_to: Option<Destination>,
}

impl fmt::Debug for JmsProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JmsProducer")
            .field("producer", &self.producer)
            .field("params", &self.params)
            .field("async", &self.completion_listener.is_some())
            .finish()
    }
}

impl JmsProducer {
    fn new(producer: MessageProducer) -> Self {
        Self {
            producer,
            params: SendParams::default(),
            delivery_delay: DEFAULT_DELIVERY_DELAY,
            disable_message_id: false,
            disable_timestamp: false,
            completion_listener: None,
            properties: BTreeMap::new(),
            correlation_id: None,
            jms_type: None,
            reply_to: None,
        }
    }

    pub fn set_delivery_mode(&mut self, mode: DeliveryMode) -> &mut Self {
        self.params.delivery_mode = mode;
        self
    }

    pub fn set_priority(&mut self, priority: Priority) -> Result<&mut Self> {
        SendParams { priority, ..self.params }.validate()?;
        self.params.priority = priority;
        Ok(self)
    }

    pub fn set_time_to_live(&mut self, ttl: TimeToLive) -> Result<&mut Self> {
        SendParams { time_to_live: ttl, ..self.params }.validate()?;
        self.params.time_to_live = ttl;
        Ok(self)
    }

    pub fn set_delivery_delay(&mut self, delay: i64) -> Result<&mut Self> {
        if delay < 0 {
            return Err(JmsError::Jms(format!("invalid delivery delay {delay}")));
        }
        self.delivery_delay = delay;
        Ok(self)
    }

    pub fn set_disable_message_id(&mut self, disable: bool) -> &mut Self {
        self.disable_message_id = disable;
        self
    }

    pub fn set_disable_message_timestamp(&mut self, disable: bool) -> &mut Self {
        self.disable_timestamp = disable;
        self
    }

    /// With a listener set, sends return at once and report to it.
    pub fn set_async(&mut self, listener: Option<CompletionListenerRef>) -> &mut Self {
        self.completion_listener = listener;
        self
    }

    pub fn set_property<V: Into<Value>>(&mut self, name: &str, value: V) -> Result<&mut Self> {
        if name.is_empty() {
            return Err(JmsError::Jms("property name must not be empty".into()));
        }
        self.properties.insert(name.to_owned(), value.into());
        Ok(self)
    }

    #[inline]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn clear_properties(&mut self) -> &mut Self {
        self.properties.clear();
        self
    }

    pub fn set_correlation_id(&mut self, id: Option<&str>) -> &mut Self {
        self.correlation_id = id.map(ToOwned::to_owned);
        self
    }

    pub fn set_jms_type(&mut self, jms_type: Option<&str>) -> &mut Self {
        self.jms_type = jms_type.map(ToOwned::to_owned);
        self
    }

    pub fn set_reply_to(&mut self, reply_to: Option<&Destination>) -> &mut Self {
        self.reply_to = reply_to.cloned();
        self
    }

    fn prepare(&self, msg: &mut Message) -> Result<()> {
        for (name, value) in &self.properties {
            msg.set_property(name, value.clone())?;
        }
        if self.correlation_id.is_some() {
            msg.set_correlation_id(self.correlation_id.as_deref());
        }
        if self.jms_type.is_some() {
            msg.set_jms_type(self.jms_type.as_deref());
        }
        if self.reply_to.is_some() {
            msg.set_reply_to(self.reply_to.as_ref())?;
        }
        self.producer.set_delivery_delay(self.delivery_delay)?;
        self.producer.set_disable_message_id(self.disable_message_id)?;
        self.producer.set_disable_message_timestamp(self.disable_timestamp)?;
        Ok(())
    }

    /// Sends `msg` to `dest`; the message with its headers set is returned.
    pub fn send(&self, dest: &Destination, mut msg: Message) -> Result<Message> {
        self.prepare(&mut msg)?;
        let SendParams { delivery_mode, priority, time_to_live } = self.params;
        match self.completion_listener.as_ref() {
            Some(listener) => {
                self.producer.send_to_with_async(dest, &mut msg, delivery_mode, priority, time_to_live, listener.clone())?
            }
            None => self.producer.send_to_with(dest, &mut msg, delivery_mode, priority, time_to_live)?,
        }
        Ok(msg)
    }

    #[inline]
    pub fn send_text(&self, dest: &Destination, text: &str) -> Result<Message> {
        self.send(dest, Message::text(text))
    }

    #[inline]
    pub fn send_bytes(&self, dest: &Destination, body: &[u8]) -> Result<Message> {
        self.send(dest, Message::with_body(bytes::Bytes::copy_from_slice(body)))
    }
}
