use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use jmsbus_codec::{Destination, UriParser};
use jmsbus_conf::Settings;

use crate::error::{JmsError, Result};
use crate::exception::{ConnectionListener, ExceptionDelivery};
use crate::session::{callback_owner, Session};
use crate::spi::CoreConnection;
use crate::types::{next_id, AckMode, DashMap, ExceptionListenerRef, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Stopped,
    Started,
    Closed,
}

pub(crate) struct ConnectionInner {
    pub(crate) id: u64,
    pub(crate) core: Arc<dyn CoreConnection>,
    pub(crate) uri_parser: UriParser,
    pub(crate) wait_interval: Duration,
    state: Mutex<ConnectionState>,
    client_id: RwLock<Option<String>>,
    //The client id may only be set before the connection is first used.
    client_id_settable: AtomicBool,
    pub(crate) sessions: DashMap<SessionId, Session>,
    //Temporary destinations created through this connection, by name.
    pub(crate) temporaries: DashMap<String, Destination>,
    exceptions: Arc<ExceptionDelivery>,
}

impl ConnectionInner {
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        *self.state.lock() == ConnectionState::Closed
    }

    #[inline]
    fn used(&self) {
        self.client_id_settable.store(false, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn report_exception(&self, err: JmsError) {
        self.exceptions.report(err);
    }
}

/// An application's connection to the bus.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection {{ id: {}, state: {:?}, sessions: {} }}", self.inner.id, self.state(), self.inner.sessions.len())
    }
}

impl Connection {
    /// Wraps a core connection using the process-wide [`Settings`].
    #[inline]
    pub fn new(core: Arc<dyn CoreConnection>) -> Self {
        Self::with_settings(core, Settings::instance())
    }

    pub fn with_settings(core: Arc<dyn CoreConnection>, settings: &Settings) -> Self {
        let inner = ConnectionInner {
            id: next_id(),
            core,
            uri_parser: UriParser::new(settings.uri.queue_manager),
            wait_interval: settings.async_send.wait_interval,
            state: Mutex::new(ConnectionState::Stopped),
            client_id: RwLock::new(None),
            client_id_settable: AtomicBool::new(true),
            sessions: DashMap::default(),
            temporaries: DashMap::default(),
            exceptions: Arc::new(ExceptionDelivery::default()),
        };
        log::debug!("connection {} created", inner.id);
        Self { inner: Arc::new(inner) }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    #[inline]
    fn check_open(&self) -> Result<()> {
        if self.inner.is_closed() {
            Err(JmsError::closed("connection"))
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn client_id(&self) -> Option<String> {
        self.inner.client_id.read().clone()
    }

    pub fn set_client_id(&self, client_id: &str) -> Result<()> {
        self.check_open()?;
        if client_id.is_empty() {
            return Err(JmsError::Jms("client id must not be empty".into()));
        }
        if !self.inner.client_id_settable.swap(false, Ordering::SeqCst) {
            return Err(JmsError::IllegalState("client id can only be set before the connection is used".into()));
        }
        *self.inner.client_id.write() = Some(client_id.to_owned());
        Ok(())
    }

    #[inline]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn create_session(&self, transacted: bool, ack_mode: AckMode) -> Result<Session> {
        self.check_open()?;
        self.inner.used();
        let session = Session::new(&self.inner, transacted, ack_mode);
        self.inner.sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    pub fn set_exception_listener(&self, listener: Option<ExceptionListenerRef>) -> Result<()> {
        self.check_open()?;
        self.inner.used();
        self.inner.exceptions.set_listener(listener);
        Ok(())
    }

    #[inline]
    pub fn exception_listener(&self) -> Option<ExceptionListenerRef> {
        self.inner.exceptions.listener()
    }

    /// Queues `err` for the exception listener and returns immediately.
    /// Dropped if no listener is set.
    #[inline]
    pub fn report_exception(&self, err: JmsError) {
        self.inner.report_exception(err);
    }

    /// The hook the core uses to report failures it detects itself.
    #[inline]
    pub fn core_listener(&self) -> ConnectionListener {
        ConnectionListener::new(self.inner.exceptions.clone())
    }

    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match *state {
            ConnectionState::Closed => Err(JmsError::closed("connection")),
            _ => {
                self.inner.used();
                *state = ConnectionState::Started;
                Ok(())
            }
        }
    }

    pub fn stop(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match *state {
            ConnectionState::Closed => Err(JmsError::closed("connection")),
            _ => {
                self.inner.used();
                *state = ConnectionState::Stopped;
                Ok(())
            }
        }
    }

    #[inline]
    pub fn temporary_destination_count(&self) -> usize {
        self.inner.temporaries.len()
    }

    /// Closes every session, deletes the temporary destinations still
    /// alive, then closes the core connection. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if matches!(callback_owner(), Some((conn_id, _)) if conn_id == self.inner.id) {
            return Err(JmsError::IllegalState("a connection cannot be closed from its own completion listener".into()));
        }
        {
            let mut state = self.inner.state.lock();
            if *state == ConnectionState::Closed {
                return Ok(());
            }
            *state = ConnectionState::Closed;
        }

        let sessions: Vec<Session> = self.inner.sessions.iter().map(|e| e.value().clone()).collect();
        for session in sessions {
            if let Err(e) = session.close() {
                log::warn!("connection {} failed to close session {}, {e}", self.inner.id, session.id());
            }
        }
        self.inner.sessions.clear();

        let temporaries: Vec<Destination> = self.inner.temporaries.iter().map(|e| e.value().clone()).collect();
        for dest in temporaries {
            let deleted = dest
                .producer_address()
                .map_err(JmsError::from)
                .and_then(|addr| self.inner.core.delete_temporary_destination(&addr).map_err(JmsError::from));
            if let Err(e) = deleted {
                log::warn!("connection {} failed to delete temporary destination {dest}, {e}", self.inner.id);
            }
        }
        self.inner.temporaries.clear();

        self.inner.core.close()?;
        log::debug!("connection {} closed", self.inner.id);
        Ok(())
    }
}
