#![deny(unsafe_code)]

//! Process-wide jmsbus configuration.
//!
//! Sources, in increasing precedence: `/etc/jmsbus/jmsbus.toml`,
//! `jmsbus.toml` in the working directory, the file named by
//! [`Options::cfg_name`], then `JMSBUS_*` environment variables
//! (`JMSBUS_EXCEPTION__MAX_THREADS=8`).

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use config::{Config, File};
use once_cell::sync::OnceCell;
use serde::Deserialize;

use jmsbus_codec::QueueManagerPolicy;
use jmsbus_utils::deserialize_duration;

use self::logging::Log;

pub use self::options::Options;

pub mod logging;
pub mod options;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Clone)]
pub struct Settings(Arc<Inner>);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub exception: Exception,
    #[serde(default)]
    pub async_send: AsyncSend,
    #[serde(default)]
    pub uri: Uri,
    #[serde(default, skip)]
    pub opts: Options,
}

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    fn new(opts: Options) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(File::with_name("/etc/jmsbus/jmsbus").required(false))
            .add_source(File::with_name("jmsbus").required(false));

        if let Some(cfg) = opts.cfg_name.as_ref() {
            builder = builder.add_source(File::with_name(cfg).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("jmsbus").prefix_separator("_").separator("__").try_parsing(true),
        );

        let mut inner: Inner = builder.build()?.try_deserialize()?;

        //Startup options overriding file configuration
        if let Some(max_threads) = opts.exception_max_threads {
            inner.exception.max_threads = max_threads;
        }
        if inner.exception.max_threads == 0 {
            log::warn!("exception.max_threads must be positive, using {}", Exception::max_threads_default());
            inner.exception.max_threads = Exception::max_threads_default();
        }
        if inner.async_send.wait_interval.is_zero() {
            log::warn!(
                "async_send.wait_interval must be positive, using {:?}",
                AsyncSend::wait_interval_default()
            );
            inner.async_send.wait_interval = AsyncSend::wait_interval_default();
        }

        inner.opts = opts;
        Ok(Self(Arc::new(inner)))
    }

    /// The installed settings, or the defaults if [`Settings::init`] has not
    /// been called.
    #[inline]
    pub fn instance() -> &'static Self {
        SETTINGS.get_or_init(|| Settings(Arc::new(Inner::default())))
    }

    #[inline]
    pub fn init(opts: Options) -> Result<&'static Self> {
        SETTINGS.set(Settings::new(opts)?).map_err(|_| anyhow!("Settings init failed"))?;
        SETTINGS.get().ok_or_else(|| anyhow!("Settings init failed"))
    }

    #[inline]
    pub fn logs() {
        let cfg = Self::instance();
        log::debug!("Config info is {:?}", cfg.0);
        log::info!("exception.max_threads is {}", cfg.exception.max_threads);
        log::info!("async_send.wait_interval is {:?}", cfg.async_send.wait_interval);
        log::info!("uri.queue_manager is {:?}", cfg.uri.queue_manager);
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Settings ...")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Exception {
    //Threads in the pool that delivers exceptions to connection listeners.
    #[serde(default = "Exception::max_threads_default")]
    pub max_threads: usize,
}

impl Default for Exception {
    #[inline]
    fn default() -> Self {
        Self { max_threads: Self::max_threads_default() }
    }
}

impl Exception {
    fn max_threads_default() -> usize {
        5
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AsyncSend {
    //How long a synchronous operation waits for outstanding asynchronous sends before logging and waiting again.
    #[serde(default = "AsyncSend::wait_interval_default", deserialize_with = "deserialize_duration")]
    pub wait_interval: Duration,
}

impl Default for AsyncSend {
    #[inline]
    fn default() -> Self {
        Self { wait_interval: Self::wait_interval_default() }
    }
}

impl AsyncSend {
    fn wait_interval_default() -> Duration {
        Duration::from_secs(20)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Uri {
    //Handling of the queue manager segment in queue://qmgr/name.
    #[serde(default)]
    pub queue_manager: QueueManagerPolicy,
}
