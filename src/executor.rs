//! Command execution over the serialized transport
//!
//! The CP750 protocol carries no request identifiers: a response belongs to
//! whichever request was written last. The executor therefore holds a single
//! lock from writing a request line until the blank line that terminates its
//! response, and every caller (including the refresh thread) goes through it.
//!
//! A request that times out still owes its response block. That block is
//! read and discarded before the next request is written.

use crate::cache::StateCache;
use crate::error::{Cp750Error, Result};
use crate::field::{Field, QUERY_TOKEN};
use crate::listener::ListenerRegistry;
use crate::parser::ResponseParser;
use crate::transport::LineTransport;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bulk request answered with one `<key> : <value>` line per queryable field
pub const STATUS_COMMAND: &str = "status";

/// Asks the device to drop the connection
pub const EXIT_COMMAND: &str = "exit";

/// A unit of work for the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set or query a field (`<key> <value>`)
    Set { field: Field, value: String },
    /// Protocol line sent verbatim
    Raw(String),
    /// Bulk `status` refresh
    Refresh,
}

impl Command {
    pub fn query(field: Field) -> Self {
        Command::Set {
            field,
            value: QUERY_TOKEN.to_string(),
        }
    }

    /// Wire form without the line terminator
    pub fn to_line(&self) -> String {
        match self {
            Command::Set { field, value } => format!("{} {}", field.key(), value),
            Command::Raw(line) => line.clone(),
            Command::Refresh => STATUS_COMMAND.to_string(),
        }
    }
}

/// Transport plus the number of response blocks it still owes from
/// requests that timed out
struct Link {
    transport: LineTransport,
    owed_blocks: usize,
}

/// Serializes requests on one transport and feeds every response line into
/// the cache and the listeners
pub struct CommandExecutor {
    link: Mutex<Link>,
    parser: ResponseParser,
    cache: StateCache,
    listeners: ListenerRegistry,
    closed: AtomicBool,
    read_timeout_ms: AtomicU64,
}

impl CommandExecutor {
    pub fn new(transport: LineTransport) -> Result<Self> {
        let read_timeout_ms = AtomicU64::new(as_millis(transport.read_timeout()));
        Ok(Self {
            link: Mutex::new(Link {
                transport,
                owed_blocks: 0,
            }),
            parser: ResponseParser::new()?,
            cache: StateCache::new(),
            listeners: ListenerRegistry::new(),
            closed: AtomicBool::new(false),
            read_timeout_ms,
        })
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the session unusable; later calls fail with `StreamClosed`
    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn lock_link(&self) -> Result<MutexGuard<'_, Link>> {
        if self.is_closed() {
            return Err(Cp750Error::StreamClosed);
        }
        let guard = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        // Closed while waiting for the lock
        if self.is_closed() {
            return Err(Cp750Error::StreamClosed);
        }
        Ok(guard)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.load(Ordering::Acquire))
    }

    /// Change the read timeout; waits for any in-flight request to finish
    pub fn set_read_timeout(&self, timeout: Duration) -> Result<()> {
        let mut link = self.lock_link()?;
        link.transport.set_read_timeout(timeout)?;
        self.read_timeout_ms
            .store(as_millis(link.transport.read_timeout()), Ordering::Release);
        Ok(())
    }


    /// Query every queryable field and require each response to start with
    /// the key that was asked for
    pub fn handshake(&self) -> Result<()> {
        let mut link = self.lock_link()?;
        let transport = &mut link.transport;
        for field in Field::queryable() {
            transport.write_line(&Command::query(field).to_line())?;

            let first = transport.read_line()?.ok_or(Cp750Error::StreamClosed)?;
            let key = first.split_whitespace().next().unwrap_or_default();
            if key != field.key() {
                return Err(Cp750Error::ProtocolViolation {
                    expected: field.key().to_string(),
                    line: first,
                });
            }

            let mut line = first;
            while !line.trim().is_empty() {
                self.process_line(&line);
                line = transport.read_line()?.ok_or(Cp750Error::StreamClosed)?;
            }
        }
        debug!("Handshake complete");
        Ok(())
    }

    /// Run a pending command and return the last value it produced
    pub fn execute(&self, command: &Command) -> Result<String> {
        match command {
            Command::Set { field, value } => self.send(*field, value),
            Command::Raw(line) => self.send_raw(line),
            Command::Refresh => self.send_raw(STATUS_COMMAND),
        }
    }

    /// Send a value for a field.
    ///
    /// Values outside the field's domain are never sent: a warning is logged
    /// and an empty result returned.
    pub fn send(&self, field: Field, value: &str) -> Result<String> {
        if !field.is_allowed_value(value) {
            warn!("Ignoring un-allowed value for field {}: {}", field, value);
            return Ok(String::new());
        }
        self.send_raw(&Command::Set {
            field,
            value: value.to_string(),
        }
        .to_line())
    }

    pub fn query(&self, field: Field) -> Result<String> {
        self.send(field, QUERY_TOKEN)
    }

    /// Re-read every queryable field with one `status` request
    pub fn refresh(&self) -> Result<()> {
        self.send_raw(STATUS_COMMAND).map(|_| ())
    }

    /// Send a raw protocol line and consume its response block.
    ///
    /// Returns the value of the last recognized response line, or an empty
    /// string if none was recognized.
    pub fn send_raw(&self, line: &str) -> Result<String> {
        let mut link = self.lock_link()?;
        let result = self.exchange(&mut link, line);
        if let Err(Cp750Error::StreamClosed) = result {
            self.mark_closed();
        }
        result
    }

    fn exchange(&self, link: &mut Link, line: &str) -> Result<String> {
        self.drain_owed(link)?;
        link.transport.write_line(line)?;

        let result = self.read_block(&mut link.transport);
        if let Err(Cp750Error::Timeout(_)) = result {
            link.owed_blocks += 1;
            warn!("No response to '{}', {} block(s) outstanding", line, link.owed_blocks);
        }
        result
    }

    /// Consume the late responses of timed-out requests so the next request
    /// reads its own answer. Their lines still reach cache and listeners.
    fn drain_owed(&self, link: &mut Link) -> Result<()> {
        while link.owed_blocks > 0 {
            self.read_block(&mut link.transport)?;
            link.owed_blocks -= 1;
            debug!("Drained late response, {} outstanding", link.owed_blocks);
        }
        Ok(())
    }

    fn read_block(&self, transport: &mut LineTransport) -> Result<String> {
        let mut last_value = String::new();
        loop {
            let line = transport.read_line()?.ok_or(Cp750Error::StreamClosed)?;
            if line.trim().is_empty() {
                return Ok(last_value);
            }
            if let Some(value) = self.process_line(&line) {
                last_value = value;
            }
        }
    }

    /// Parse one response line, update the cache and notify listeners
    fn process_line(&self, line: &str) -> Option<String> {
        debug!("Processing input line '{}'", line.trim());
        let (field, value) = self.parser.parse(line)?;
        self.cache.update(field, &value);
        self.listeners.dispatch(field, &value);
        Some(value)
    }

    /// Best-effort `exit` so the device frees the connection slot.
    ///
    /// Skipped when another caller holds the transport.
    pub(crate) fn say_goodbye(&self) {
        if self.is_closed() {
            return;
        }
        match self.link.try_lock() {
            Ok(mut link) => {
                if let Err(e) = link.transport.write_line(EXIT_COMMAND) {
                    debug!("Failed to send exit: {}", e);
                }
            }
            Err(_) => debug!("Transport busy, skipping exit"),
        }
    }

    /// Tear down a session that never became usable
    pub(crate) fn abort(&self) {
        self.mark_closed();
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transport
            .shutdown();
    }

    /// Shut the stream down without waiting for the transport lock
    pub(crate) fn close(&self, control: &TcpStream) {
        self.say_goodbye();
        let was_open = !self.closed.swap(true, Ordering::AcqRel);
        if let Err(e) = control.shutdown(Shutdown::Both) {
            debug!("Socket shutdown failed: {}", e);
        }
        if was_open {
            info!("Connection closed");
        }
    }
}

fn as_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

impl crate::scheduler::RefreshTarget for CommandExecutor {
    fn refresh(&self) -> Result<()> {
        CommandExecutor::refresh(self)
    }
}
