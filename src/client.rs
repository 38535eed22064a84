//! CP750 session with typed accessors
//!
//! A [`Cp750Client`] owns one connection for its whole lifetime. It is
//! created by a successful handshake and released by [`Cp750Client::close`]
//! or by dropping it. The device only accepts a few simultaneous
//! connections and evicts the oldest, so sessions should not be leaked.

use crate::config::ClientConfig;
use crate::error::{Cp750Error, Result};
use crate::executor::{Command, CommandExecutor};
use crate::field::{Field, InputMode};
use crate::listener::Listener;
use crate::scheduler::RefreshScheduler;
use crate::transport::{LineTransport, CP750_PORT};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Stateful client for one CP750
///
/// All methods take `&self`; a client may be shared between threads and
/// every request is serialized on the single connection. Listener callbacks
/// run on the thread that received the value and must not issue commands
/// on the same client.
pub struct Cp750Client {
    executor: Arc<CommandExecutor>,
    scheduler: RefreshScheduler,
    socket: TcpStream,
    peer: SocketAddr,
}

impl Cp750Client {
    /// Connect to `host` on the default control port
    pub fn connect(host: &str) -> Result<Self> {
        Self::connect_with_port(host, CP750_PORT)
    }

    pub fn connect_with_port(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_config(&ClientConfig::new(host).with_port(port))
    }

    /// Open the connection and perform the handshake.
    ///
    /// On any failure the socket is closed before the error is returned.
    pub fn connect_with_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        info!("Connecting to CP750 at {}:{}", config.host, config.port);

        let transport = LineTransport::connect(
            &config.host,
            config.port,
            config.connect_timeout(),
            config.read_timeout(),
        )?;
        let socket = transport.control_handle()?;
        let peer = transport.peer_addr();
        let executor = Arc::new(CommandExecutor::new(transport)?);

        if let Err(e) = executor.handshake() {
            error!("Handshake with {} failed: {}", peer, e);
            executor.abort();
            return Err(e);
        }

        let scheduler = match RefreshScheduler::spawn(executor.clone(), config.refresh_interval()) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                executor.abort();
                return Err(e);
            }
        };

        info!(
            "CP750 ready (version {})",
            executor.cache().get(Field::SysinfoVersion).unwrap_or_default()
        );
        Ok(Self {
            executor,
            scheduler,
            socket,
            peer,
        })
    }

    /// The underlying socket, for inspection or out-of-band shutdown
    pub fn socket(&self) -> &TcpStream {
        &self.socket
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn read_timeout(&self) -> Duration {
        self.executor.read_timeout()
    }

    pub fn set_read_timeout(&self, timeout: Duration) -> Result<()> {
        self.executor.set_read_timeout(timeout)
    }

    /// Current automatic refresh interval, zero when disabled
    pub fn refresh_interval(&self) -> Duration {
        self.scheduler.interval()
    }

    /// Periodically refresh every field with a `status` request; zero
    /// disables automatic refreshing
    pub fn set_refresh_interval(&self, interval: Duration) {
        self.scheduler.set_interval(interval);
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }

    /// Last known value of a field, without asking the device
    pub fn current_value(&self, field: Field) -> Option<String> {
        self.executor.cache().get(field)
    }

    /// All known values in field order
    pub fn current_values(&self) -> Vec<(Field, String)> {
        self.executor.cache().snapshot()
    }

    pub fn add_listener(&self, field: Field, listener: &Listener) {
        self.executor.listeners().add(field, listener);
    }

    /// Register a listener for the next value received for `field` only
    pub fn add_one_shot_listener(&self, field: Field, listener: &Listener) {
        self.executor.listeners().add_one_shot(field, listener);
    }

    /// Remove a listener from every field, persistent and one-shot
    pub fn remove_listener(&self, listener: &Listener) {
        self.executor.listeners().remove(listener);
    }

    /// Device firmware version, read once during the handshake
    pub fn get_version(&self) -> Option<String> {
        self.current_value(Field::SysinfoVersion)
    }

    pub fn get_fader(&self) -> Result<u8> {
        let value = self.executor.query(Field::SysFader)?;
        parse_value(Field::SysFader, &value)
    }

    /// Set the fader (0..=100); other values are dropped without being sent
    pub fn set_fader(&self, value: i32) -> Result<()> {
        self.executor.send(Field::SysFader, &value.to_string())?;
        Ok(())
    }

    /// Move the fader by -100..=100. The device clamps the result to
    /// 0..=100, so the fader is queried afterwards.
    pub fn set_fader_delta(&self, delta: i32) -> Result<()> {
        self.executor.send(Field::CtrlFaderDelta, &delta.to_string())?;
        self.executor.query(Field::SysFader)?;
        Ok(())
    }

    pub fn is_muted(&self) -> Result<bool> {
        let value = self.executor.query(Field::SysMute)?;
        match value.as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => Err(unexpected(Field::SysMute, value)),
        }
    }

    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.executor.send(Field::SysMute, if muted { "1" } else { "0" })?;
        Ok(())
    }

    pub fn get_input_mode(&self) -> Result<InputMode> {
        let value = self.executor.query(Field::SysInputMode)?;
        if value.is_empty() {
            return Err(Cp750Error::MissingValue(Field::SysInputMode));
        }
        value
            .parse()
            .map_err(|_| unexpected(Field::SysInputMode, value))
    }

    /// Switch input. Each input has its own fader level on the device, so
    /// the fader is queried afterwards.
    pub fn set_input_mode(&self, mode: InputMode) -> Result<()> {
        self.executor.send(Field::SysInputMode, mode.as_str())?;
        self.executor.query(Field::SysFader)?;
        Ok(())
    }

    /// Re-read every field with one `status` request
    pub fn refresh(&self) -> Result<()> {
        self.executor.refresh()
    }

    /// Send a value for a field and return the last value the device
    /// answered with; invalid values yield an empty string
    pub fn send(&self, field: Field, value: &str) -> Result<String> {
        self.executor.send(field, value)
    }

    pub fn query(&self, field: Field) -> Result<String> {
        self.executor.query(field)
    }

    /// Send a protocol line verbatim
    pub fn send_raw(&self, line: &str) -> Result<String> {
        self.executor.send_raw(line)
    }

    pub fn execute(&self, command: &Command) -> Result<String> {
        self.executor.execute(command)
    }

    /// Stop automatic refreshing and release the connection.
    ///
    /// May be called from any thread sharing the client. Calls made after
    /// (or blocked during) close fail with [`Cp750Error::StreamClosed`].
    /// Closing twice is a no-op.
    pub fn close(&self) {
        if !self.executor.is_closed() {
            info!("Closing connection to {}", self.peer);
        }
        self.executor.close(&self.socket);
        self.scheduler.stop();
    }
}

impl Drop for Cp750Client {
    fn drop(&mut self) {
        self.close();
    }
}

fn unexpected(field: Field, value: String) -> Cp750Error {
    Cp750Error::UnexpectedValue { field, value }
}

fn parse_value<T: std::str::FromStr>(field: Field, value: &str) -> Result<T> {
    if value.is_empty() {
        return Err(Cp750Error::MissingValue(field));
    }
    value.parse().map_err(|_| unexpected(field, value.to_string()))
}
