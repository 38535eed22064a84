//! Line-framed TCP transport to the CP750
//!
//! One bidirectional stream per session. Every request and response is a
//! single newline-terminated ASCII line.

use crate::error::{Cp750Error, Result};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// Default control port of the CP750
pub const CP750_PORT: u16 = 61408;

/// Default connect and read timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking, line-oriented connection to the device
pub struct LineTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer: SocketAddr,
    read_timeout: Duration,
    partial: Vec<u8>,
}

impl LineTransport {
    /// Connect to the device.
    ///
    /// Every address `host` resolves to is tried in turn. Zero timeouts fall
    /// back to [`DEFAULT_TIMEOUT`].
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let connect_timeout = non_zero(connect_timeout);
        let read_timeout = non_zero(read_timeout);
        let address = format!("{}:{}", host, port);
        let connection_failed = |source| Cp750Error::ConnectionFailed {
            address: address.clone(),
            source,
        };

        let mut last_error = None;
        let mut stream = None;
        for addr in (host, port).to_socket_addrs().map_err(connection_failed)? {
            debug!("Connecting to {} (timeout: {}ms)", addr, connect_timeout.as_millis());
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        let stream = match stream {
            Some(stream) => stream,
            None => {
                let source = last_error.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved")
                });
                return Err(connection_failed(source));
            }
        };

        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_write_timeout(Some(read_timeout))?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let reader = BufReader::new(stream.try_clone()?);

        info!("Connected to CP750 at {}", peer);
        Ok(Self {
            reader,
            writer: stream,
            peer,
            read_timeout,
            partial: Vec::new(),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Change the read (and write) timeout of the live stream
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        let timeout = non_zero(timeout);
        self.writer.set_read_timeout(Some(timeout))?;
        self.writer.set_write_timeout(Some(timeout))?;
        self.read_timeout = timeout;
        Ok(())
    }

    /// Independent handle to the same socket, used to shut it down while a
    /// read is blocked on another thread
    pub fn control_handle(&self) -> Result<TcpStream> {
        Ok(self.writer.try_clone()?)
    }

    /// Send one line, appending the newline terminator
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        debug!("Sending '{}'", line);
        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');
        self.writer
            .write_all(framed.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|e| Cp750Error::from_stream(e, self.read_timeout))
    }

    /// Read one line without its terminator, `None` at end of stream.
    ///
    /// Invalid UTF-8 is replaced rather than rejected. Bytes of a line cut
    /// short by a timeout are kept and completed by the next call.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        match self.reader.read_until(b'\n', &mut self.partial) {
            Ok(0) if self.partial.is_empty() => Ok(None),
            Ok(_) => {
                let raw = std::mem::take(&mut self.partial);
                let line = String::from_utf8_lossy(&raw);
                Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
            }
            Err(e) => Err(Cp750Error::from_stream(e, self.read_timeout)),
        }
    }

    /// Shut down both directions; blocked readers observe end of stream
    pub fn shutdown(&self) {
        if let Err(e) = self.writer.shutdown(Shutdown::Both) {
            debug!("Shutdown of {} failed: {}", self.peer, e);
        }
    }
}

pub(crate) fn non_zero(timeout: Duration) -> Duration {
    if timeout.is_zero() {
        DEFAULT_TIMEOUT
    } else {
        timeout
    }
}
