//! CP750 - client for the Dolby CP750 cinema processor control protocol
//!
//! The CP750 speaks a line-oriented ASCII protocol on TCP port 61408. This
//! library keeps one session open, mirrors the device state in a local
//! cache, notifies listeners about every value it receives and can refresh
//! the cache in the background.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cp750::{Cp750Client, Field, InputMode, Listener};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn main() -> cp750::Result<()> {
//!     let client = Cp750Client::connect("192.168.1.136")?;
//!     client.set_refresh_interval(Duration::from_secs(5));
//!
//!     println!("Current volume is: {}", client.get_fader()?);
//!     println!("Current input mode is: {}", client.get_input_mode()?);
//!
//!     let listener: Listener = Arc::new(|field: Field, value: &str| {
//!         println!("Value of {} has changed to {}", field, value);
//!     });
//!     client.add_listener(Field::SysFader, &listener);
//!
//!     client.set_input_mode(InputMode::Dig1)?;
//!     client.set_fader_delta(1)?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Cp750Client**: session lifecycle and typed accessors
//! - **CommandExecutor**: one request/response exchange at a time
//! - **RefreshScheduler**: background `status` polling
//! - **ListenerRegistry**: persistent and one-shot value listeners
//! - **StateCache**: last value seen per field
//! - **ResponseParser** / **LineTransport**: wire format and framing
//! - **Field**: static table of protocol keys and value domains

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod field;
pub mod listener;
pub mod parser;
pub mod scheduler;
pub mod transport;

pub use client::Cp750Client;
pub use config::ClientConfig;
pub use error::{Cp750Error, Result};
pub use executor::{Command, CommandExecutor};
pub use field::{Access, Domain, Field, InputMode, QUERY_TOKEN};
pub use listener::{Listener, ListenerRegistry};
pub use scheduler::{RefreshScheduler, RefreshTarget};
pub use transport::{CP750_PORT, DEFAULT_TIMEOUT};
