//! In-process CP750 stand-in for integration tests
//!
//! Listens on an ephemeral loopback port and answers the control protocol
//! the way the device does: queries echo the current value, valid sets echo
//! the new value, out-of-range values are silently ignored, and every
//! response ends with a blank line.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const VERSION: &str = "3.2.2-mock";

const FADER: &str = "cp750.sys.fader";
const MUTE: &str = "cp750.sys.mute";
const INPUT_MODE: &str = "cp750.sys.input_mode";
const FADER_DELTA: &str = "cp750.ctrl.fader_delta";
const VERSION_KEY: &str = "cp750.sysinfo.version";

const INPUT_MODES: [&str; 7] = ["analog", "dig_1", "dig_2", "dig_3", "dig_4", "mic", "non_sync"];

#[derive(Debug, Clone)]
struct Values {
    fader: i32,
    mute: bool,
    input_mode: String,
    last_input_mode: String,
}

impl Default for Values {
    fn default() -> Self {
        Self {
            fader: 35,
            mute: false,
            input_mode: "non_sync".to_string(),
            last_input_mode: "analog".to_string(),
        }
    }
}

#[derive(Default)]
struct Shared {
    values: Mutex<Values>,
    paused: Mutex<bool>,
    resumed: Condvar,
    streams: Mutex<Vec<TcpStream>>,
    active: AtomicUsize,
    stop: AtomicBool,
}

pub struct MockDevice {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept: Option<JoinHandle<()>>,
}

impl MockDevice {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock device");
        let addr = listener.local_addr().expect("mock device address");
        let shared = Arc::new(Shared::default());

        let accept_shared = shared.clone();
        let accept = std::thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_shared.stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                if let Ok(clone) = stream.try_clone() {
                    accept_shared.streams.lock().unwrap().push(clone);
                }
                accept_shared.active.fetch_add(1, Ordering::SeqCst);
                let conn_shared = accept_shared.clone();
                std::thread::spawn(move || {
                    serve(&conn_shared, stream);
                    conn_shared.active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            shared,
            accept: Some(accept),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn active_connections(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Wait until the number of open connections reaches `expected`
    pub fn wait_for_connections(&self, expected: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.active_connections() == expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        self.active_connections() == expected
    }

    pub fn fader(&self) -> i32 {
        self.shared.values.lock().unwrap().fader
    }

    /// Change the fader behind the client's back
    pub fn set_fader(&self, value: i32) {
        self.shared.values.lock().unwrap().fader = value;
    }

    pub fn input_mode(&self) -> String {
        self.shared.values.lock().unwrap().input_mode.clone()
    }

    /// While paused the device reads requests but does not answer them
    pub fn set_paused(&self, paused: bool) {
        *self.shared.paused.lock().unwrap() = paused;
        self.shared.resumed.notify_all();
    }

    /// Stop accepting and drop every open connection
    pub fn close(&mut self) {
        let Some(accept) = self.accept.take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::SeqCst);
        self.set_paused(false);
        // Wake the accept loop so it sees the stop flag
        let _ = TcpStream::connect_timeout(&self.addr, Duration::from_secs(1));
        let _ = accept.join();
        for stream in self.shared.streams.lock().unwrap().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.close();
    }
}

fn serve(shared: &Shared, stream: TcpStream) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = BufReader::new(read_half);
    let mut writer = stream;
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let request = line.trim();
        if request == "exit" {
            let _ = writer.shutdown(Shutdown::Both);
            return;
        }

        {
            let mut paused = shared.paused.lock().unwrap();
            while *paused && !shared.stop.load(Ordering::SeqCst) {
                paused = shared.resumed.wait(paused).unwrap();
            }
        }
        if shared.stop.load(Ordering::SeqCst) {
            return;
        }

        let mut response = respond(shared, request);
        response.push('\n');
        if writer.write_all(response.as_bytes()).is_err() {
            return;
        }
    }
}

/// Response block for one request, without the terminating blank line
fn respond(shared: &Shared, request: &str) -> String {
    let mut values = shared.values.lock().unwrap();

    if request == "status" {
        return format!(
            "{} : {}\n{} : {}\n{} : {}\n{} : {}\n",
            VERSION_KEY,
            VERSION,
            INPUT_MODE,
            values.input_mode,
            FADER,
            values.fader,
            MUTE,
            u8::from(values.mute),
        );
    }

    let Some((key, value)) = request.split_once(' ') else {
        return String::new();
    };
    let value = value.trim();

    match (key, value) {
        (VERSION_KEY, "?") => format!("{} {}\n", VERSION_KEY, VERSION),
        (FADER, "?") => format!("{} {}\n", FADER, values.fader),
        (MUTE, "?") => format!("{} {}\n", MUTE, u8::from(values.mute)),
        (INPUT_MODE, "?") => format!("{} {}\n", INPUT_MODE, values.input_mode),
        (FADER, value) => match value.parse::<i32>() {
            Ok(fader) if (0..=100).contains(&fader) => {
                values.fader = fader;
                format!("{} {}\n", FADER, fader)
            }
            _ => String::new(),
        },
        (MUTE, "0" | "1") => {
            values.mute = value == "1";
            format!("{} {}\n", MUTE, value)
        }
        (INPUT_MODE, "last") => {
            let previous = std::mem::take(&mut values.last_input_mode);
            values.last_input_mode = std::mem::replace(&mut values.input_mode, previous);
            format!("{} {}\n", INPUT_MODE, values.input_mode)
        }
        (INPUT_MODE, mode) if INPUT_MODES.contains(&mode) => {
            if values.input_mode != mode {
                values.last_input_mode = std::mem::replace(&mut values.input_mode, mode.to_string());
            }
            format!("{} {}\n", INPUT_MODE, mode)
        }
        (FADER_DELTA, delta) => match delta.parse::<i32>() {
            Ok(delta) if (-100..=100).contains(&delta) => {
                values.fader = (values.fader + delta).clamp(0, 100);
                format!("{} {}\n", FADER_DELTA, delta)
            }
            _ => String::new(),
        },
        _ => String::new(),
    }
}
