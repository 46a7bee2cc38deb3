//! Simulated Libera BBFE console for integration tests
//!
//! Listens on a loopback port and answers the text protocol the way the
//! front end does: greeting banner, `scpi` console activation, `*IDN?`,
//! keyword queries and writes, and `*RST`. Behaviour can be switched at run
//! time to exercise failure paths:
//! - silence (client times out)
//! - rejected writes and resets
//! - garbled or foreign replies
//! - dropped connections

#![allow(dead_code)] // Not every test file uses every helper

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const PROMPT: &str = "scpi>";
pub const BANNER: &str = "Libera BBFE remote console\r\n";
pub const IDENTITY: &str = "Instrumentation Technologies,Libera BBFE,SN0042,2.1.3";

/// Short link timeout so timeout tests finish quickly.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Debug)]
struct SimState {
    values: HashMap<String, String>,
    identity: String,
    silent: bool,
    reject_writes: bool,
    reject_reset: bool,
    garble_reads: bool,
    drop_next: bool,
    delay: Duration,
    received: Vec<String>,
    connections: usize,
}

/// Handle to a running simulator.
#[derive(Clone)]
pub struct SimulatedBbfe {
    addr: SocketAddr,
    state: Arc<Mutex<SimState>>,
}

/// Factory values, as `(keyword, reply text)`.
pub fn factory_values() -> HashMap<String, String> {
    [
        ("TIM:SLE", "5 min"),
        ("BRI:SLE", "10 %"),
        ("BRI:AWA", "100 %"),
        ("FAN:SSP", "4200 rpm"),
        ("FAN:MSP", "4170 rpm"),
        ("TEM:LIM", "55 C"),
        ("TEM:INS", "31.5 C"),
        ("TEM:ALA", "OFF"),
        ("TIM:UP", "12d03h"),
        ("VOL:3V3", "3.31 volts"),
        ("VOL:5V", "5.02 volts"),
        ("VOL:-5V", "-4.98 volts"),
        ("VOL:8V", "8.01 volts"),
        ("VOL:12V", "12.10 volts"),
        ("LEV:X", "-40 dBm"),
        ("LEV:Y", "-40 dBm"),
        ("LEV:I", "-30 dBm"),
        ("PHA", "+000'"),
        ("PHA:OFF:X", "+010'"),
        ("PHA:OFF:Y", "-010'"),
        ("PHA:OFF:IT", "+000'"),
        ("PHA:OFF:IL", "+000'"),
        ("PHA:CLO:1", "+020'"),
        ("PHA:CLO:2", "+000'"),
        ("PHA:CLO:3", "+000'"),
        ("PHA:CLO:4", "+000'"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl SimulatedBbfe {
    /// Bind to an ephemeral loopback port and start accepting.
    pub async fn start() -> (Self, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sim = Self {
            addr: listener.local_addr().unwrap(),
            state: Arc::new(Mutex::new(SimState {
                values: factory_values(),
                identity: IDENTITY.to_string(),
                silent: false,
                reject_writes: false,
                reject_reset: false,
                garble_reads: false,
                drop_next: false,
                delay: Duration::ZERO,
                received: Vec::new(),
                connections: 0,
            })),
        };

        let server = sim.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                server.state().connections += 1;
                tokio::spawn(server.clone().serve(socket));
            }
        });
        (sim, handle)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn set_silent(&self, silent: bool) {
        self.state().silent = silent;
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.state().reject_writes = reject;
    }

    pub fn set_reject_reset(&self, reject: bool) {
        self.state().reject_reset = reject;
    }

    pub fn set_garble_reads(&self, garble: bool) {
        self.state().garble_reads = garble;
    }

    pub fn set_identity(&self, identity: &str) {
        self.state().identity = identity.to_string();
    }

    /// Wait this long before the banner and before every reply.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = delay;
    }

    /// Close the connection instead of answering the next request.
    pub fn drop_next_request(&self) {
        self.state().drop_next = true;
    }

    /// Current stored reply text for a keyword.
    pub fn value(&self, keyword: &str) -> Option<String> {
        self.state().values.get(keyword).cloned()
    }

    /// Request lines received so far, without terminators.
    pub fn received(&self) -> Vec<String> {
        self.state().received.clone()
    }

    pub fn connections(&self) -> usize {
        self.state().connections
    }

    async fn serve(self, socket: TcpStream) {
        let (read_half, mut write_half) = socket.into_split();
        self.pause().await;
        if write_half.write_all(BANNER.as_bytes()).await.is_err() {
            return;
        }

        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim_end_matches('\r').to_string();
            let reply = self.answer(&line);
            match reply {
                Answer::Reply(text) => {
                    self.pause().await;
                    if write_half.write_all(text.as_bytes()).await.is_err() {
                        return;
                    }
                }
                Answer::Silent => {}
                Answer::Hangup => return,
            }
        }
    }

    async fn pause(&self) {
        let delay = self.state().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn answer(&self, line: &str) -> Answer {
        let mut state = self.state();
        state.received.push(line.to_string());

        if std::mem::take(&mut state.drop_next) {
            return Answer::Hangup;
        }
        if state.silent {
            return Answer::Silent;
        }

        let frame = |echo: &str, status: &str| format!("{echo}\r\n{status}\r\n{PROMPT}");

        if line == "scpi" {
            return Answer::Reply(PROMPT.to_string());
        }
        if line == "*IDN?" {
            return Answer::Reply(frame(&format!("*IDN? {}", state.identity), "OK"));
        }
        if line == "*RST" {
            let status = if state.reject_reset { "BUSY" } else { "OK" };
            return Answer::Reply(frame("*RST", status));
        }
        if let Some(keyword) = line.strip_suffix('?') {
            if state.garble_reads {
                return Answer::Reply(format!("{keyword} ???\r\nOK"));
            }
            return match state.values.get(keyword) {
                Some(value) => Answer::Reply(frame(&format!("{keyword} {value}"), "OK")),
                None => Answer::Reply(frame(keyword, "ERROR unknown keyword")),
            };
        }
        if let Some((keyword, value)) = line.split_once(' ') {
            if state.reject_writes {
                return Answer::Reply(frame(line, "ERROR value rejected"));
            }
            state.values.insert(keyword.to_string(), value.to_string());
            return Answer::Reply(frame(line, "OK"));
        }
        Answer::Reply(frame(line, "ERROR syntax"))
    }
}

enum Answer {
    Reply(String),
    Silent,
    Hangup,
}
