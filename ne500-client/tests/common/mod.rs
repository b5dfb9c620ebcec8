//! In-process pump gateway for integration tests
//!
//! Listens on a loopback port, answers each `\r`-terminated command the way
//! an NE-500 network would and records every received line.

#![allow(dead_code)]

use ne500_client::ConnectionBuilder;
use ne500_core::{Address, Command, Verb};
use ne500_session::{parse_burst, parse_command, ETX, STX};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub npumps: u8,
    /// DIS polls a pump answers with its running prompt after `RUN`
    pub busy_polls: u32,
    /// Send the first reply once without its ETX before the real frame
    pub garble_first_reply: bool,
    /// Legacy firmware: replies end with CRLF instead of STX/ETX markers
    pub newline: bool,
    /// Answer `RUN` with a stall alarm
    pub alarm_on_run: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            npumps: 1,
            busy_polls: 0,
            garble_first_reply: false,
            newline: false,
            alarm_on_run: false,
        }
    }
}

#[derive(Debug, Default)]
struct SimPump {
    withdrawing: bool,
    volume: f64,
    infused: f64,
    withdrawn: f64,
    busy: u32,
}

impl SimPump {
    fn prompt(&self) -> char {
        match (self.busy, self.withdrawing) {
            (0, _) => 'S',
            (_, false) => 'I',
            (_, true) => 'W',
        }
    }
}

struct Simulator {
    options: GatewayOptions,
    pumps: HashMap<u8, SimPump>,
    garble_next: bool,
}

impl Simulator {
    fn new(options: GatewayOptions) -> Self {
        Self {
            garble_next: options.garble_first_reply,
            options,
            pumps: HashMap::new(),
        }
    }

    fn handle(&mut self, line: &str) -> String {
        if line.ends_with('*') {
            return match parse_burst(line) {
                Ok(commands) => {
                    for command in &commands {
                        if let Some(pump) = command.pump() {
                            self.apply(pump.value(), command);
                        }
                    }
                    "00S".to_string()
                }
                Err(_) => "00S?".to_string(),
            };
        }

        let command = match parse_command(line) {
            Ok(command) => command,
            Err(_) => return "00S?".to_string(),
        };
        let (label, targets): (u8, Vec<u8>) = match command.address() {
            Address::Pump(pump) => (pump.value(), vec![pump.value()]),
            Address::Broadcast => (0, (1..=self.options.npumps).collect()),
        };
        if command.verb() == Verb::Reset {
            self.pumps.clear();
            return format!("{:02}S", label);
        }

        let mut reply = String::from("S");
        for pump in targets {
            reply = self.apply(pump, &command);
        }
        format!("{:02}{}", label, reply)
    }

    fn apply(&mut self, pump: u8, command: &Command) -> String {
        let busy_polls = self.options.busy_polls;
        let alarm_on_run = self.options.alarm_on_run;
        let state = self.pumps.entry(pump).or_default();
        let param = command.param().unwrap_or_default();

        match command.verb() {
            Verb::Dis => {
                let prompt = state.prompt();
                state.busy = state.busy.saturating_sub(1);
                format!("{}I{:.3}W{:.3}ML", prompt, state.infused, state.withdrawn)
            }
            Verb::Run if alarm_on_run => "A?S".to_string(),
            Verb::Run => {
                state.busy = busy_polls;
                if state.withdrawing {
                    state.withdrawn += state.volume;
                    "W".to_string()
                } else {
                    state.infused += state.volume;
                    "I".to_string()
                }
            }
            Verb::Stp => {
                state.busy = 0;
                "S".to_string()
            }
            Verb::Dir => {
                match param {
                    "INF" => state.withdrawing = false,
                    "WDR" => state.withdrawing = true,
                    _ => state.withdrawing = !state.withdrawing,
                }
                state.prompt().to_string()
            }
            Verb::Vol => match param.parse::<f64>() {
                Ok(volume) if volume <= 100.0 => {
                    state.volume = volume;
                    state.prompt().to_string()
                }
                _ => format!("{}?OOR", state.prompt()),
            },
            Verb::Cld => {
                if param == "INF" {
                    state.infused = 0.0;
                } else {
                    state.withdrawn = 0.0;
                }
                state.prompt().to_string()
            }
            _ => state.prompt().to_string(),
        }
    }

    async fn reply(&mut self, stream: &mut TcpStream, body: &str) -> io::Result<()> {
        if self.options.newline {
            return stream.write_all(format!("{}\r\n", body).as_bytes()).await;
        }

        if self.garble_next {
            self.garble_next = false;
            let mut partial = vec![STX];
            partial.extend_from_slice(body.as_bytes());
            stream.write_all(&partial).await?;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let mut framed = vec![STX];
        framed.extend_from_slice(body.as_bytes());
        framed.push(ETX);
        stream.write_all(&framed).await
    }
}

/// A running fake gateway; stopped when dropped
pub struct FakeGateway {
    port: u16,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl FakeGateway {
    pub async fn start(options: GatewayOptions) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let log = received.clone();
        let accepted = connections.clone();
        let task = tokio::spawn(async move {
            let mut simulator = Simulator::new(options);
            while let Ok((stream, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let _ = serve(stream, &mut simulator, &log).await;
            }
        });

        Ok(Self {
            port,
            received,
            connections,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Command lines received so far, terminators stripped
    pub fn received(&self) -> Vec<String> {
        self.received.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Builder pointed at this gateway with timeouts suited to loopback
    pub fn builder(&self, npumps: u8) -> ConnectionBuilder {
        ConnectionBuilder::new()
            .tcp("127.0.0.1", self.port)
            .io_timeout(Duration::from_millis(20))
            .sleep_on_timeout(Duration::from_millis(1))
            .max_timeout_retries(25)
            .status_poll_interval(Duration::from_millis(2))
            .max_status_polls(20)
            .npumps(npumps)
    }
}

impl Drop for FakeGateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, simulator: &mut Simulator, log: &Mutex<Vec<String>>) -> io::Result<()> {
    let mut pending = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        pending.extend_from_slice(&chunk[..n]);

        while let Some(pos) = pending.iter().position(|&b| b == b'\r') {
            let raw: Vec<u8> = pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if line.is_empty() {
                continue;
            }
            if let Ok(mut lines) = log.lock() {
                lines.push(line.clone());
            }
            let body = simulator.handle(&line);
            simulator.reply(&mut stream, &body).await?;
        }
    }
}
