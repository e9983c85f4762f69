//! Per-script control channel
//!
//! Every managed script listens on its registered localhost port. The
//! protocol is one instruction per line; each received line is answered with
//! [`ACK_REPLY`], which is also how the operator tells a live script from a
//! stale lock. [`STOP_TOKEN`] asks the script to wind down through its
//! [`StopSignal`]; any other line is handed to the script's message handler.

use crate::error::{SlotError, SlotResult};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const STOP_TOKEN: &str = "stop$subprocess";
pub const ACK_REPLY: &str = "ACK from control server";
/// Sent by `probe`; acknowledged but not forwarded to the handler
pub const PROBE_MESSAGE: &str = "Check for server ACK";

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);
const SLEEP_GRANULARITY: Duration = Duration::from_millis(50);

/// Cooperative cancellation flag shared between the control server and the
/// script's workload.
#[derive(Clone, Default, Debug)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early once stop is triggered.
    /// Returns true if stopped.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(SLEEP_GRANULARITY.min(deadline - now));
        }
    }
}

type MessageHandler = dyn Fn(&str) + Send + Sync;

/// Background listener for one script's control port. Stops listening when
/// dropped.
pub struct ControlServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ControlServer {
    /// Bind `127.0.0.1:<port>` (0 picks a free port) and serve on a thread.
    pub fn start<F>(port: u16, stop: StopSignal, on_message: F) -> SlotResult<Self>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(("127.0.0.1", port))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let handler: Arc<MessageHandler> = Arc::new(on_message);

        let flag = shutdown.clone();
        let handle = std::thread::Builder::new()
            .name(format!("control-{}", addr.port()))
            .spawn(move || accept_loop(listener, stop, handler, flag))?;

        tracing::info!("control - Listening on {}", addr);
        Ok(Self {
            addr,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    stop: StopSignal,
    handler: Arc<MessageHandler>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let stop = stop.clone();
                let handler = handler.clone();
                let spawned = std::thread::Builder::new()
                    .name("control-client".to_string())
                    .spawn(move || {
                        if let Err(e) = serve_client(stream, &stop, handler.as_ref()) {
                            tracing::debug!("control - Client {} dropped: {}", peer, e);
                        }
                    });
                if let Err(e) = spawned {
                    tracing::error!("control - Cannot spawn client thread: {}", e);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => std::thread::sleep(ACCEPT_POLL),
            Err(e) => {
                tracing::warn!("control - Accept failed: {}", e);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn serve_client(stream: TcpStream, stop: &StopSignal, handler: &MessageHandler) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
    let mut writer = stream.try_clone()?;

    for line in BufReader::new(stream).lines() {
        let line = line?;
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        tracing::info!("control - Received: {}", message);
        writeln!(writer, "{}", ACK_REPLY)?;
        writer.flush()?;

        match message {
            STOP_TOKEN => {
                tracing::info!("control - Stop requested");
                stop.trigger();
            }
            PROBE_MESSAGE => {}
            other => handler(other),
        }
    }
    Ok(())
}

/// Send one line to `addr` and wait for the one-line reply.
pub fn send_message<A: ToSocketAddrs>(addr: A, message: &str, timeout: Duration) -> SlotResult<String> {
    let target = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| SlotError::Io(std::io::Error::new(ErrorKind::NotFound, "address did not resolve")))?;

    let mut stream = TcpStream::connect_timeout(&target, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    writeln!(stream, "{}", message)?;
    stream.flush()?;

    let mut reply = String::new();
    BufReader::new(&stream).read_line(&mut reply)?;
    if reply.is_empty() {
        return Err(SlotError::Io(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            "connection closed without reply",
        )));
    }
    Ok(reply.trim_end().to_string())
}

/// Whether a live process answers on the local control `port`.
pub fn probe(port: u16, timeout: Duration) -> bool {
    matches!(
        send_message(("127.0.0.1", port), PROBE_MESSAGE, timeout),
        Ok(reply) if reply == ACK_REPLY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[test]
    fn every_line_is_acknowledged() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let server = ControlServer::start(0, StopSignal::new(), move |m| {
            sink.lock().unwrap().push(m.to_string());
        })
        .unwrap();

        let reply = send_message(server.addr(), "hello", TIMEOUT).unwrap();
        assert_eq!(reply, ACK_REPLY);

        // Handler runs after the ACK is written
        let deadline = Instant::now() + TIMEOUT;
        while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn stop_token_triggers_signal_and_is_acknowledged() {
        let stop = StopSignal::new();
        let server = ControlServer::start(0, stop.clone(), |_| {}).unwrap();

        let reply = send_message(server.addr(), STOP_TOKEN, TIMEOUT).unwrap();
        assert_eq!(reply, ACK_REPLY);
        assert!(stop.sleep(TIMEOUT));
    }

    #[test]
    fn probe_sees_live_listener_only() {
        let server = ControlServer::start(0, StopSignal::new(), |_| {}).unwrap();
        let port = server.addr().port();
        assert!(probe(port, TIMEOUT));

        drop(server);
        assert!(!probe(port, Duration::from_millis(200)));
    }

    #[test]
    fn stop_signal_sleep_runs_full_duration_without_stop() {
        let stop = StopSignal::new();
        let start = Instant::now();
        assert!(!stop.sleep(Duration::from_millis(120)));
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn stop_signal_wakes_sleepers_early() {
        let stop = StopSignal::new();
        let trigger = stop.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.trigger();
        });
        let start = Instant::now();
        assert!(stop.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
