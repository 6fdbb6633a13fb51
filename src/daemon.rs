//! Listening daemon: accepts engine connections on the debug port.

use crate::error::Error;
use crate::settings::Settings;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AcceptMode {
    /// Stop listening after the first accepted connection.
    Single,
    /// Accept engine connections one after another until stopped.
    #[default]
    Repeat,
}

/// Receives every accepted engine socket. Called from the listener thread.
pub type Acceptor = Arc<dyn Fn(TcpStream) + Send + Sync>;

struct Listener {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    /// Disconnected when the listener thread exits.
    done: Receiver<()>,
    handle: JoinHandle<()>,
}

pub struct Daemon {
    host: String,
    port: u16,
    mode: AcceptMode,
    poll_interval: Duration,
    stop_timeout: Duration,
    use_ssl: bool,
    acceptor: Acceptor,
    listener: Mutex<Option<Listener>>,
}

impl Daemon {
    pub fn new(settings: &Settings, acceptor: Acceptor) -> Self {
        Self {
            host: settings.client_host_ip.clone(),
            port: settings.debug_port,
            mode: settings.accept_mode,
            poll_interval: Duration::from_millis(settings.accept_poll_ms.max(1)),
            stop_timeout: Duration::from_millis(settings.stop_timeout_ms),
            use_ssl: settings.use_ssl_encryption,
            acceptor,
            listener: Mutex::new(None),
        }
    }

    /// Bind the server socket and start the listener thread. Return the bound address.
    ///
    /// # Errors
    ///
    /// [`Error::BindConflict`] if the port is used by someone else,
    /// [`Error::AlreadyListening`] if this daemon already listens.
    pub fn start_listen(&self) -> Result<SocketAddr, Error> {
        let mut guard = self.listener.lock().unwrap();
        if let Some(listener) = guard.as_ref() {
            if !listener.handle.is_finished() {
                return Err(Error::AlreadyListening(listener.addr));
            }
        }
        if let Some(finished) = guard.take() {
            _ = finished.handle.join();
        }

        if self.use_ssl {
            warn!(target: "daemon", "SSL encryption is not supported, listening for plain connections");
        }

        let socket = TcpListener::bind((self.host.as_str(), self.port)).map_err(|e| {
            if e.kind() == ErrorKind::AddrInUse {
                Error::BindConflict { port: self.port }
            } else {
                Error::IO(e)
            }
        })?;
        socket.set_nonblocking(true)?;
        let addr = socket.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = mpsc::channel::<()>();
        let handle = thread::Builder::new().name("zend-daemon".into()).spawn({
            let stop = stop.clone();
            let acceptor = self.acceptor.clone();
            let mode = self.mode;
            let poll_interval = self.poll_interval;
            move || {
                accept_loop(socket, &stop, acceptor, mode, poll_interval);
                drop(done_tx);
            }
        })?;

        info!(target: "daemon", "listening for engine connections on {addr}");
        *guard = Some(Listener {
            addr,
            stop,
            done,
            handle,
        });
        Ok(addr)
    }

    /// Stop the listener thread. Idempotent, waits at most the configured stop timeout.
    pub fn stop_listen(&self) {
        let Some(listener) = self.listener.lock().unwrap().take() else {
            return;
        };
        listener.stop.store(true, Ordering::Release);

        match listener.done.recv_timeout(self.stop_timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(target: "daemon", "listener on {} does not stop, detach it", listener.addr);
            }
            _ => {
                _ = listener.handle.join();
                info!(target: "daemon", "stop listening on {}", listener.addr);
            }
        }
    }

    /// Stop the current listener (if any) and bind a new server socket.
    pub fn reset_socket(&self) -> Result<SocketAddr, Error> {
        self.stop_listen();
        self.start_listen()
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap()
            .as_ref()
            .map(|l| !l.handle.is_finished())
            .unwrap_or_default()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().unwrap().as_ref().map(|l| l.addr)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.stop_listen();
    }
}

fn accept_loop(
    socket: TcpListener,
    stop: &AtomicBool,
    acceptor: Acceptor,
    mode: AcceptMode,
    poll_interval: Duration,
) {
    while !stop.load(Ordering::Acquire) {
        match socket.accept() {
            Ok((stream, peer)) => {
                debug!(target: "daemon", "accept connection from {peer}");
                if let Err(e) = stream.set_nonblocking(false) {
                    warn!(target: "daemon", "drop connection from {peer}: {e}");
                    continue;
                }
                acceptor(stream);
                if mode == AcceptMode::Single {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(poll_interval),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                error!(target: "daemon", "accept failed: {e}");
                break;
            }
        }
    }
}
