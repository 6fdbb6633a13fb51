//! Connection with a debug engine.
//!
//! Every attached socket is served by two background threads:
//! - receive thread: the only reader of the socket. Decodes frames, hands responses
//!   to the waiting callers and puts everything else into the dispatch queue;
//! - dispatch thread: executes [`EngineMessageHandler`] for queued messages one by one,
//!   so a slow handler never delays response delivery.

pub mod codec;
pub mod message;

use crate::connection::codec::TransferEncoding;
use crate::connection::message::{Message, MessageKind, Notification, Request, Tagged};
use crate::error::Error;
use log::{debug, error, info, trace, warn};
use std::collections::HashMap;
use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Application side of a connection.
///
/// All methods are called from the dispatch thread in the order in which messages were received.
/// Handlers may issue synchronous requests through the passed connection.
pub trait EngineMessageHandler: Send + Sync {
    fn handle_notification(&self, conn: &Connection, msg: Message);

    /// Handle an engine request, returned message is written back as a response.
    fn handle_request(&self, conn: &Connection, msg: Message) -> Option<Message>;

    /// Handle a response which no synchronous caller waits for (answers to async requests).
    fn handle_response(&self, _conn: &Connection, msg: Message) {
        debug!(target: "connection", "unmatched response: {msg:?}");
    }

    /// Called once after the connection is torn down and all queued messages are handled.
    fn connection_closed(&self, _conn: &Connection) {}
}

#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    pub encoding: TransferEncoding,
    /// Timeout for synchronous requests, `None` means wait until the response or disconnect.
    pub request_timeout: Option<Duration>,
    pub dispatch_queue_capacity: usize,
    pub max_frame_len: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            encoding: TransferEncoding::default(),
            request_timeout: None,
            dispatch_queue_capacity: 1024,
            max_frame_len: 64 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

enum Dispatch {
    Message(Message),
    Close,
}

/// Table of in-flight synchronous requests.
struct Pending {
    open: bool,
    next_id: i32,
    slots: HashMap<i32, SyncSender<Message>>,
}

impl Pending {
    fn allocate_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        id
    }
}

struct Inner {
    options: ConnectionOptions,
    state: Mutex<ConnectionState>,
    /// Write half, all outbound frames go through this lock.
    writer: Mutex<Option<TcpStream>>,
    /// Handle used for shutdown, never written.
    control: Mutex<Option<TcpStream>>,
    pending: Mutex<Pending>,
    dispatch: Mutex<Option<SyncSender<Dispatch>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// Connection with a single engine. Cheap to clone, all clones share the same socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    pub fn new(options: ConnectionOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                state: Mutex::new(ConnectionState::Disconnected),
                writer: Mutex::new(None),
                control: Mutex::new(None),
                pending: Mutex::new(Pending {
                    open: false,
                    next_id: 1,
                    slots: HashMap::new(),
                }),
                dispatch: Mutex::new(None),
                threads: Mutex::new(vec![]),
            }),
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Bind the connection to an accepted engine socket and start receive and dispatch threads.
    ///
    /// # Errors
    ///
    /// Return [`Error::AlreadyConnected`] if the connection already serves another socket.
    pub fn attach(
        &self,
        stream: TcpStream,
        handler: Arc<dyn EngineMessageHandler>,
    ) -> Result<(), Error> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state != ConnectionState::Disconnected {
                return Err(Error::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }

        match self.start(stream, handler) {
            Ok(()) => {
                let mut state = self.inner.state.lock().unwrap();
                // receive thread may have already seen the end of stream
                if *state == ConnectionState::Connecting {
                    *state = ConnectionState::Connected;
                }
                Ok(())
            }
            Err(e) => {
                self.teardown();
                Err(e)
            }
        }
    }

    fn start(&self, stream: TcpStream, handler: Arc<dyn EngineMessageHandler>) -> Result<(), Error> {
        // threads of a previous socket are finished or about to finish
        self.join_threads();

        let peer = stream.peer_addr().ok();
        stream.set_nodelay(true)?;
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;

        *self.inner.writer.lock().unwrap() = Some(stream);
        *self.inner.control.lock().unwrap() = Some(control);
        {
            let mut pending = self.inner.pending.lock().unwrap();
            pending.open = true;
            pending.slots.clear();
        }

        let (tx, rx) = mpsc::sync_channel(self.inner.options.dispatch_queue_capacity);
        *self.inner.dispatch.lock().unwrap() = Some(tx.clone());

        let receiver = thread::Builder::new().name("zend-receive".into()).spawn({
            let conn = self.clone();
            move || conn.receive_loop(reader, tx)
        })?;
        let dispatcher = thread::Builder::new().name("zend-dispatch".into()).spawn({
            let conn = self.clone();
            move || conn.dispatch_loop(rx, handler)
        });

        let mut threads = self.inner.threads.lock().unwrap();
        threads.push(receiver);
        threads.push(dispatcher?);

        match peer {
            Some(peer) => info!(target: "connection", "engine connected: {peer}"),
            None => info!(target: "connection", "engine connected"),
        }
        Ok(())
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// [`Error::NoResponse`] if the connection was torn down before the response arrived,
    /// [`Error::Timeout`] if the configured request timeout elapsed.
    pub fn send_request<R: Request>(&self, mut request: R) -> Result<R::Response, Error> {
        let (tx, rx) = mpsc::sync_channel(1);
        let id = {
            let mut pending = self.inner.pending.lock().unwrap();
            if !pending.open {
                return Err(Error::NotConnected);
            }
            let id = pending.allocate_id();
            pending.slots.insert(id, tx);
            id
        };
        request.set_id(id);

        if let Err(e) = self.write(&request.into()) {
            self.inner.pending.lock().unwrap().slots.remove(&id);
            return Err(e);
        }

        let response = match self.inner.options.request_timeout {
            None => rx.recv().map_err(|_| Error::NoResponse { id })?,
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(response) => response,
                Err(RecvTimeoutError::Disconnected) => return Err(Error::NoResponse { id }),
                Err(RecvTimeoutError::Timeout) => {
                    self.inner.pending.lock().unwrap().slots.remove(&id);
                    return Err(Error::Timeout {
                        id,
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
            },
        };

        R::Response::try_from(response).map_err(|got| Error::UnexpectedResponse {
            request: id,
            expect: R::Response::TYPE,
            got: got.message_type(),
        })
    }

    /// Send a request without waiting. The response is passed to
    /// [`EngineMessageHandler::handle_response`]. Return assigned request id.
    pub fn send_request_async<R: Request>(&self, mut request: R) -> Result<i32, Error> {
        let id = {
            let mut pending = self.inner.pending.lock().unwrap();
            if !pending.open {
                return Err(Error::NotConnected);
            }
            pending.allocate_id()
        };
        request.set_id(id);
        self.write(&request.into())?;
        Ok(id)
    }

    pub fn send_notification<N: Notification>(&self, notification: N) -> Result<(), Error> {
        self.write(&notification.into())
    }

    /// Serialize and write a single frame. Writers never interleave.
    fn write(&self, msg: &Message) -> Result<(), Error> {
        let body = msg.encode(self.inner.options.encoding);
        let mut writer = self.inner.writer.lock().unwrap();
        let stream = writer.as_mut().ok_or(Error::NotConnected)?;
        trace!(target: "connection", "-> {msg:?}");
        codec::write_frame(stream, &body)
    }

    fn take_slot(&self, id: Option<i32>) -> Option<SyncSender<Message>> {
        let id = id?;
        self.inner.pending.lock().unwrap().slots.remove(&id)
    }

    fn receive_loop(self, reader: TcpStream, queue: SyncSender<Dispatch>) {
        let options = &self.inner.options;
        let mut reader = BufReader::new(reader);

        let reason = loop {
            let frame = match codec::read_frame(&mut reader, options.max_frame_len) {
                Ok(Some(frame)) => frame,
                Ok(None) => break None,
                Err(e) => break Some(e),
            };

            let msg = match Message::decode(frame, options.encoding) {
                Ok(msg) => msg,
                Err(e) if e.is_fatal() => break Some(e),
                Err(e) => {
                    warn!(target: "connection", "skip malformed message: {e}");
                    continue;
                }
            };
            trace!(target: "connection", "<- {msg:?}");

            if msg.kind() == MessageKind::Response {
                if let Some(slot) = self.take_slot(msg.id()) {
                    _ = slot.send(msg);
                    continue;
                }
            }

            // a stalled handler must not stop responses from reaching their callers
            match queue.try_send(Dispatch::Message(msg)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    break Some(Error::DispatchOverflow(options.dispatch_queue_capacity));
                }
                Err(TrySendError::Disconnected(_)) => break None,
            }
        };

        match reason {
            None => info!(target: "connection", "engine closed the connection"),
            Some(Error::NegativeFrameLength(len)) => error!(
                target: "connection",
                "negative frame length {len}, check that SSL encryption is configured the same way on both sides"
            ),
            Some(e) if e.is_disconnect() => info!(target: "connection", "engine disconnected: {e}"),
            Some(e) => error!(target: "connection", "connection aborted: {e}"),
        }

        drop(queue);
        self.teardown();
    }

    fn dispatch_loop(self, queue: Receiver<Dispatch>, handler: Arc<dyn EngineMessageHandler>) {
        while let Ok(Dispatch::Message(msg)) = queue.recv() {
            match msg.kind() {
                MessageKind::Notification => handler.handle_notification(&self, msg),
                MessageKind::Request => {
                    let ty = msg.message_type();
                    let id = msg.id();
                    match handler.handle_request(&self, msg) {
                        Some(response) => {
                            if let Err(e) = self.write(&response) {
                                warn!(target: "connection", "write response to {ty} ({id:?}): {e}");
                            }
                        }
                        None => warn!(target: "connection", "engine request {ty} ({id:?}) left unanswered"),
                    }
                }
                MessageKind::Response => handler.handle_response(&self, msg),
            }
        }
        handler.connection_closed(&self);
    }

    /// Close the socket and release every waiting caller. Return `false` if already closed.
    fn teardown(&self) -> bool {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state == ConnectionState::Disconnected {
                return false;
            }
            *state = ConnectionState::Disconnected;
        }

        if let Some(control) = self.inner.control.lock().unwrap().take() {
            // socket may be already broken
            _ = control.shutdown(Shutdown::Both);
        }
        {
            let mut pending = self.inner.pending.lock().unwrap();
            pending.open = false;
            // dropping the slots wakes every waiting caller
            pending.slots.clear();
        }
        if let Some(queue) = self.inner.dispatch.lock().unwrap().take() {
            _ = queue.try_send(Dispatch::Close);
        }
        self.inner.writer.lock().unwrap().take();

        debug!(target: "connection", "connection torn down");
        true
    }

    fn join_threads(&self) {
        let threads = {
            let mut threads = self.inner.threads.lock().unwrap();
            let current = thread::current().id();
            // called from a handler: keep the handles, the next `start` joins them
            if threads.iter().any(|h| h.thread().id() == current) {
                return;
            }
            std::mem::take(&mut *threads)
        };
        for handle in threads {
            _ = handle.join();
        }
    }

    /// Tear down the connection. Idempotent, may be called from a handler.
    pub fn disconnect(&self) {
        if self.teardown() {
            info!(target: "connection", "disconnected from engine");
        }
        self.join_threads();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_request_ids() {
        let mut pending = Pending {
            open: true,
            next_id: 1,
            slots: HashMap::new(),
        };
        assert_eq!(pending.allocate_id(), 1);
        assert_eq!(pending.allocate_id(), 2);

        pending.next_id = i32::MAX;
        assert_eq!(pending.allocate_id(), i32::MAX);
        assert_eq!(pending.allocate_id(), 1);
    }

    #[test]
    fn test_not_connected() {
        let conn = Connection::new(ConnectionOptions::default());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(
            conn.send_request(message::GoRequest::new()),
            Err(Error::NotConnected)
        ));
        assert!(matches!(
            conn.send_notification(message::CloseSessionNotification),
            Err(Error::NotConnected)
        ));
        // disconnect of a never connected connection is a no-op
        conn.disconnect();
        conn.disconnect();
    }
}
