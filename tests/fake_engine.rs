//! Engine side of the protocol for integration tests: connects to a debugger client
//! and exchanges raw frames.

use anyhow::{anyhow, Context};
use bytes::Bytes;
use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};
use zendbg::connection::codec::{read_frame, write_frame, TransferEncoding};
use zendbg::connection::message::{Message, Wire};

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(20);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const MAX_FRAME_LEN: usize = 1024 * 1024;

pub struct FakeEngine {
    stream: TcpStream,
}

impl FakeEngine {
    pub fn new(stream: TcpStream) -> anyhow::Result<Self> {
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Connect to a listening client, retry until the listener is up.
    pub fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let deadline = Instant::now() + CONNECT_TIMEOUT;
        loop {
            match TcpStream::connect(addr) {
                Ok(stream) => return Self::new(stream),
                Err(_) if Instant::now() < deadline => thread::sleep(CONNECT_RETRY_DELAY),
                Err(e) => return Err(e).context(format!("connect to {addr}")),
            }
        }
    }

    pub fn send(&mut self, msg: impl Into<Message>) -> anyhow::Result<()> {
        let body = msg.into().encode(TransferEncoding::Utf8);
        write_frame(&mut self.stream, &body)?;
        Ok(())
    }

    /// Write arbitrary bytes, no framing.
    pub fn send_raw(&mut self, raw: &[u8]) -> anyhow::Result<()> {
        self.stream.write_all(raw)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Write a frame with an arbitrary body.
    pub fn send_frame(&mut self, body: &[u8]) -> anyhow::Result<()> {
        write_frame(&mut self.stream, body)?;
        Ok(())
    }

    pub fn recv(&mut self) -> anyhow::Result<Message> {
        let frame = self.recv_frame()?;
        Ok(Message::decode(frame, TransferEncoding::Utf8)?)
    }

    pub fn recv_frame(&mut self) -> anyhow::Result<Bytes> {
        read_frame(&mut self.stream, MAX_FRAME_LEN)?.ok_or_else(|| anyhow!("client closed the connection"))
    }

    /// Receive the next message and check its type.
    pub fn expect<T>(&mut self) -> anyhow::Result<T>
    where
        T: Wire + TryFrom<Message, Error = Message>,
    {
        let msg = self.recv()?;
        T::try_from(msg).map_err(|other| anyhow!("unexpected message: {other:?}"))
    }

    /// True if the client sends nothing during `wait`.
    pub fn is_idle(&mut self, wait: Duration) -> anyhow::Result<bool> {
        self.stream.set_read_timeout(Some(wait))?;
        let mut buf = [0u8; 1];
        let idle = matches!(
            self.stream.peek(&mut buf),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        );
        self.stream.set_read_timeout(Some(READ_TIMEOUT))?;
        Ok(idle)
    }

    /// Close both directions of the socket, as an engine does at script end.
    pub fn shutdown(&mut self) {
        _ = self.stream.shutdown(Shutdown::Both);
    }

    /// True if the client closed the socket (or there is nothing but the end of stream).
    pub fn is_closed(&mut self) -> bool {
        matches!(read_frame(&mut self.stream, MAX_FRAME_LEN), Ok(None) | Err(_))
    }
}

/// Poll `cond` until it holds or the timeout elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}
