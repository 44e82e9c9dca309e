/*!
 * Client Connection
 *
 * Per-client state for the event loop: an input buffer fed by nonblocking
 * reads, a queue of encoded replies drained by nonblocking writes, the
 * CONNECTED -> CLOSING -> CLOSED lifecycle, and a last-activity instant
 * for idle-timeout checks. The command pump decodes as many complete
 * requests as the buffer holds and dispatches each in arrival order, so
 * replies leave in the order commands came in.
 */

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use bytes::{Buf, BytesMut};
use log::{debug, warn};
use mio::net::TcpStream;

use crate::command::Dispatcher;
use crate::protocol::{decode, Frame};

/// Bytes pulled from the socket per read call.
const READ_CHUNK: usize = 64 * 1024;

/// Cap on buffered, not-yet-parsed request bytes; a client exceeding it
/// is disconnected.
const MAX_INPUT_BUFFER: usize = 10 * 1024 * 1024;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connected,
    Closing,
    Closed,
}

pub struct Connection {
    socket: TcpStream,
    input: BytesMut,
    output: VecDeque<Vec<u8>>,
    state: State,
    last_activity: Instant,
}

impl Connection {
    pub fn new(socket: TcpStream) -> Self {
        Self {
            socket,
            input: BytesMut::with_capacity(4096),
            output: VecDeque::new(),
            state: State::Connected,
            last_activity: Instant::now(),
        }
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn is_closing(&self) -> bool {
        self.state != State::Connected
    }

    /// True when encoded replies are waiting on the socket becoming
    /// writable; the event loop subscribes to writability only then.
    #[inline]
    pub fn has_pending_writes(&self) -> bool {
        !self.output.is_empty()
    }

    /// True when the connection has been idle longer than `timeout`.
    pub fn check_timeout(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    pub(crate) fn socket_mut(&mut self) -> &mut TcpStream {
        &mut self.socket
    }

    pub(crate) fn mark_closed(&mut self) {
        self.state = State::Closed;
    }

    /// Drain the socket until it would block, then pump complete commands
    /// through the dispatcher. Peer close, read errors, an overflowing
    /// input buffer and protocol errors all move the connection to
    /// CLOSING for the event loop to reap.
    pub fn on_readable(&mut self, dispatcher: &Dispatcher) {
        if self.state != State::Connected {
            return;
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.socket.read(&mut chunk) {
                Ok(0) => {
                    debug!("peer closed connection");
                    self.state = State::Closing;
                    return;
                }
                Ok(n) => {
                    self.last_activity = Instant::now();
                    if self.input.len() + n > MAX_INPUT_BUFFER {
                        warn!("input buffer overflow, dropping client");
                        self.state = State::Closing;
                        return;
                    }
                    self.input.extend_from_slice(&chunk[..n]);
                }
                Err(ref e) if would_block(e) => break,
                Err(e) => {
                    debug!("read error: {}", e);
                    self.state = State::Closing;
                    return;
                }
            }
        }

        if let Err(e) = self.pump(dispatcher) {
            debug!("{}", e);
            self.state = State::Closing;
        }
    }

    /// Decode and dispatch every complete request currently buffered.
    fn pump(&mut self, dispatcher: &Dispatcher) -> Result<()> {
        loop {
            match decode(&self.input)? {
                None => break,
                Some((frame, consumed)) => {
                    self.input.advance(consumed);
                    let items = lift_request(frame)?;
                    let reply = dispatcher.dispatch(items);
                    self.output.push_back(reply);
                }
            }
        }
        Ok(())
    }

    /// Write queued replies until the queue drains or the socket would
    /// block. A partial send keeps the unwritten suffix at the head.
    pub fn on_writable(&mut self) {
        if self.state != State::Connected {
            return;
        }

        while let Some(front) = self.output.front_mut() {
            match self.socket.write(front) {
                Ok(0) => {
                    self.state = State::Closing;
                    return;
                }
                Ok(n) => {
                    self.last_activity = Instant::now();
                    if n == front.len() {
                        self.output.pop_front();
                    } else {
                        front.drain(..n);
                        return;
                    }
                }
                Err(ref e) if would_block(e) => return,
                Err(e) => {
                    debug!("write error: {}", e);
                    self.state = State::Closing;
                    return;
                }
            }
        }
    }
}

/// Requests must be arrays of bulk strings; anything else is a framing
/// violation that tears the connection down.
fn lift_request(frame: Frame) -> Result<Vec<Vec<u8>>> {
    let Frame::Array(items) = frame else {
        bail!("protocol error: expected request array");
    };
    if items.is_empty() {
        bail!("protocol error: empty request array");
    }
    items
        .into_iter()
        .map(|item| match item {
            Frame::Bulk(arg) => Ok(arg),
            _ => bail!("protocol error: expected bulk string argument"),
        })
        .collect()
}

/// Check if an I/O error indicates the operation would block.
#[inline]
pub(crate) fn would_block(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    )
}
