/*!
 * Event Loop and Acceptor
 *
 * One thread owns the listening socket, the mio poll, every connection,
 * and the dispatcher; the TTL sweeper is the only other thread and talks
 * to the engine through its mutex. Connections are registered readable,
 * gain writable interest only while replies are queued, and are closed on
 * error, protocol violation, idle timeout, or shutdown.
 */

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use hashbrown::HashMap;
use log::{debug, error, info, warn};
use mio::event::Event;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};

use crate::command::Dispatcher;
use crate::conn::{would_block, Connection};
use crate::store::StorageEngine;
use crate::sweeper::{spawn_sweeper, Sweeper};
use crate::{DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_MEMORY, DEFAULT_PORT, DEFAULT_SWEEP_INTERVAL_SECS};

const LISTENER: Token = Token(0);

// Poll wakes at least this often so the shutdown flag is observed
const POLL_TICK: Duration = Duration::from_millis(500);

/// Server settings; the caller supplies a port, a memory budget and a
/// sweep cadence, everything else has conventional defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub max_connections: usize,
    pub max_memory: usize,
    pub sweep_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_memory: DEFAULT_MAX_MEMORY,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

pub struct Server {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<usize, Connection>,
    next_token: usize,
    dispatcher: Dispatcher,
    sweeper: Option<Sweeper>,
    shutdown: Arc<AtomicBool>,
    max_connections: usize,
    idle_timeout: Duration,
}

/// Bind a nonblocking TCP listener with address reuse.
fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("failed to bind {}", addr))?;
    socket.listen(libc::SOMAXCONN)?;

    Ok(TcpListener::from_std(socket.into()))
}

impl Server {
    /// Bind the listener, build the engine and dispatcher, and start the
    /// sweeper. The server is not serving until `run` is called.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let mut listener = bind_listener(addr)?;

        let poll = Poll::new().context("failed to create poll instance")?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        let engine = Arc::new(Mutex::new(StorageEngine::new(config.max_memory)));
        let sweeper = spawn_sweeper(engine.clone(), config.sweep_interval)?;

        info!(
            "listening on {} (budget {} bytes, {} connections max)",
            listener.local_addr()?,
            config.max_memory,
            config.max_connections
        );

        Ok(Self {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: 1,
            dispatcher: Dispatcher::new(engine),
            sweeper: Some(sweeper),
            shutdown: Arc::new(AtomicBool::new(false)),
            max_connections: config.max_connections,
            idle_timeout: config.idle_timeout,
        })
    }

    /// The bound address; with port 0 this reveals the ephemeral port.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag observed by the event loop; setting it true stops the server.
    /// Signal handlers register against this same flag.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Request a graceful stop from any thread.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run the event loop until the shutdown flag is set, then close every
    /// live connection, stop the sweeper, and tear down the listener.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(1024);

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.poll.poll(&mut events, Some(POLL_TICK)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("poll failed"),
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_loop(),
                    Token(token) => self.handle_event(token, event),
                }
            }
        }

        self.teardown();
        Ok(())
    }

    /// Accept until the listener would block, enforcing the connection
    /// cap; rejected sockets are closed and accepting continues.
    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut socket, peer)) => {
                    if self.connections.len() >= self.max_connections {
                        warn!("connection limit reached, rejecting {}", peer);
                        continue;
                    }
                    socket.set_nodelay(true).ok();

                    let token = self.next_token;
                    self.next_token = self.next_token.wrapping_add(1);
                    if self.next_token == 0 {
                        self.next_token = 1; // Token 0 is the listener
                    }

                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut socket, Token(token), Interest::READABLE)
                    {
                        error!("failed to register client socket: {}", e);
                        continue;
                    }

                    debug!("accepted {} as token {}", peer, token);
                    self.connections.insert(token, Connection::new(socket));
                }
                Err(ref e) if would_block(e) => break,
                Err(e) => {
                    error!("accept error: {}", e);
                    break;
                }
            }
        }
    }

    /// Service one readiness event for a client connection.
    fn handle_event(&mut self, token: usize, event: &Event) {
        let mut close = false;

        if let Some(conn) = self.connections.get_mut(&token) {
            if event.is_error() {
                close = true;
            } else if conn.check_timeout(self.idle_timeout) {
                debug!("closing idle connection {}", token);
                close = true;
            } else {
                if event.is_readable() {
                    conn.on_readable(&self.dispatcher);
                    // Flush replies eagerly; leftovers wait for writability
                    if !conn.is_closing() && conn.has_pending_writes() {
                        conn.on_writable();
                    }
                }
                if event.is_writable() {
                    conn.on_writable();
                }

                if conn.is_closing() {
                    close = true;
                } else {
                    let interest = if conn.has_pending_writes() {
                        Interest::READABLE | Interest::WRITABLE
                    } else {
                        Interest::READABLE
                    };
                    if self
                        .poll
                        .registry()
                        .reregister(conn.socket_mut(), Token(token), interest)
                        .is_err()
                    {
                        close = true;
                    }
                }
            }
        }

        if close {
            self.close_connection(token);
        }
    }

    /// Deregister and drop one connection; the socket closes with it.
    fn close_connection(&mut self, token: usize) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(conn.socket_mut());
            conn.mark_closed();
            debug!("closed connection {}", token);
        }
    }

    fn teardown(&mut self) {
        info!("shutting down, closing {} connections", self.connections.len());
        let tokens: Vec<usize> = self.connections.keys().copied().collect();
        for token in tokens {
            self.close_connection(token);
        }
        if let Some(mut sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        let _ = self.poll.registry().deregister(&mut self.listener);
        info!("server stopped");
    }
}
