// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Single-session TCP transport on `mio`.
//!
//! ```text
//! connect() --> worker thread: Poll { listener | outbound connect, Waker }
//!                   |  non-blocking handshake: Hello -> HelloAck
//!                   v
//!               Session { stream, own Poll } <-- update(): poll(0), read frames,
//!                                                keep-alive, flush, idle check
//! ```
//!
//! The worker only establishes sessions and sleeps in `Poll::poll` until a
//! socket or the waker fires. All session I/O after the handshake happens in
//! `send()` and `update()`, under the session lock; callbacks run after the
//! lock is released. While a session is up the server refuses further
//! connections.

use super::config::{TcpConfig, TcpRole};
use super::frame_codec::FrameCodec;
use super::wire::{ApiIdentity, Frame};
use crate::api::MessagerApi;
use crate::config::ConfigError;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::transport::{ConnectionStateListener, Inbound, ReceivedListener, Transport};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// ============================================================================
// Constants
// ============================================================================

/// Listener token in the worker poll.
const LISTENER: Token = Token(0);

/// Waker token in the worker poll (disconnect requests).
const WAKER: Token = Token(1);

/// First token handed to a connection under handshake.
const FIRST_HANDSHAKE: usize = 2;

/// Sole token in a session poll.
const SESSION: Token = Token(0);

const MAX_EVENTS: usize = 64;

// ============================================================================
// Statistics
// ============================================================================

/// Point-in-time transport counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpStats {
    pub sessions: u64,
    pub frames_sent: u64,
    /// Frames decoded, handshake frames included.
    pub frames_received: u64,
    /// Inbound frames over `max_message_size`; each one ends its session.
    pub frames_rejected: u64,
    pub keepalives_sent: u64,
    pub handshake_failures: u64,
    /// Connections the server turned away because a session was up.
    pub connections_refused: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sessions: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    frames_rejected: AtomicU64,
    keepalives_sent: AtomicU64,
    handshake_failures: AtomicU64,
    connections_refused: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold the frame counts of a codec that is going away.
    fn retire(&self, codec: &FrameCodec) {
        self.frames_received
            .fetch_add(codec.frames_decoded(), Ordering::Relaxed);
        self.frames_rejected
            .fetch_add(codec.frames_rejected(), Ordering::Relaxed);
    }

    fn snapshot(&self) -> TcpStats {
        TcpStats {
            sessions: self.sessions.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            keepalives_sent: self.keepalives_sent.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            connections_refused: self.connections_refused.load(Ordering::Relaxed),
        }
    }
}

/// Write as much of `outgoing` as the socket accepts.
fn write_pending(stream: &mut TcpStream, outgoing: &mut Vec<u8>) -> io::Result<()> {
    while !outgoing.is_empty() {
        match stream.write(outgoing) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped reading",
                ))
            }
            Ok(n) => {
                outgoing.drain(..n);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn to_inbound(body: &[u8]) -> Inbound {
    match Frame::decode(body) {
        Ok(Frame::Message { topic, body }) => Inbound::Encoded { topic, bytes: body },
        Ok(other) => Inbound::Control { kind: other.kind() },
        Err(e) => {
            log::debug!("[tcp] undecodable frame: {}", e);
            Inbound::Control { kind: "malformed" }
        }
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// A connection between accept/connect and session install.
struct Handshake {
    stream: TcpStream,
    peer: SocketAddr,
    codec: FrameCodec,
    outgoing: Vec<u8>,
    deadline: Instant,
    /// Outbound connects start `false` until the socket reports a peer.
    connected: bool,
}

enum Progress {
    Pending,
    Done,
}

impl Handshake {
    fn new(stream: TcpStream, peer: SocketAddr, config: &TcpConfig, connected: bool) -> Self {
        Self {
            stream,
            peer,
            codec: FrameCodec::new(config.max_message_size),
            outgoing: Vec::new(),
            deadline: Instant::now() + config.connect_timeout,
            connected,
        }
    }

    fn queue(&mut self, frame: &Frame) {
        FrameCodec::encode_into(&frame.encode(), &mut self.outgoing);
    }
}

// ============================================================================
// Session
// ============================================================================

struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    poll: Poll,
    events: Events,
    codec: FrameCodec,
    outgoing: Vec<u8>,
    /// Edge-triggered readiness not yet drained to `WouldBlock`.
    readable: bool,
    last_rx: Instant,
    last_tx: Instant,
}

impl Session {
    fn open(handshake: Handshake) -> io::Result<Self> {
        let Handshake {
            mut stream,
            peer,
            codec,
            outgoing,
            ..
        } = handshake;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut stream, SESSION, Interest::READABLE | Interest::WRITABLE)?;

        let now = Instant::now();
        Ok(Self {
            stream,
            peer,
            poll,
            events: Events::with_capacity(MAX_EVENTS),
            codec,
            outgoing,
            readable: true,
            last_rx: now,
            last_tx: now,
        })
    }

    fn queue(&mut self, frame: &Frame) {
        FrameCodec::encode_into(&frame.encode(), &mut self.outgoing);
        self.last_tx = Instant::now();
    }

    fn flush(&mut self) -> io::Result<()> {
        write_pending(&mut self.stream, &mut self.outgoing)
    }

    /// Collect readiness without blocking.
    fn poll_ready(&mut self) -> io::Result<()> {
        match self.poll.poll(&mut self.events, Some(Duration::ZERO)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }
        if self
            .events
            .iter()
            .any(|event| event.is_readable() || event.is_read_closed() || event.is_error())
        {
            self.readable = true;
        }
        Ok(())
    }

    fn close(mut self) {
        let _ = self.flush();
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

// ============================================================================
// Shared state
// ============================================================================

struct Shared {
    api: Arc<MessagerApi>,
    identity: ApiIdentity,
    config: TcpConfig,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Option<SocketAddr>,
    wanted: AtomicBool,
    connected: AtomicBool,
    waker: Mutex<Option<Waker>>,
    session: Mutex<Option<Session>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    received: Mutex<Option<ReceivedListener>>,
    state_listeners: Mutex<Vec<ConnectionStateListener>>,
    counters: Counters,
}

impl Shared {
    fn is_wanted(&self) -> bool {
        self.wanted.load(Ordering::Acquire)
    }

    fn notify(&self, connected: bool) {
        let listeners: Vec<_> = self.state_listeners.lock().clone();
        for listener in listeners {
            listener(connected);
        }
    }

    fn wait(&self, poll: &mut Poll, events: &mut Events, timeout: Option<Duration>) -> bool {
        match poll.poll(events, timeout) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => true,
            Err(e) => {
                log::error!("[tcp] poll failed, worker stops: {}", e);
                false
            }
        }
    }

    /// Drive one handshake as far as the socket allows.
    fn advance(&self, handshake: &mut Handshake) -> Result<Progress> {
        if !handshake.connected {
            if let Some(e) = handshake.stream.take_error()? {
                return Err(e.into());
            }
            match handshake.stream.peer_addr() {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => return Ok(Progress::Pending),
                Err(e) => return Err(e.into()),
            }
            handshake.connected = true;
            handshake.stream.set_nodelay(self.config.nodelay)?;
            handshake.queue(&Frame::Hello(self.identity.clone()));
        }

        write_pending(&mut handshake.stream, &mut handshake.outgoing)?;
        let Some(body) = handshake.codec.decode(&mut handshake.stream)? else {
            return Ok(Progress::Pending);
        };

        match (self.config.role, Frame::decode(&body)?) {
            (TcpRole::Server, Frame::Hello(peer)) => {
                // Answer before checking so the client can report the exact mismatch.
                handshake.queue(&Frame::HelloAck(self.identity.clone()));
                write_pending(&mut handshake.stream, &mut handshake.outgoing)?;
                self.identity.check_peer(&peer)?;
            }
            (TcpRole::Client, Frame::HelloAck(peer)) => self.identity.check_peer(&peer)?,
            (_, other) => {
                return Err(Error::Handshake(format!(
                    "unexpected {} frame during handshake",
                    other.kind()
                )))
            }
        }
        Ok(Progress::Done)
    }

    fn abandon(&self, registry: &Registry, mut handshake: Handshake) {
        let _ = registry.deregister(&mut handshake.stream);
        let _ = handshake.stream.shutdown(Shutdown::Both);
        self.counters.retire(&handshake.codec);
    }

    fn install(&self, registry: &Registry, mut handshake: Handshake) {
        let _ = registry.deregister(&mut handshake.stream);
        let peer = handshake.peer;
        let session = match Session::open(handshake) {
            Ok(session) => session,
            Err(e) => {
                log::warn!("[tcp] cannot open session with {}: {}", peer, e);
                return;
            }
        };

        {
            let mut slot = self.session.lock();
            if !self.is_wanted() || slot.is_some() {
                drop(slot);
                self.retire(session);
                return;
            }
            *slot = Some(session);
            self.connected.store(true, Ordering::Release);
        }

        Counters::bump(&self.counters.sessions);
        log::info!(
            "[tcp] session with {} established (API '{}')",
            peer,
            self.identity.name
        );
        self.notify(true);
    }

    fn retire(&self, session: Session) {
        self.counters.retire(&session.codec);
        session.close();
    }

    fn timed_out(&self, handshake: &Handshake) -> Error {
        Error::Transport(format!(
            "handshake with {} not completed within {:?}",
            handshake.peer, self.config.connect_timeout
        ))
    }

    // === Server ===

    fn accept_all(
        &self,
        registry: &Registry,
        listener: &TcpListener,
        pending: &mut HashMap<Token, Handshake>,
        next_token: &mut usize,
    ) {
        loop {
            match listener.accept() {
                Ok((mut stream, peer)) => {
                    if self.session.lock().is_some() {
                        Counters::bump(&self.counters.connections_refused);
                        log::warn!("[tcp] refusing {}: a session is already up", peer);
                        let _ = stream.shutdown(Shutdown::Both);
                        continue;
                    }

                    let token = Token(*next_token);
                    *next_token += 1;
                    if let Err(e) =
                        registry.register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)
                    {
                        log::warn!("[tcp] cannot register {}: {}", peer, e);
                        continue;
                    }
                    if let Err(e) = stream.set_nodelay(self.config.nodelay) {
                        log::debug!("[tcp] nodelay on {}: {}", peer, e);
                    }
                    log::debug!("[tcp] accepted {}, awaiting hello", peer);
                    pending.insert(token, Handshake::new(stream, peer, &self.config, true));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::warn!("[tcp] accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn server_handshake_failed(&self, registry: &Registry, handshake: Handshake, error: &Error) {
        if matches!(error, Error::Handshake(_)) {
            Counters::bump(&self.counters.handshake_failures);
            log::error!("[tcp] handshake with {} failed: {}", handshake.peer, error);
        } else {
            log::debug!("[tcp] dropping {}: {}", handshake.peer, error);
        }
        self.abandon(registry, handshake);
    }

    fn run_server(&self, poll: &mut Poll, listener: &TcpListener) {
        let mut events = Events::with_capacity(MAX_EVENTS);
        let mut pending: HashMap<Token, Handshake> = HashMap::new();
        let mut next_token = FIRST_HANDSHAKE;
        log::debug!("[tcp] accept loop started");

        while self.is_wanted() {
            let timeout = pending
                .values()
                .map(|handshake| handshake.deadline)
                .min()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()));
            if !self.wait(poll, &mut events, timeout) {
                break;
            }

            for event in events.iter() {
                match event.token() {
                    WAKER => {}
                    LISTENER => {
                        self.accept_all(poll.registry(), listener, &mut pending, &mut next_token)
                    }
                    token => {
                        let Some(mut handshake) = pending.remove(&token) else {
                            continue;
                        };
                        match self.advance(&mut handshake) {
                            Ok(Progress::Pending) => {
                                pending.insert(token, handshake);
                            }
                            Ok(Progress::Done) => self.install(poll.registry(), handshake),
                            Err(e) => self.server_handshake_failed(poll.registry(), handshake, &e),
                        }
                    }
                }
            }

            let now = Instant::now();
            let expired: Vec<Token> = pending
                .iter()
                .filter(|(_, handshake)| handshake.deadline <= now)
                .map(|(token, _)| *token)
                .collect();
            for token in expired {
                if let Some(handshake) = pending.remove(&token) {
                    let error = self.timed_out(&handshake);
                    self.server_handshake_failed(poll.registry(), handshake, &error);
                }
            }
        }

        for (_, handshake) in pending.drain() {
            self.abandon(poll.registry(), handshake);
        }
        log::debug!("[tcp] accept loop stopped");
    }

    // === Client ===

    fn start_connect(&self, registry: &Registry) -> Result<Handshake> {
        let addr = (self.config.address.as_str(), self.config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                Error::Transport(format!(
                    "{}:{} did not resolve",
                    self.config.address, self.config.port
                ))
            })?;
        let mut stream = TcpStream::connect(addr)?;
        registry.register(
            &mut stream,
            Token(FIRST_HANDSHAKE),
            Interest::READABLE | Interest::WRITABLE,
        )?;
        Ok(Handshake::new(stream, addr, &self.config, false))
    }

    /// `false` when the client should stop trying.
    fn attempt_failed(&self, attempt: u32, error: &Error) -> bool {
        if let Error::Handshake(_) = error {
            Counters::bump(&self.counters.handshake_failures);
            log::error!("[tcp] {}; not retrying", error);
            return false;
        }
        log::debug!(
            "[tcp] connect attempt {} to {}:{} failed: {}",
            attempt,
            self.config.address,
            self.config.port,
            error
        );
        let max = self.config.max_connect_attempts;
        if max != 0 && attempt >= max {
            log::error!(
                "[tcp] giving up on {}:{} after {} attempts",
                self.config.address,
                self.config.port,
                attempt
            );
            return false;
        }
        true
    }

    fn run_client(&self, poll: &mut Poll) {
        let mut events = Events::with_capacity(MAX_EVENTS);
        let mut attempt: u32 = 0;
        let mut pending: Option<Handshake> = None;
        let mut retry_at = Instant::now();

        while self.is_wanted() {
            if pending.is_none() && Instant::now() >= retry_at {
                attempt = attempt.saturating_add(1);
                match self.start_connect(poll.registry()) {
                    Ok(handshake) => pending = Some(handshake),
                    Err(e) => {
                        if !self.attempt_failed(attempt, &e) {
                            return;
                        }
                        retry_at = Instant::now() + self.config.reconnect_delay;
                    }
                }
            }

            let wake_at = pending.as_ref().map_or(retry_at, |handshake| handshake.deadline);
            let timeout = wake_at.saturating_duration_since(Instant::now());
            if !self.wait(poll, &mut events, Some(timeout)) {
                break;
            }

            let Some(mut handshake) = pending.take() else {
                continue;
            };
            let ready = events
                .iter()
                .any(|event| event.token() == Token(FIRST_HANDSHAKE));
            let progress = if ready {
                self.advance(&mut handshake)
            } else {
                Ok(Progress::Pending)
            };
            let progress = match progress {
                Ok(Progress::Pending) if Instant::now() >= handshake.deadline => {
                    Err(self.timed_out(&handshake))
                }
                other => other,
            };

            match progress {
                Ok(Progress::Pending) => pending = Some(handshake),
                Ok(Progress::Done) => {
                    self.install(poll.registry(), handshake);
                    return;
                }
                Err(e) => {
                    self.abandon(poll.registry(), handshake);
                    if !self.attempt_failed(attempt, &e) {
                        return;
                    }
                    retry_at = Instant::now() + self.config.reconnect_delay;
                }
            }
        }

        if let Some(handshake) = pending {
            self.abandon(poll.registry(), handshake);
        }
    }

    // === Session I/O ===

    /// Drive one session: drain readable frames, emit keep-alive, flush, check idleness.
    fn pump(
        &self,
        session: &mut Session,
        inbound: &mut Vec<Inbound>,
    ) -> std::result::Result<(), String> {
        session
            .poll_ready()
            .map_err(|e| format!("poll on session with {} failed: {}", session.peer, e))?;

        while session.readable {
            match session.codec.decode(&mut session.stream) {
                Ok(Some(body)) => {
                    session.last_rx = Instant::now();
                    inbound.push(to_inbound(&body));
                }
                Ok(None) => session.readable = false,
                Err(e) => return Err(format!("read from {} failed: {}", session.peer, e)),
            }
        }

        let keepalive = self.config.keepalive_interval;
        if !keepalive.is_zero() && session.last_tx.elapsed() >= keepalive {
            session.queue(&Frame::KeepAlive);
            Counters::bump(&self.counters.keepalives_sent);
        }

        session
            .flush()
            .map_err(|e| format!("write to {} failed: {}", session.peer, e))?;

        let timeout = self.config.timeout;
        if !timeout.is_zero() && session.last_rx.elapsed() > timeout {
            return Err(format!("no traffic from {} for {:?}", session.peer, timeout));
        }
        Ok(())
    }

    /// Hand inbound objects to the received listener; the first error is returned
    /// after the whole batch has been offered.
    fn deliver(&self, inbound: Vec<Inbound>) -> Result<()> {
        if inbound.is_empty() {
            return Ok(());
        }
        let Some(listener) = self.received.lock().clone() else {
            log::debug!("[tcp] no received listener, dropping {} objects", inbound.len());
            return Ok(());
        };

        let mut first_error = None;
        for item in inbound {
            if let Err(e) = listener(item) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn session_lost(&self, reason: &str, was_connected: bool) {
        if was_connected {
            log::warn!("[tcp] session lost: {}", reason);
            self.notify(false);
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// TCP transport carrying one session at a time.
pub struct TcpTransport {
    shared: Arc<Shared>,
}

impl TcpTransport {
    /// Server endpoint. The listener is bound immediately, so `local_addr()`
    /// is known before `connect()`.
    pub fn server(api: Arc<MessagerApi>, config: TcpConfig) -> Result<Self> {
        if config.role != TcpRole::Server {
            return Err(Error::InvalidState("server transport needs TcpRole::Server".into()));
        }
        Self::new(api, config)
    }

    /// Client endpoint. Nothing touches the network before `connect()`.
    pub fn client(api: Arc<MessagerApi>, config: TcpConfig) -> Result<Self> {
        if config.role != TcpRole::Client {
            return Err(Error::InvalidState("client transport needs TcpRole::Client".into()));
        }
        Self::new(api, config)
    }

    /// Endpoint for whichever role `config` names.
    pub fn new(api: Arc<MessagerApi>, config: TcpConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|msg| ConfigError::Invalid(msg.to_string()))?;

        let (listener, local_addr) = match config.role {
            TcpRole::Server => {
                let bound = std::net::TcpListener::bind((config.address.as_str(), config.port))?;
                bound.set_nonblocking(true)?;
                let local = bound.local_addr()?;
                log::info!("[tcp] listening on {}", local);
                (Some(TcpListener::from_std(bound)), Some(local))
            }
            TcpRole::Client => (None, None),
        };

        Ok(Self {
            shared: Arc::new(Shared {
                identity: ApiIdentity::of(&api),
                api,
                config,
                listener: Mutex::new(listener),
                local_addr,
                wanted: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                waker: Mutex::new(None),
                session: Mutex::new(None),
                worker: Mutex::new(None),
                received: Mutex::new(None),
                state_listeners: Mutex::new(Vec::new()),
                counters: Counters::default(),
            }),
        })
    }

    pub fn role(&self) -> TcpRole {
        self.shared.config.role
    }

    /// Bound listen address (server only).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.local_addr
    }

    /// Address of the current peer, if a session is up.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.shared.session.lock().as_ref().map(|session| session.peer)
    }

    pub fn stats(&self) -> TcpStats {
        let mut stats = self.shared.counters.snapshot();
        if let Some(session) = self.shared.session.lock().as_ref() {
            stats.frames_received += session.codec.frames_decoded();
            stats.frames_rejected += session.codec.frames_rejected();
        }
        stats
    }

    fn spawn_worker(&self) -> Result<JoinHandle<()>> {
        let mut poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        let listener = match self.shared.config.role {
            TcpRole::Server => {
                let mut listener = self.shared.listener.lock().take().ok_or_else(|| {
                    Error::InvalidState("listener still owned by a previous worker".into())
                })?;
                if let Err(e) =
                    poll.registry()
                        .register(&mut listener, LISTENER, Interest::READABLE)
                {
                    *self.shared.listener.lock() = Some(listener);
                    return Err(e.into());
                }
                Some(listener)
            }
            TcpRole::Client => None,
        };

        let role = self.shared.config.role;
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("messager-tcp-{}", role.as_str()))
            .spawn(move || match listener {
                Some(mut listener) => {
                    shared.run_server(&mut poll, &listener);
                    let _ = poll.registry().deregister(&mut listener);
                    *shared.listener.lock() = Some(listener);
                }
                None => shared.run_client(&mut poll),
            })?;

        *self.shared.waker.lock() = Some(waker);
        Ok(spawned)
    }
}

impl Transport for TcpTransport {
    fn connect(&self) -> Result<()> {
        if self.shared.wanted.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match self.spawn_worker() {
            Ok(handle) => {
                *self.shared.worker.lock() = Some(handle);
                log::debug!("[tcp] {} connecting", self.role().as_str());
                Ok(())
            }
            Err(e) => {
                self.shared.wanted.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn disconnect(&self) -> Result<()> {
        self.shared.wanted.store(false, Ordering::Release);

        // Kept alive until the worker is joined so the wake-up is not lost.
        let waker = self.shared.waker.lock().take();
        if let Some(waker) = waker.as_ref() {
            if let Err(e) = waker.wake() {
                log::warn!("[tcp] cannot wake worker: {}", e);
            }
        }

        let (session, was_connected) = {
            let mut session = self.shared.session.lock();
            (session.take(), self.shared.connected.swap(false, Ordering::AcqRel))
        };
        if let Some(session) = session {
            self.shared.retire(session);
        }

        let worker = self.shared.worker.lock().take();
        if let Some(handle) = worker {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("[tcp] worker thread panicked");
            }
        }
        drop(waker);

        if was_connected {
            log::info!("[tcp] disconnected");
            self.shared.notify(false);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn send(&self, message: &Message) -> Result<()> {
        let topic = message.topic_id();
        let descriptor = self
            .shared
            .api
            .find_topic(topic)
            .ok_or(Error::UnknownTopic { id: topic })?;
        let frame = Frame::Message {
            topic,
            body: descriptor.encode(message.payload())?,
        };
        if frame.encode().len() > self.shared.config.max_message_size {
            return Err(Error::Codec(format!(
                "message for topic '{}' exceeds {} bytes",
                descriptor.name(),
                self.shared.config.max_message_size
            )));
        }

        let failure = {
            let mut guard = self.shared.session.lock();
            let session = guard
                .as_mut()
                .ok_or_else(|| Error::Transport("no TCP session".to_string()))?;
            session.queue(&frame);
            match session.flush() {
                Ok(()) => None,
                Err(e) => {
                    if let Some(broken) = guard.take() {
                        self.shared.retire(broken);
                    }
                    Some((e, self.shared.connected.swap(false, Ordering::AcqRel)))
                }
            }
        };

        match failure {
            None => {
                Counters::bump(&self.shared.counters.frames_sent);
                Ok(())
            }
            Some((e, was_connected)) => {
                self.shared.session_lost(&e.to_string(), was_connected);
                Err(e.into())
            }
        }
    }

    fn set_received_listener(&self, listener: ReceivedListener) {
        *self.shared.received.lock() = Some(listener);
    }

    fn add_connection_state_listener(&self, listener: ConnectionStateListener) {
        self.shared.state_listeners.lock().push(listener);
    }

    fn update(&self) -> Result<()> {
        let shared = &self.shared;
        let mut inbound = Vec::new();

        let lost = {
            let mut guard = shared.session.lock();
            let Some(session) = guard.as_mut() else {
                return Ok(());
            };
            match shared.pump(session, &mut inbound) {
                Ok(()) => None,
                Err(reason) => {
                    if let Some(broken) = guard.take() {
                        shared.retire(broken);
                    }
                    Some((reason, shared.connected.swap(false, Ordering::AcqRel)))
                }
            }
        };

        let delivered = shared.deliver(inbound);
        if let Some((reason, was_connected)) = lost {
            shared.session_lost(&reason, was_connected);
        }
        delivered
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
