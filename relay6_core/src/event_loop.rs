//! The event loop and its three kinds of registered source, per §4.1 and
//! §9's "mixed ownership of timers and sockets" note: `{Socket, Timer,
//! Signal}`. Dispatch is single-threaded, edge-triggered, drained to
//! exhaustion per fd per wake-up (§5).
#![allow(unsafe_code)]

use std::collections::HashMap;
use std::net::SocketAddrV6;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::sys::signal::SigSet;
use nix::sys::signalfd::{SfdFlags, SignalFd};

use crate::error::{Error, Result, SetupError};
use crate::iface::{Interface, InterfaceRegistry};
use crate::net::recv_with_pktinfo;

/// Fixed receive buffer size. §4.2 recommends at least 2048 bytes so the
/// broken-DUID prefix (+16 bytes) and relay envelope nesting always fit
/// without a grow check failing in practice.
pub const RECV_BUFFER_LEN: usize = 2048;

/// Receives one fully-formed datagram at a time; bound to exactly one
/// socket fd at registration (§3's "event registration").
pub trait DatagramHandler {
    fn handle(&mut self, src: SocketAddrV6, data: &[u8], iface: Option<&Interface>);
}

/// Fires once per timer expiry; used by the Router Discovery server for
/// its per-slave RA interval (§4.3).
pub trait TimerHandler {
    fn handle(&mut self);
}

enum Source<'r> {
    Datagram(Box<dyn DatagramHandler + 'r>),
    Timer(Box<dyn TimerHandler + 'r>),
}

/// Signals the loop reacts to. `Stop` covers TERM/HUP/INT (§4.1,
/// §6); `Rearm` covers USR1, "rearms all RA timers with a 1-second
/// delay" (§4.1, §9).
enum SignalAction {
    Stop,
    Rearm,
}

/// The readiness multiplexer plus the interface registry it dispatches
/// against. Owns every socket/timer fd's handler for the process's
/// lifetime.
pub struct EventLoop<'r> {
    epoll: Epoll,
    registry: &'r InterfaceRegistry,
    sources: HashMap<RawFd, Source<'r>>,
    signal_fd: Option<(RawFd, SignalFd)>,
    stop: Arc<AtomicBool>,
    rearm_callbacks: Vec<Box<dyn FnMut() + 'r>>,
}

impl<'r> EventLoop<'r> {
    pub fn new(registry: &'r InterfaceRegistry) -> Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::empty())
            .map_err(|e| SetupError::Epoll(std::io::Error::from(e)))?;
        Ok(Self {
            epoll,
            registry,
            sources: HashMap::new(),
            signal_fd: None,
            stop: Arc::new(AtomicBool::new(false)),
            rearm_callbacks: Vec::new(),
        })
    }

    /// A shareable handle to the stop flag, e.g. for tests that want to
    /// terminate the loop externally after scheduling work.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn registry(&self) -> &'r InterfaceRegistry {
        self.registry
    }

    /// Registers a datagram socket. `fd` must already be non-blocking.
    pub fn register_datagram(&mut self, fd: RawFd, handler: Box<dyn DatagramHandler + 'r>) -> Result<()> {
        self.add_fd(fd)?;
        self.sources.insert(fd, Source::Datagram(handler));
        Ok(())
    }

    /// Registers a `timerfd`-backed periodic or one-shot source.
    pub fn register_timer(&mut self, fd: RawFd, handler: Box<dyn TimerHandler + 'r>) -> Result<()> {
        self.add_fd(fd)?;
        self.sources.insert(fd, Source::Timer(handler));
        Ok(())
    }

    /// Folds `SIGTERM`/`SIGHUP`/`SIGINT` (stop) and `SIGUSR1` (rearm)
    /// delivery into the multiplexer via `signalfd`, per §9's extension
    /// of the event-source sum type to include `Signal`. Must be called
    /// with the relevant signals already blocked in the process mask
    /// (the binary does this before starting the loop, since the mask is
    /// inherited by every thread and this process is single-threaded by
    /// design, per §5).
    pub fn register_signals(&mut self, mask: SigSet) -> Result<()> {
        let sfd = SignalFd::with_flags(&mask, SfdFlags::SFD_NONBLOCK)
            .map_err(|e| SetupError::Epoll(std::io::Error::from(e)))?;
        let fd = sfd.as_fd().as_raw_fd();
        self.add_fd(fd)?;
        self.signal_fd = Some((fd, sfd));
        Ok(())
    }

    /// Registers a callback invoked for every `SIGUSR1` rearm request, in
    /// addition to the built-in sweep over every registered RA timer
    /// performed by the Router Discovery module itself.
    pub fn on_rearm(&mut self, callback: Box<dyn FnMut() + 'r>) {
        self.rearm_callbacks.push(callback);
    }

    fn add_fd(&mut self, fd: RawFd) -> Result<()> {
        let ev = EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLET, fd as u64);
        // SAFETY: epoll merely stores `fd`; the caller retains ownership
        // and is responsible for keeping it open for as long as it is
        // registered.
        let borrowed = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
        self.epoll
            .add(borrowed, ev)
            .map_err(|e| Error::Setup(SetupError::Epoll(std::io::Error::from(e))))
    }

    /// Blocks on readiness and dispatches until the stop flag is set.
    /// Each wake-up drains every ready fd to exhaustion (edge-triggered
    /// semantics require this) before checking the stop flag again.
    pub fn run(&mut self) -> Result<()> {
        let mut events = [EpollEvent::empty(); 64];
        while !self.stop.load(Ordering::Relaxed) {
            let n = match self.epoll.wait(&mut events, EpollTimeout::NONE) {
                Ok(n) => n,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(Error::Recv(std::io::Error::from(e))),
            };

            for ev in &events[..n] {
                let fd = ev.data() as RawFd;
                if let Some((signal_fd, _)) = &self.signal_fd {
                    if fd == *signal_fd {
                        self.drain_signals();
                        continue;
                    }
                }
                self.dispatch_one(fd);
            }
        }
        Ok(())
    }

    fn dispatch_one(&mut self, fd: RawFd) {
        match self.sources.get_mut(&fd) {
            Some(Source::Timer(handler)) => {
                // A readable timerfd always yields exactly one logical
                // expiry event to the handler; the 8-byte expiry counter
                // itself is drained by the timer wrapper on read.
                handler.handle();
            }
            Some(Source::Datagram(handler)) => {
                let registry = self.registry;
                let mut buf = [0u8; RECV_BUFFER_LEN];
                loop {
                    match recv_with_pktinfo(fd, &mut buf) {
                        Ok(None) => break,
                        Ok(Some(recv)) => {
                            let iface = recv.ifindex.and_then(|i| registry.lookup_by_index(i));
                            if iface.is_none() && recv.ifindex.is_some() {
                                // §4.1 step 2: ifindex present but unknown
                                // to this process and not netlink -> drop.
                                tracing::debug!(ifindex = recv.ifindex, "dropping packet for unknown interface");
                                continue;
                            }
                            handler.handle(recv.src, &buf[..recv.len], iface);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "recv failed");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn drain_signals(&mut self) {
        let Some((_, sfd)) = &mut self.signal_fd else {
            return;
        };
        while let Ok(Some(info)) = sfd.read_signal() {
            let action = match info.ssi_signo as i32 {
                s if s == nix::sys::signal::Signal::SIGTERM as i32 => Some(SignalAction::Stop),
                s if s == nix::sys::signal::Signal::SIGHUP as i32 => Some(SignalAction::Stop),
                s if s == nix::sys::signal::Signal::SIGINT as i32 => Some(SignalAction::Stop),
                s if s == nix::sys::signal::Signal::SIGUSR1 as i32 => Some(SignalAction::Rearm),
                _ => None,
            };
            match action {
                Some(SignalAction::Stop) => {
                    tracing::info!("received stop signal, shutting down");
                    self.stop.store(true, Ordering::Relaxed);
                }
                Some(SignalAction::Rearm) => {
                    tracing::debug!("received SIGUSR1, rearming RA timers");
                    for cb in &mut self.rearm_callbacks {
                        cb();
                    }
                }
                None => {}
            }
        }
    }
}
