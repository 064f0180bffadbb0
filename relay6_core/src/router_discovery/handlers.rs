//! Wires [`super::relay`] and [`super::server`] to the event loop: the
//! `timerfd`-backed per-slave RA interval timer, and the single
//! [`DatagramHandler`] registered on the ICMPv6 socket.

use std::cell::RefCell;
use std::net::SocketAddrV6;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::rc::Rc;

use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use socket2::Socket;

use crate::config::Config;
use crate::error::{Result, SetupError};
use crate::event_loop::{DatagramHandler, TimerHandler};
use crate::iface::Interface;
use crate::router_discovery::message::{ND_ROUTER_ADVERT, ND_ROUTER_SOLICIT};
use crate::router_discovery::{relay, server};
use crate::InterfaceRegistry;

/// A non-blocking one-shot `timerfd`, rearmed after every expiry with a
/// freshly drawn delay (§4.3's "Timer").
pub struct RaTimer {
    inner: TimerFd,
}

impl RaTimer {
    pub fn new() -> Result<Self> {
        let inner = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_NONBLOCK)
            .map_err(|e| SetupError::Timer(std::io::Error::from(e)))?;
        Ok(Self { inner })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.inner.as_fd().as_raw_fd()
    }

    pub fn set_in_secs(&self, secs: u32) {
        let _ = self.inner.set(
            Expiration::OneShot(TimeSpec::new(secs as i64, 0)),
            TimerSetTimeFlags::empty(),
        );
    }

    /// Reads and discards the 8-byte expiry counter (§5's "drain to
    /// exhaustion" applies equally to timer fds).
    pub fn drain(&self) {
        let mut buf = [0u8; 8];
        let _ = nix::unistd::read(self.inner.as_fd(), &mut buf);
    }
}

/// Fires on every RA interval expiry for one slave in server mode:
/// sends the advertisement, then rearms with a fresh uniform delay.
pub struct RaTimerHandler<'r> {
    pub config: &'r Config,
    pub slave: &'r Interface,
    pub socket_fd: RawFd,
    pub timer: Rc<RefCell<RaTimer>>,
}

impl TimerHandler for RaTimerHandler<'_> {
    fn handle(&mut self) {
        let timer = self.timer.borrow();
        timer.drain();
        server::send_router_advert(self.config, self.slave, self.socket_fd, false);
        timer.set_in_secs(server::rearm_delay_secs(self.config));
    }
}

/// Bound to the single ICMPv6 socket: dispatches RS/RA per mode (§4.3,
/// mirroring the original's `handle_icmpv6`).
pub struct RdHandler<'r> {
    pub config: &'r Config,
    pub registry: &'r InterfaceRegistry,
    /// Owns the ICMPv6 socket for the process's lifetime; `socket_fd`
    /// is the same fd, cached so it can be passed to the free
    /// send-path functions without borrowing `self`.
    pub socket: Socket,
    pub socket_fd: RawFd,
    /// Per-slave RA timers, used to trigger an immediate advertisement
    /// when a Router Solicitation arrives from a slave in server mode.
    pub timers: Vec<(u32, Rc<RefCell<RaTimer>>)>,
}

impl DatagramHandler for RdHandler<'_> {
    fn handle(&mut self, _src: SocketAddrV6, data: &[u8], iface: Option<&Interface>) {
        let Some(iface) = iface else { return };
        if data.is_empty() {
            return;
        }

        match data[0] {
            ND_ROUTER_ADVERT if self.config.router_discovery_relay() && self.registry.is_master(iface.index) => {
                relay::forward_router_advertisement(self.config, self.registry, self.socket_fd, data);
            }
            ND_ROUTER_SOLICIT if !self.registry.is_master(iface.index) => {
                if self.config.router_discovery_relay() {
                    relay::forward_router_solicitation(self.registry, self.socket_fd);
                } else if self.config.router_discovery_server() {
                    if let Some((_, timer)) = self.timers.iter().find(|(idx, _)| *idx == iface.index) {
                        timer.borrow().set_in_secs(0);
                    }
                }
            }
            _ => {}
        }
    }
}
