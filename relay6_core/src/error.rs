//! Error categories for the dataplane, mirroring the five classes in the
//! error handling design: setup failures are fatal, everything else is
//! logged by the caller and the offending packet is dropped.

use std::io;

use thiserror::Error;

/// Failures that occur before the event loop starts running and that
/// should cause the process to exit with a nonzero status.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to resolve interface {name}: {source}")]
    InterfaceResolve { name: String, source: io::Error },
    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),
    #[error("failed to bind socket: {0}")]
    Bind(#[source] io::Error),
    #[error("failed to join multicast group on {iface}: {source}")]
    MulticastJoin { iface: String, source: io::Error },
    #[error("failed to create epoll instance: {0}")]
    Epoll(#[source] io::Error),
    #[error("failed to create timer: {0}")]
    Timer(#[source] io::Error),
    #[error("no relay or server enabled")]
    NoRelaysEnabled,
}

/// Runtime error surfaced from a single handler invocation. A caller
/// decides whether to log at `warn` or `debug` based on the variant;
/// none of these ever unwind past a handler.
#[derive(Debug, Error)]
pub enum Error {
    #[error("setup failed: {0}")]
    Setup(#[from] SetupError),

    #[error("receive failed: {0}")]
    Recv(#[source] io::Error),

    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("rewrite aborted: {0}")]
    RewriteAborted(&'static str),

    #[error("no usable address for interface")]
    NoAddress,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
