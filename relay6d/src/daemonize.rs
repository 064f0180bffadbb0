//! Daemonization and pidfile writing (§6, §9's "Daemonization" note).
//! Out of scope as a *specified* subsystem, but the interface is
//! implemented here with the same `nix` building blocks already used
//! elsewhere in this binary: double-fork + `setsid` + standard-stream
//! redirection, matching the original's single `daemon(0, 0)` call.
#![allow(unsafe_code)]

use std::fs::File;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::unistd::{fork, setsid, ForkResult};

/// Detaches the process from its controlling terminal: forks twice
/// (the first fork's parent exits immediately, the intermediate child
/// calls `setsid` to drop the controlling terminal and start a new
/// session, then forks again so the final daemon can never reacquire
/// one), changes to `/`, and redirects stdin/stdout/stderr to
/// `/dev/null` — the same end state as glibc's `daemon(0, 0)`.
pub fn daemonize() -> std::io::Result<()> {
    // SAFETY: this process is still single-threaded at this point in
    // `main` (no sockets, timers, or threads have been created yet), so
    // `fork` across it is sound.
    match unsafe { fork() }.map_err(std::io::Error::from)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(std::io::Error::from)?;

    // SAFETY: still single-threaded, same reasoning as above.
    match unsafe { fork() }.map_err(std::io::Error::from)? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    std::env::set_current_dir("/")?;
    redirect_standard_streams()?;
    Ok(())
}

fn redirect_standard_streams() -> std::io::Result<()> {
    let devnull = File::options().read(true).write(true).open("/dev/null")?;
    let fd = devnull.as_raw_fd();
    for target in [
        std::io::stdin().as_raw_fd(),
        std::io::stdout().as_raw_fd(),
        std::io::stderr().as_raw_fd(),
    ] {
        nix::unistd::dup2(fd, target).map_err(std::io::Error::from)?;
    }
    Ok(())
}

/// Writes the current process id as a decimal number followed by a
/// newline to `path`, matching the original's pidfile writer in
/// `6relayd.c::main`.
pub fn write_pidfile(path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{}", std::process::id())
}
