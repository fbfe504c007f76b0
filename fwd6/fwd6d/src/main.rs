// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Linux daemon wrapping the `fwd6_core` forwarding plane.
//!
//! Opens one packet socket per usable network interface, applies the
//! startup manifest, then runs a single-threaded epoll loop over the
//! sockets and the operator console until asked to quit.

// UNSAFETY: raw libc calls for packet sockets, ioctls, epoll, and termios.
#![expect(unsafe_code)]

mod config;
mod console;
mod netdev;

use anyhow::Context;
use anyhow::bail;
use clap::Parser;
use fwd6_core::DeviceId;
use fwd6_core::MAX_FRAME_LEN;
use fwd6_core::Router;
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::os::fd::RawFd;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Interfaces that are never usable as router ports.
const IGNORED_INTERFACES: &[&str] = &["lo", "bond0", "dummy0", "tunl0", "sit0"];

#[derive(Parser)]
#[clap(name = "fwd6d", about = "Userspace IPv6 router")]
struct Options {
    /// Startup manifest with addresses, routes, and neighbors.
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Run without the interactive console.
    #[clap(long)]
    no_console: bool,
}

fn main() -> anyhow::Result<()> {
    let opts = Options::parse();
    let filter = if std::env::var(EnvFilter::DEFAULT_ENV).is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::default().add_directive(LevelFilter::INFO.into())
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let mut router = Router::new();
    let mut ports = Vec::new();
    for name in netdev::interface_names()? {
        if IGNORED_INTERFACES.contains(&name.as_str()) {
            tracing::info!(dev = %name, "skipped interface");
            continue;
        }
        let socket = netdev::PacketSocket::open(&name)
            .with_context(|| format!("failed to open packet socket on {name}"))?;
        let mac = socket.mac();
        let tx = socket.sender()?;
        let dev = router.add_device(&name, mac, Box::new(tx));
        ports.push((dev, socket));
    }
    if ports.is_empty() {
        bail!("no usable network interface");
    }

    if let Some(path) = &opts.config {
        let manifest = config::load(path)?;
        config::apply(&mut router, &manifest)?;
    }

    run(&mut router, &ports, !opts.no_console)
}

/// Readiness loop: drain one datagram per ready socket, one key per ready
/// console.
fn run(
    router: &mut Router,
    ports: &[(DeviceId, netdev::PacketSocket)],
    console: bool,
) -> anyhow::Result<()> {
    let _raw_mode = if console {
        Some(console::RawMode::enter()?)
    } else {
        None
    };

    let epoll = Epoll::new()?;
    if console {
        epoll.watch(libc::STDIN_FILENO)?;
    }
    for (_, socket) in ports {
        epoll.watch(socket.as_raw_fd())?;
    }

    let mut buffer = [0; MAX_FRAME_LEN];
    loop {
        for fd in epoll.wait()? {
            if fd == libc::STDIN_FILENO {
                if !console::handle_input(router)? {
                    tracing::info!("goodbye");
                    return Ok(());
                }
                continue;
            }
            let Some((dev, socket)) = ports.iter().find(|(_, s)| s.as_raw_fd() == fd) else {
                continue;
            };
            match socket.recv(&mut buffer) {
                Ok(len) => router.receive(*dev, &buffer[..len]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) => {
                    tracing::error!(
                        dev = %router.device_name(*dev),
                        error = &err as &dyn std::error::Error,
                        "receive error"
                    );
                }
            }
        }
    }
}

/// Minimal epoll wrapper owning the epoll file descriptor.
struct Epoll {
    fd: RawFd,
}

impl Epoll {
    fn new() -> std::io::Result<Self> {
        // SAFETY: epoll_create1 allocates a new descriptor; no pointers
        // are involved.
        let fd = unsafe { libc::epoll_create1(0) };
        if fd < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    fn watch(&self, fd: RawFd) -> std::io::Result<()> {
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: fd as u64,
        };
        // SAFETY: `event` outlives the call; the kernel copies it.
        let rc = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    /// Waits for readiness and returns the ready file descriptors.
    fn wait(&self) -> std::io::Result<Vec<RawFd>> {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 16];
        loop {
            // SAFETY: the events pointer and length describe a valid,
            // writable array.
            let count = unsafe {
                libc::epoll_wait(self.fd, events.as_mut_ptr(), events.len() as i32, -1)
            };
            if count < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            return Ok(events[..count as usize]
                .iter()
                .map(|event| event.u64 as RawFd)
                .collect());
        }
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        // SAFETY: closing a descriptor we own.
        unsafe {
            libc::close(self.fd);
        }
    }
}
