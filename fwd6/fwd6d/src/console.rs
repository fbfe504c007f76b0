// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Single-key operator console on stdin.
//!
//! `a` dumps the neighbor cache, `r` dumps the routes, `q` quits. Stdin is
//! switched out of canonical mode so keys arrive without a newline, and
//! back on exit.

use fwd6_core::Router;
use std::io;
use std::io::ErrorKind;

/// Guard holding stdin in raw, non-blocking mode.
pub struct RawMode {
    saved: libc::termios,
}

impl RawMode {
    /// Disables canonical input on stdin and makes it non-blocking.
    pub fn enter() -> io::Result<Self> {
        let mut saved: libc::termios = {
            // SAFETY: termios is plain data; all-zeroes is a valid
            // representation for tcgetattr to fill.
            unsafe { std::mem::zeroed() }
        };
        // SAFETY: the termios pointer is valid for the call.
        if unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut saved) } < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut raw = saved;
        raw.c_lflag &= !libc::ICANON;
        raw.c_cc[libc::VTIME] = 0;
        raw.c_cc[libc::VMIN] = 1;
        // SAFETY: the termios pointer is valid for the call.
        if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw) } < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: fcntl on stdin with valid flag arguments.
        unsafe {
            let flags = libc::fcntl(libc::STDIN_FILENO, libc::F_GETFL, 0);
            libc::fcntl(libc::STDIN_FILENO, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
        Ok(Self { saved })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        // SAFETY: restoring the attributes captured in enter().
        unsafe {
            libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &self.saved);
            let flags = libc::fcntl(libc::STDIN_FILENO, libc::F_GETFL, 0);
            libc::fcntl(libc::STDIN_FILENO, libc::F_SETFL, flags & !libc::O_NONBLOCK);
        }
    }
}

/// Handles one console key. Returns false when the operator asks to quit.
pub fn handle_input(router: &Router) -> io::Result<bool> {
    let mut key = [0u8; 1];
    // SAFETY: reading into a one-byte stack buffer.
    let n = unsafe { libc::read(libc::STDIN_FILENO, key.as_mut_ptr().cast(), 1) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == ErrorKind::WouldBlock {
            return Ok(true);
        }
        return Err(err);
    }
    if n == 0 {
        return Ok(true);
    }

    match key[0] {
        b'a' => print!("\n{}", router.dump_neighbors()),
        b'r' => print!("\n{}", router.dump_routes()),
        b'q' => return Ok(false),
        _ => {}
    }
    Ok(true)
}
