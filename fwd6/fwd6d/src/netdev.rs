// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `AF_PACKET` sockets: one raw layer-2 socket per router port.

use fwd6_core::LinkSender;
use fwd6_core::wire::MacAddr;
use socket2::Domain;
use socket2::Protocol;
use socket2::Socket;
use socket2::Type;
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::AsRawFd;
use std::os::fd::RawFd;

/// Every interface name known to the kernel.
pub fn interface_names() -> io::Result<Vec<String>> {
    // SAFETY: if_nameindex returns a heap array terminated by a zeroed
    // entry, freed below with if_freenameindex.
    let list = unsafe { libc::if_nameindex() };
    if list.is_null() {
        return Err(io::Error::last_os_error());
    }
    let mut names = Vec::new();
    let mut cursor = list;
    // SAFETY: the array is valid until freed, and iteration stops at the
    // zeroed terminator.
    unsafe {
        while (*cursor).if_index != 0 && !(*cursor).if_name.is_null() {
            names.push(
                std::ffi::CStr::from_ptr((*cursor).if_name)
                    .to_string_lossy()
                    .into_owned(),
            );
            cursor = cursor.add(1);
        }
        libc::if_freenameindex(list);
    }
    Ok(names)
}

/// A non-blocking raw packet socket bound to one interface.
pub struct PacketSocket {
    socket: Socket,
    mac: MacAddr,
}

impl PacketSocket {
    /// Opens a raw socket, binds it to `interface`, and reads the
    /// interface's MAC address.
    pub fn open(interface: &str) -> io::Result<Self> {
        let protocol = (libc::ETH_P_ALL as u16).to_be();
        let socket = Socket::new(
            Domain::PACKET,
            Type::RAW,
            Some(Protocol::from(i32::from(protocol))),
        )?;

        let ifindex = ifreq_index(&socket, interface)?;

        let mut addr: libc::sockaddr_ll = {
            // SAFETY: sockaddr_ll is plain data; all-zeroes is a valid
            // representation.
            unsafe { std::mem::zeroed() }
        };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = protocol;
        addr.sll_ifindex = ifindex;
        // SAFETY: the address pointer and length describe a valid
        // sockaddr_ll for the duration of the call.
        let rc = unsafe {
            libc::bind(
                socket.as_raw_fd(),
                std::ptr::from_ref(&addr).cast(),
                size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        let mac = ifreq_hwaddr(&socket, interface)?;
        socket.set_nonblocking(true)?;
        tracing::info!(dev = %interface, %mac, ifindex, "opened packet socket");
        Ok(Self { socket, mac })
    }

    /// The interface's MAC address.
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// A second handle to the same socket for the router's transmit sink.
    pub fn sender(&self) -> io::Result<PacketSender> {
        Ok(PacketSender {
            socket: self.socket.try_clone()?,
        })
    }

    /// Receives one datagram, without blocking.
    pub fn recv(&self, buffer: &mut [u8]) -> io::Result<usize> {
        // SAFETY: recv does not write uninitialized bytes into the buffer.
        let uninit = unsafe {
            std::slice::from_raw_parts_mut(
                buffer.as_mut_ptr().cast::<MaybeUninit<u8>>(),
                buffer.len(),
            )
        };
        self.socket.recv(uninit)
    }
}

impl AsRawFd for PacketSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

/// The transmit half handed to the router.
pub struct PacketSender {
    socket: Socket,
}

impl LinkSender for PacketSender {
    fn transmit(&mut self, frame: &[u8]) {
        match self.socket.send(frame) {
            Ok(sent) if sent == frame.len() => {}
            Ok(sent) => {
                // A short write corrupts the datagram; treat it as a drop.
                tracing::warn!(len = frame.len(), sent, "short send, frame dropped");
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                tracing::debug!(len = frame.len(), "send queue full, frame dropped");
            }
            Err(err) => {
                tracing::error!(
                    error = &err as &dyn std::error::Error,
                    "send error, frame dropped"
                );
            }
        }
    }
}

/// Builds an `ifreq` for `interface` and issues `request` against it.
fn ifreq(socket: &Socket, interface: &str, request: libc::Ioctl) -> io::Result<libc::ifreq> {
    let name = interface.as_bytes();
    let mut req: libc::ifreq = {
        // SAFETY: ifreq is plain data; all-zeroes is a valid
        // representation.
        unsafe { std::mem::zeroed() }
    };
    if name.len() >= req.ifr_name.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "interface name too long",
        ));
    }
    for (dst, src) in req.ifr_name.iter_mut().zip(name) {
        *dst = *src as libc::c_char;
    }
    // SAFETY: the request pointer is valid and matches the ioctl's
    // expected argument type.
    let rc = unsafe { libc::ioctl(socket.as_raw_fd(), request, std::ptr::from_mut(&mut req)) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(req)
}

fn ifreq_index(socket: &Socket, interface: &str) -> io::Result<i32> {
    let req = ifreq(socket, interface, libc::SIOCGIFINDEX)?;
    // SAFETY: SIOCGIFINDEX fills the ifindex member of the union.
    Ok(unsafe { req.ifr_ifru.ifru_ifindex })
}

fn ifreq_hwaddr(socket: &Socket, interface: &str) -> io::Result<MacAddr> {
    let req = ifreq(socket, interface, libc::SIOCGIFHWADDR)?;
    // SAFETY: SIOCGIFHWADDR fills the hwaddr member of the union.
    let hwaddr = unsafe { req.ifr_ifru.ifru_hwaddr };
    let mut mac = [0; 6];
    for (dst, src) in mac.iter_mut().zip(&hwaddr.sa_data[..6]) {
        *dst = *src as u8;
    }
    Ok(MacAddr(mac))
}
