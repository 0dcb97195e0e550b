// Copyright (C) 2020, Oxide Computer Company

//! Winsock bindings. Winsock must already be started (`WSAStartup`) by the
//! host process before any of these are called.

use std::os::raw::{c_char, c_int, c_void};

use crate::include::vmci_sockets::sockaddr_vm;
use super::sockaddr_vm_len;

pub type RawSocket = usize;
pub type SockLen = c_int;

pub const INVALID_SOCKET: RawSocket = !0;
pub const SOCKET_ERROR: c_int = -1;

pub const SOCK_STREAM: c_int = 1;
pub const SOCK_DGRAM: c_int = 2;

// WSAEAFNOSUPPORT
pub const EAFNOSUPPORT: c_int = 10047;

// SD_RECEIVE, SD_SEND and SD_BOTH
pub const SHUT_RD: c_int = 0;
pub const SHUT_WR: c_int = 1;
pub const SHUT_RDWR: c_int = 2;

#[link(name = "ws2_32")]
extern "system" {
    fn WSAGetLastError() -> c_int;
    #[link_name = "socket"]
    fn ws_socket(af: c_int, ty: c_int, protocol: c_int) -> RawSocket;
    #[link_name = "bind"]
    fn ws_bind(s: RawSocket, name: *const c_void, namelen: c_int) -> c_int;
    #[link_name = "connect"]
    fn ws_connect(s: RawSocket, name: *const c_void, namelen: c_int) -> c_int;
    #[link_name = "listen"]
    fn ws_listen(s: RawSocket, backlog: c_int) -> c_int;
    #[link_name = "accept"]
    fn ws_accept(s: RawSocket, addr: *mut c_void, addrlen: *mut c_int) -> RawSocket;
    #[link_name = "send"]
    fn ws_send(s: RawSocket, buf: *const c_char, len: c_int, flags: c_int) -> c_int;
    #[link_name = "sendto"]
    fn ws_sendto(
        s: RawSocket,
        buf: *const c_char,
        len: c_int,
        flags: c_int,
        to: *const c_void,
        tolen: c_int,
    ) -> c_int;
    #[link_name = "recv"]
    fn ws_recv(s: RawSocket, buf: *mut c_char, len: c_int, flags: c_int) -> c_int;
    #[link_name = "recvfrom"]
    fn ws_recvfrom(
        s: RawSocket,
        buf: *mut c_char,
        len: c_int,
        flags: c_int,
        from: *mut c_void,
        fromlen: *mut c_int,
    ) -> c_int;
    #[link_name = "getsockname"]
    fn ws_getsockname(s: RawSocket, name: *mut c_void, namelen: *mut c_int) -> c_int;
    #[link_name = "getpeername"]
    fn ws_getpeername(s: RawSocket, name: *mut c_void, namelen: *mut c_int) -> c_int;
    #[link_name = "shutdown"]
    fn ws_shutdown(s: RawSocket, how: c_int) -> c_int;
    fn closesocket(s: RawSocket) -> c_int;
}

// Winsock lengths are ints; larger buffers are clamped and reported as a
// short transfer.
fn clamp_len(len: usize) -> c_int {
    if len > c_int::MAX as usize {
        c_int::MAX
    } else {
        len as c_int
    }
}

/// Last Winsock error for the calling thread.
pub fn last_errno() -> c_int {
    unsafe { WSAGetLastError() }
}

pub fn socket(family: c_int, socktype: c_int, protocol: c_int) -> RawSocket {
    unsafe { ws_socket(family, socktype, protocol) }
}

pub fn bind(fd: RawSocket, addr: &sockaddr_vm) -> c_int {
    unsafe { ws_bind(fd, addr as *const sockaddr_vm as *const c_void, sockaddr_vm_len()) }
}

pub fn connect(fd: RawSocket, addr: &sockaddr_vm) -> c_int {
    unsafe { ws_connect(fd, addr as *const sockaddr_vm as *const c_void, sockaddr_vm_len()) }
}

pub fn listen(fd: RawSocket, backlog: c_int) -> c_int {
    unsafe { ws_listen(fd, backlog) }
}

pub fn accept(fd: RawSocket, addr: &mut sockaddr_vm) -> RawSocket {
    let mut len = sockaddr_vm_len();
    unsafe { ws_accept(fd, addr as *mut sockaddr_vm as *mut c_void, &mut len) }
}

/// # Safety
///
/// `buf` must be valid for reads of `len` bytes.
pub unsafe fn send(fd: RawSocket, buf: *const c_void, len: usize, flags: c_int) -> isize {
    ws_send(fd, buf as *const c_char, clamp_len(len), flags) as isize
}

/// # Safety
///
/// `buf` must be valid for reads of `len` bytes.
pub unsafe fn sendto(
    fd: RawSocket,
    buf: *const c_void,
    len: usize,
    flags: c_int,
    addr: &sockaddr_vm,
) -> isize {
    ws_sendto(
        fd,
        buf as *const c_char,
        clamp_len(len),
        flags,
        addr as *const sockaddr_vm as *const c_void,
        sockaddr_vm_len(),
    ) as isize
}

/// # Safety
///
/// `buf` must be valid for writes of `len` bytes.
pub unsafe fn recv(fd: RawSocket, buf: *mut c_void, len: usize, flags: c_int) -> isize {
    ws_recv(fd, buf as *mut c_char, clamp_len(len), flags) as isize
}

/// Receives into `buf` and the sender into `addr`. `addr_len` comes back
/// with the length Winsock wrote.
///
/// # Safety
///
/// `buf` must be valid for writes of `len` bytes.
pub unsafe fn recvfrom(
    fd: RawSocket,
    buf: *mut c_void,
    len: usize,
    flags: c_int,
    addr: &mut sockaddr_vm,
    addr_len: &mut SockLen,
) -> isize {
    *addr_len = sockaddr_vm_len();
    ws_recvfrom(
        fd,
        buf as *mut c_char,
        clamp_len(len),
        flags,
        addr as *mut sockaddr_vm as *mut c_void,
        addr_len,
    ) as isize
}

pub fn getsockname(fd: RawSocket, addr: &mut sockaddr_vm) -> c_int {
    let mut len = sockaddr_vm_len();
    unsafe { ws_getsockname(fd, addr as *mut sockaddr_vm as *mut c_void, &mut len) }
}

pub fn getpeername(fd: RawSocket, addr: &mut sockaddr_vm) -> c_int {
    let mut len = sockaddr_vm_len();
    unsafe { ws_getpeername(fd, addr as *mut sockaddr_vm as *mut c_void, &mut len) }
}

pub fn shutdown(fd: RawSocket, how: c_int) -> c_int {
    unsafe { ws_shutdown(fd, how) }
}

pub fn close_socket(fd: RawSocket) -> c_int {
    unsafe { closesocket(fd) }
}
