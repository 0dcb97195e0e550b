// Copyright (C) 2020, Oxide Computer Company

//! Raw socket calls against the host socket layer.
//!
//! Every function here is a single call into the OS with the VMCI address
//! struct passed through unchanged. The unix and Windows implementations
//! export the same names, so callers never branch on the platform.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use self::unix::*;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::*;

use std::mem::size_of;

use crate::include::vmci_sockets::sockaddr_vm;

/// Length argument passed alongside a `sockaddr_vm`.
pub fn sockaddr_vm_len() -> SockLen {
    size_of::<sockaddr_vm>() as SockLen
}

/// Whether the OS wrote a whole `sockaddr_vm`. Connected streams report
/// no sender at all.
pub fn holds_sockaddr_vm(addr_len: SockLen) -> bool {
    addr_len >= sockaddr_vm_len()
}
