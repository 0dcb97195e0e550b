//! # Rust library interface to VMCI sockets
//!
//! The VMCI API library is a userspace interface to the Virtual Machine
//! Communication Interface socket family, the channel a hypervisor offers
//! between a guest and its host or between guests. It is a minimal
//! interface: each socket operation is a single call into the host's
//! Berkeley sockets layer, with the VMCI address family and the
//! `sockaddr_vm` address filled in on the caller's behalf.
//!
//! The address family differs between hosts, so it is resolved once by
//! [`system::init`] and cached for the whole process. Sockets are then
//! created and driven through [`socket::VmciSocket`], or through the
//! C-linkage `vmci_*` functions in [`ffi`] when the library is loaded as a
//! shared object by another language.
//!
//! The library adds no buffering, framing, retries or timeouts. Failures
//! are the OS's own errors, unchanged.

pub mod error;
pub mod ffi;
mod include;
pub mod socket;
mod sys;
pub mod system;

pub use crate::error::InitError;
pub use crate::socket::{SocketType, VmciAddr, VmciSocket, DEFAULT_PROTOCOL};
pub use crate::sys::RawSocket;
