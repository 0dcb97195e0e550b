// Copyright (C) 2020, Oxide Computer Company

//! Errors raised while resolving the VMCI address family.
//!
//! Socket operations themselves report `std::io::Error` straight from the
//! OS, so `raw_os_error()` carries the same code `vmci_errno` would.

use std::io;
use std::os::raw::c_int;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitError {
    /// The host platform has no VMCI sockets service this library knows
    /// how to query.
    #[error("VMCI sockets are not supported on this platform")]
    Unsupported,

    /// The VMCI sockets control device could not be opened or queried.
    #[error("VMCI sockets device unavailable: {0}")]
    Device(#[source] io::Error),

    /// The service answered, but with a family no socket can be made in.
    #[error("VMCI sockets service returned invalid address family {0}")]
    InvalidFamily(c_int),
}
