// Copyright (C) 2020, Oxide Computer Company

pub mod vmci_sockets;
