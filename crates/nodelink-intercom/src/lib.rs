//! Single-use, single-client TCP rendezvous ("intercom").
//!
//! The parent binds an ephemeral port and passes it to the child on the
//! command line; the port is the unforgeable single-use capability for one
//! local connection, so no authentication is layered on top. The server
//! accepts exactly one client, ever, and releases the listening socket the
//! moment that connection lands.

pub mod client;
pub mod error;
pub mod server;

pub use client::{open_intercom, IntercomClient};
pub use error::{IntercomError, Result};
pub use server::{start_intercom, IntercomServer};
