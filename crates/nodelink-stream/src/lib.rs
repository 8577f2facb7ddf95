//! Uniform asynchronous byte-stream abstraction.
//!
//! Every higher layer (packet framing, intercom, process supervision) talks
//! to a [`ByteStream`] and nothing else. A `ByteStream` adapts an in-memory
//! buffer, an OS anonymous pipe, an inherited std handle, a child-process
//! pipe, or a TCP socket behind one read/write/drain/eof/close contract, so
//! nothing above this crate is resource-type-aware.

pub mod error;
pub mod pump;
pub mod stream;

pub use error::{Result, StreamError};
pub use pump::pump;
pub use stream::ByteStream;
