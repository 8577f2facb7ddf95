//! Subprocess supervision for node processes.
//!
//! [`spawn`] launches a child, wires its stdout and stderr through
//! [`ByteStream`] pumps into caller-supplied sinks, and tracks its exit
//! status. When an intercom channel is requested, the server's ephemeral
//! port is injected into the child's arguments as `--intercom-port <N>`
//! ahead of the user arguments, and the listener is torn down with the
//! process handle so it can never leak.
//!
//! [`ByteStream`]: nodelink_stream::ByteStream

pub mod command;
pub mod error;
pub mod process;

pub use command::NodeCommand;
pub use error::{Result, RunnerError};
pub use process::{spawn, NodeProcess, SpawnOptions, StdinMode};
