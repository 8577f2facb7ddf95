//! Length-prefixed packet framing over any [`ByteStream`].
//!
//! A packet is a single byte payload prefixed by its length:
//!
//! ```text
//! ┌─────────────────────────┬──────────────────┐
//! │ Size prefix (per codec) │ Payload (N bytes)│
//! └─────────────────────────┴──────────────────┘
//! ```
//!
//! The wire default is a fixed 4-byte little-endian `u32` prefix; base64 and
//! netstring prefix encodings are available behind the same [`SizeCodec`]
//! boundary and leak nowhere else. JSON helpers layer UTF-8 encode/decode
//! over raw packet read/write and are the only framing semantics the rest of
//! the system consumes.
//!
//! [`ByteStream`]: nodelink_stream::ByteStream

pub mod codec;
pub mod error;
pub mod transport;

pub use codec::SizeCodec;
pub use error::{FrameError, Result};
pub use transport::{
    read_json, read_packet, write_json, write_packet, PacketConfig, PacketTransport,
    DEFAULT_MAX_PAYLOAD,
};
