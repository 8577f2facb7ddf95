use bytes::{Bytes, BytesMut};
use nodelink_stream::ByteStream;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::codec::SizeCodec;
use crate::error::{FrameError, Result};

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Configuration for packet framing.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Maximum payload size in bytes. Default: 16 MiB. A decoded prefix
    /// beyond this bound fails before any payload byte is read, so an
    /// absurd prefix can never stall the reader.
    pub max_payload_size: usize,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Reads and writes length-prefixed packets over an owned [`ByteStream`].
///
/// Writes are atomic with respect to cancellation: the prefix and payload
/// are assembled into a single buffer and handed to the stream in one write,
/// so a cancelled `write_packet` can drop the whole packet but can never
/// leave a prefix on the wire without its payload.
pub struct PacketTransport {
    stream: ByteStream,
    codec: SizeCodec,
    config: PacketConfig,
}

impl PacketTransport {
    /// Wrap a stream with the binary wire-default codec.
    pub fn new(stream: ByteStream) -> Self {
        Self::with_codec(stream, SizeCodec::Binary)
    }

    /// Wrap a stream with an explicit size codec.
    pub fn with_codec(stream: ByteStream, codec: SizeCodec) -> Self {
        Self::with_config(stream, codec, PacketConfig::default())
    }

    /// Wrap a stream with explicit codec and configuration.
    pub fn with_config(stream: ByteStream, codec: SizeCodec, config: PacketConfig) -> Self {
        Self {
            stream,
            codec,
            config,
        }
    }

    /// Read one packet: decode the size prefix, then exactly that many
    /// payload bytes. A zero-length payload is valid.
    pub async fn read_packet(&mut self) -> Result<Bytes> {
        read_packet_inner(
            &mut self.stream,
            &self.codec,
            self.config.max_payload_size,
        )
        .await
    }

    /// Write one packet: size prefix followed by the payload, then drain.
    pub async fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        write_packet_inner(
            &mut self.stream,
            &self.codec,
            self.config.max_payload_size,
            payload,
        )
        .await
    }

    /// Read one packet and decode it as UTF-8 JSON.
    pub async fn read_json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let payload = self.read_packet().await?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Encode `value` as UTF-8 JSON and write it as one packet.
    pub async fn write_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.write_packet(&payload).await
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &ByteStream {
        &self.stream
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut ByteStream {
        &mut self.stream
    }

    /// Consume the transport and return the inner stream.
    pub fn into_inner(self) -> ByteStream {
        self.stream
    }

    /// The size codec in use.
    pub fn codec(&self) -> &SizeCodec {
        &self.codec
    }

    /// Current configuration.
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

async fn read_packet_inner(
    stream: &mut ByteStream,
    codec: &SizeCodec,
    max_payload_size: usize,
) -> Result<Bytes> {
    let size = codec.decode(stream).await?;
    if size > max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: max_payload_size,
        });
    }
    let payload = stream.read_exactly(size).await?;
    trace!(size, "packet read");
    Ok(payload)
}

async fn write_packet_inner(
    stream: &mut ByteStream,
    codec: &SizeCodec,
    max_payload_size: usize,
    payload: &[u8],
) -> Result<()> {
    if payload.len() > max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload_size,
        });
    }
    let mut buf = BytesMut::with_capacity(payload.len() + 8);
    codec.encode(payload.len(), &mut buf)?;
    buf.extend_from_slice(payload);
    stream.write(&buf).await?;
    stream.drain().await?;
    trace!(size = payload.len(), "packet written");
    Ok(())
}

/// Read one binary-prefixed packet from a bare stream.
pub async fn read_packet(stream: &mut ByteStream) -> Result<Bytes> {
    read_packet_inner(stream, &SizeCodec::Binary, DEFAULT_MAX_PAYLOAD).await
}

/// Write one binary-prefixed packet to a bare stream and drain it.
pub async fn write_packet(stream: &mut ByteStream, payload: &[u8]) -> Result<()> {
    write_packet_inner(stream, &SizeCodec::Binary, DEFAULT_MAX_PAYLOAD, payload).await
}

/// Read one binary-prefixed packet and decode it as UTF-8 JSON.
pub async fn read_json<T: DeserializeOwned>(stream: &mut ByteStream) -> Result<T> {
    let payload = read_packet(stream).await?;
    Ok(serde_json::from_slice(&payload)?)
}

/// Encode `value` as UTF-8 JSON and write it as one binary-prefixed packet.
pub async fn write_json<T: Serialize>(stream: &mut ByteStream, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    write_packet(stream, &payload).await
}
