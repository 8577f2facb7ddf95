use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use bytes::{BufMut, BytesMut};
use nodelink_stream::ByteStream;

use crate::error::{FrameError, Result};

/// Longest decimal representation of a `usize` size field.
const MAX_DECIMAL_DIGITS: usize = 20;

/// Strategy for encoding a non-negative packet size on the wire.
///
/// Every encoding is fixed-width or self-terminating, so the reader always
/// knows exactly how many bytes to consume before the payload starts, and
/// `decode(encode(n)) == n` for every representable `n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeCodec {
    /// Fixed 4-byte little-endian `u32`. The wire default: one fixed-size
    /// read bounds length parsing regardless of payload size.
    Binary,

    /// Fixed-width base64 of the minimal big-endian byte representation,
    /// right-padded with `=` to `width` bytes.
    Base64 { width: usize },

    /// ASCII decimal size string, itself prefixed by a 4-byte little-endian
    /// length.
    NetString,
}

impl SizeCodec {
    /// Encode `size` into `dst`.
    pub fn encode(&self, size: usize, dst: &mut BytesMut) -> Result<()> {
        match self {
            SizeCodec::Binary => {
                let value = u32::try_from(size).map_err(|_| FrameError::PayloadTooLarge {
                    size,
                    max: u32::MAX as usize,
                })?;
                dst.put_u32_le(value);
            }
            SizeCodec::Base64 { width } => {
                let encoded = STANDARD_NO_PAD.encode(minimal_be_bytes(size));
                if encoded.len() > *width {
                    return Err(FrameError::PayloadTooLarge {
                        size,
                        max: base64_max_size(*width),
                    });
                }
                dst.put_slice(encoded.as_bytes());
                dst.put_bytes(b'=', width - encoded.len());
            }
            SizeCodec::NetString => {
                let digits = size.to_string();
                dst.put_u32_le(digits.len() as u32);
                dst.put_slice(digits.as_bytes());
            }
        }
        Ok(())
    }

    /// Decode a size from `stream`, consuming exactly the prefix bytes.
    pub async fn decode(&self, stream: &mut ByteStream) -> Result<usize> {
        match self {
            SizeCodec::Binary => {
                let data = stream.read_exactly(4).await?;
                let value = u32::from_le_bytes(data.as_ref().try_into().expect("4 bytes read"));
                Ok(value as usize)
            }
            SizeCodec::Base64 { width } => {
                let data = stream.read_exactly(*width).await?;
                let trimmed = trim_padding(&data);
                let bytes = STANDARD_NO_PAD
                    .decode(trimmed)
                    .map_err(|e| FrameError::malformed(format!("invalid base64 size: {e}")))?;
                if bytes.len() > std::mem::size_of::<usize>() {
                    return Err(FrameError::malformed(format!(
                        "base64 size field is {} bytes wide",
                        bytes.len()
                    )));
                }
                Ok(bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize))
            }
            SizeCodec::NetString => {
                let data = stream.read_exactly(4).await?;
                let len = u32::from_le_bytes(data.as_ref().try_into().expect("4 bytes read"));
                if len as usize > MAX_DECIMAL_DIGITS {
                    return Err(FrameError::malformed(format!(
                        "netstring size field claims {len} digits"
                    )));
                }
                let digits = stream.read_exactly(len as usize).await?;
                let text = std::str::from_utf8(&digits)
                    .map_err(|_| FrameError::malformed("netstring size is not UTF-8"))?;
                text.parse::<usize>()
                    .map_err(|_| FrameError::malformed(format!("netstring size {text:?} is not a number")))
            }
        }
    }
}

/// Big-endian bytes of `size` with leading zeros stripped (empty for 0).
fn minimal_be_bytes(size: usize) -> Vec<u8> {
    let all = size.to_be_bytes();
    let first = all.iter().position(|b| *b != 0).unwrap_or(all.len());
    all[first..].to_vec()
}

/// Largest size representable in a base64 field of `width` bytes.
fn base64_max_size(width: usize) -> usize {
    let max_bytes = width * 3 / 4;
    if max_bytes >= std::mem::size_of::<usize>() {
        usize::MAX
    } else {
        (1usize << (8 * max_bytes)) - 1
    }
}

fn trim_padding(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| *b != b'=')
        .map_or(0, |pos| pos + 1);
    &data[..end]
}
