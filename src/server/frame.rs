//! WebSocket frame codec (RFC 6455 Section 5.2).
//!
//! Only single, unfragmented frames are supported. Outbound frames are
//! always unmasked text frames; inbound frames may be masked and are
//! unmasked on read.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest payload accepted from a peer (1 MiB).
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// FIN bit of the first header byte.
const FIN: u8 = 0x80;

/// MASK bit of the second header byte.
const MASK: u8 = 0x80;

/// Length marker for a 16-bit extended length.
const LEN_16: u8 = 126;

/// Length marker for a 64-bit extended length.
const LEN_64: u8 = 127;

/// Frame opcodes used by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Text data frame.
    Text = 0x1,
    /// Connection close control frame.
    Close = 0x8,
}

/// A successfully read frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A data frame payload, already unmasked. May be empty.
    Text(Vec<u8>),
    /// The peer sent a close frame.
    Close,
}

/// Errors that end a frame read.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The peer went away in the middle of (or before) a frame.
    #[error("connection closed by peer")]
    Disconnected,

    /// The declared payload length exceeds [`MAX_PAYLOAD_LEN`].
    #[error("payload of {len} bytes exceeds limit of {max} bytes")]
    Oversized {
        /// Declared payload length.
        len: u64,
        /// Configured limit.
        max: usize,
    },

    /// Transport error.
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Disconnected
        } else {
            FrameError::Io(e)
        }
    }
}

/// XOR `data` with the 4-byte masking key, cycling the key.
///
/// Masking is its own inverse.
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Encode a single final frame with the given opcode.
///
/// When `mask` is set the payload is masked with it, as a client would.
pub fn encode_frame(opcode: Opcode, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let len = payload.len();
    let mask_bit = if mask.is_some() { MASK } else { 0 };

    let mut frame = Vec::with_capacity(len + 14);
    frame.push(FIN | opcode as u8);

    if len <= 125 {
        frame.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        frame.push(mask_bit | LEN_16);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(mask_bit | LEN_64);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    match mask {
        Some(key) => {
            frame.extend_from_slice(&key);
            let start = frame.len();
            frame.extend_from_slice(payload);
            apply_mask(&mut frame[start..], key);
        }
        None => frame.extend_from_slice(payload),
    }

    frame
}

/// Encode an unmasked, unfragmented text frame (server to client).
pub fn encode_text(payload: &[u8]) -> Vec<u8> {
    encode_frame(Opcode::Text, payload, None)
}

/// Read one frame from `reader`.
///
/// A close opcode returns [`Message::Close`] without reading anything past
/// the 2-byte header. The declared length is checked against
/// [`MAX_PAYLOAD_LEN`] before the masking key or payload is read.
pub async fn read_frame<R>(reader: &mut R) -> Result<Message, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 2];
    reader.read_exact(&mut header).await?;

    if header[0] & 0x0F == Opcode::Close as u8 {
        return Ok(Message::Close);
    }

    let masked = header[1] & MASK != 0;
    let len = match header[1] & 0x7F {
        LEN_16 => {
            let mut ext = [0u8; 2];
            reader.read_exact(&mut ext).await?;
            u64::from(u16::from_be_bytes(ext))
        }
        LEN_64 => {
            let mut ext = [0u8; 8];
            reader.read_exact(&mut ext).await?;
            u64::from_be_bytes(ext)
        }
        short => u64::from(short),
    };

    if len > MAX_PAYLOAD_LEN as u64 {
        return Err(FrameError::Oversized {
            len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mask = if masked {
        let mut key = [0u8; 4];
        reader.read_exact(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Message::Text(payload))
}
