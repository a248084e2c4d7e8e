// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON framing.
//!
//! Every frame is a 4-byte big-endian length followed by that many bytes of
//! compact JSON. Partial frames stay in the caller's buffer; a complete
//! frame holding malformed JSON is consumed and dropped without tearing the
//! stream down. Frames above [`MAX_FRAME_LEN`] are a protocol violation and
//! the stream must be closed.

use crate::message::{Message, PROTOCOL_VERSION};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame payload length: 16 MiB.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors from framing and message encoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame length {0} exceeds {MAX_FRAME_LEN} bytes")]
    FrameTooLarge(usize),

    #[error("connection closed")]
    ConnectionClosed,
}

/// Encode a message as a framed payload, stamping `protocol_version`.
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut value = serde_json::to_value(message)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("protocol_version".to_string(), PROTOCOL_VERSION.into());
    }
    let payload = serde_json::to_vec(&value)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Append `incoming` to `buffer` and drain every complete frame.
///
/// Returns the decoded messages in arrival order, leaving any trailing
/// partial frame in `buffer`. A declared length above [`MAX_FRAME_LEN`]
/// returns [`ProtocolError::FrameTooLarge`]; the caller is expected to close
/// the stream.
pub fn read_messages(
    buffer: &mut Vec<u8>,
    incoming: &[u8],
) -> Result<Vec<Message>, ProtocolError> {
    buffer.extend_from_slice(incoming);
    let mut messages = Vec::new();

    while buffer.len() >= 4 {
        let length = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        if length > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(length));
        }
        if buffer.len() < 4 + length {
            break;
        }

        let payload: Vec<u8> = buffer.drain(..4 + length).skip(4).collect();
        match serde_json::from_slice::<Message>(&payload) {
            Ok(message) => messages.push(message),
            Err(error) => {
                tracing::warn!(%error, "dropping malformed frame");
            }
        }
    }

    Ok(messages)
}

/// Write one framed message to an async writer.
pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let framed = encode(message)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message from an async reader.
///
/// Returns [`ProtocolError::ConnectionClosed`] on clean EOF at a frame
/// boundary. Malformed JSON inside the frame is an error here (unlike the
/// buffering [`read_messages`] path) because the caller asked for exactly
/// one message.
pub async fn read_message<R>(reader: &mut R) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let length = u32::from_be_bytes(header) as usize;
    if length > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
