// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Length-prefixed framing: 4-byte big-endian length, then exactly that many
// UTF-8 JSON bytes. `read_frame`/`write_frame` operate on any async
// read/write half so the TLS listener can hand them a `tokio_rustls`
// stream without this crate depending on TLS at all.

use printbroker_core::PrintBrokerError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::instrument;

use crate::message::Message;

/// Default ceiling on a single frame body, matching the spec's 200 MiB
/// default (`server.max_message_bytes`).
pub const DEFAULT_MAX_FRAME_BYTES: u64 = 200 * 1024 * 1024;

/// Reads exactly one framed message: a 4-byte BE length prefix followed by
/// that many bytes of UTF-8 JSON.
///
/// Fails with [`PrintBrokerError::Framing`] if the declared length exceeds
/// `max_bytes`, the stream closes before either the prefix or the body is
/// fully read, or the body is not valid JSON.
#[instrument(skip(stream))]
pub async fn read_frame<R>(stream: &mut R, max_bytes: u64) -> Result<Message, PrintBrokerError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|_| PrintBrokerError::Framing("connection closed while reading length prefix".into()))?;
    let len = u32::from_be_bytes(len_buf) as u64;

    if len > max_bytes {
        return Err(PrintBrokerError::Framing(format!(
            "frame length {len} exceeds ceiling {max_bytes}"
        )));
    }

    let mut body = vec![0u8; len as usize];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|_| PrintBrokerError::Framing("connection closed mid-frame".into()))?;

    Message::from_json_bytes(&body)
        .map_err(|e| PrintBrokerError::Framing(format!("invalid JSON body: {e}")))
}

/// Writes one framed message.
#[instrument(skip(stream, message))]
pub async fn write_frame<W>(stream: &mut W, message: &Message) -> Result<(), PrintBrokerError>
where
    W: AsyncWrite + Unpin,
{
    let body = message
        .to_json_bytes()
        .map_err(|e| PrintBrokerError::Internal(format!("failed to encode response: {e}")))?;
    let len = u32::try_from(body.len())
        .map_err(|_| PrintBrokerError::Internal("response body too large to frame".into()))?;

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&body).await?;
    stream.flush().await?;
    Ok(())
}

/// Pure in-memory encode, used by tests and by anything that needs the raw
/// bytes without an async stream (e.g. building a request to feed a mock).
pub fn encode_message(message: &Message) -> Result<Vec<u8>, PrintBrokerError> {
    let body = message
        .to_json_bytes()
        .map_err(|e| PrintBrokerError::Internal(format!("failed to encode message: {e}")))?;
    let len = u32::try_from(body.len())
        .map_err(|_| PrintBrokerError::Internal("message body too large to frame".into()))?;
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode_message(bytes: &[u8]) -> Result<Message, PrintBrokerError> {
    if bytes.len() < 4 {
        return Err(PrintBrokerError::Framing("buffer shorter than length prefix".into()));
    }
    let len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let body = bytes
        .get(4..4 + len)
        .ok_or_else(|| PrintBrokerError::Framing("declared length exceeds buffer".into()))?;
    Message::from_json_bytes(body)
        .map_err(|e| PrintBrokerError::Framing(format!("invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, MESSAGE_TYPE_PING};
    use serde_json::json;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trip_through_async_stream() {
        let msg = Message::new(MESSAGE_TYPE_PING, json!({"hello": "world"}));
        let encoded = encode_message(&msg).unwrap();

        let mut cursor = Cursor::new(encoded);
        let decoded = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES).await.unwrap();
        assert_eq!(decoded.message_type, MESSAGE_TYPE_PING);
        assert_eq!(decoded.data["hello"], "world");
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let msg = Message::new(MESSAGE_TYPE_PING, json!({}));
        let mut encoded = encode_message(&msg).unwrap();
        encoded.truncate(encoded.len() - 1);
        assert!(decode_message(&encoded).is_err());
    }

    #[test]
    fn encode_then_decode_is_identity() {
        let msg = Message::new(MESSAGE_TYPE_PING, json!({"a": 1, "b": [1,2,3]}));
        let encoded = encode_message(&msg).unwrap();
        let decoded = decode_message(&encoded).unwrap();
        assert_eq!(decoded.data, msg.data);
        assert_eq!(decoded.message_type, msg.message_type);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_reading_body() {
        let mut len_buf = Vec::new();
        len_buf.extend_from_slice(&(DEFAULT_MAX_FRAME_BYTES as u32 + 1).to_be_bytes());
        let mut cursor = Cursor::new(len_buf);
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES).await.unwrap_err();
        assert!(matches!(err, PrintBrokerError::Framing(_)));
    }

    #[tokio::test]
    async fn connection_closed_mid_body_is_framing_error() {
        let msg = Message::new(MESSAGE_TYPE_PING, json!({"x": "y"}));
        let mut encoded = encode_message(&msg).unwrap();
        encoded.truncate(6); // keep the 4-byte length prefix plus 2 body bytes
        let mut cursor = Cursor::new(encoded);
        let err = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES).await.unwrap_err();
        assert!(matches!(err, PrintBrokerError::Framing(_)));
    }
}
