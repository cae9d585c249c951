// Copyright (c) 2024 Mesh Overlay Contributors

//! Frames a bidirectional QUIC stream into length-prefixed `ControlEnvelope`
//! messages, enforcing the envelope payload cap (§4.4) ahead of any
//! deserialization work.

use futures::{SinkExt, StreamExt};
use mesh_common::error::MeshError;
use mesh_control::ControlEnvelope;
use mesh_transport::MAX_ENVELOPE_PAYLOAD_BYTES;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_ENVELOPE_PAYLOAD_BYTES)
        .length_field_type::<u32>()
        .new_codec()
}

/// Write one `ControlEnvelope` as a length-delimited JSON frame.
pub async fn send_envelope<W: AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &ControlEnvelope,
) -> Result<(), MeshError> {
    let mut framed = FramedWrite::new(writer, codec());
    let bytes = serde_json::to_vec(envelope)
        .map_err(|e| MeshError::protocol_violation(format!("envelope encode failed: {e}")))?;
    framed
        .send(bytes.into())
        .await
        .map_err(|e| MeshError::transport_error(e.to_string()))
}

/// Read and decode one `ControlEnvelope` frame, enforcing the envelope
/// payload cap before JSON parsing runs.
pub async fn recv_envelope<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<ControlEnvelope>, MeshError> {
    let mut framed = FramedRead::new(reader, codec());
    let Some(frame) = framed.next().await else {
        return Ok(None);
    };
    let bytes = frame.map_err(|e| MeshError::transport_error(e.to_string()))?;
    mesh_transport::enforce_payload_cap(&bytes, MAX_ENVELOPE_PAYLOAD_BYTES)
        .map_err(|e| MeshError::protocol_violation(e.to_string()))?;
    let envelope: ControlEnvelope = serde_json::from_slice(&bytes)
        .map_err(|e| MeshError::protocol_violation(format!("envelope decode failed: {e}")))?;
    Ok(Some(envelope))
}
