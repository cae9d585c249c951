// Copyright (c) 2024 Mesh Overlay Contributors

//! The generic per-connection reactive loop (§4.5/§4.6): read an envelope,
//! verify it, dispatch it, write back whatever response the handler
//! produced. Used for every connection after its first `HELLO` has been
//! exchanged, by both the dialing and the accepting side alike.

use mesh_common::error::MeshResult;
use mesh_control::{verify_envelope, ControlEnvelope, PeerContext};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{recv_envelope, send_envelope};
use crate::dispatch::dispatch_async;
use crate::state::NodeState;
use crate::time::now_ms;

/// Read and verify the next envelope off `recv`, erroring (rather than
/// looping) on a verification failure: an envelope that fails replay/skew/
/// signature checks ends the session instead of being silently skipped, since
/// the same failure will keep recurring on a misbehaving or desynced peer.
pub(crate) async fn recv_verified<R: AsyncRead + Unpin>(
    recv: &mut R,
    ctx: &PeerContext,
    state: &NodeState,
) -> MeshResult<Option<ControlEnvelope>> {
    let Some(envelope) = recv_envelope(recv).await? else {
        return Ok(None);
    };
    let now = now_ms();
    let max_skew_ms = state.config.control.max_clock_skew.as_millis() as u64;
    {
        let mut replay = state.replay.lock().await;
        verify_envelope(&envelope, ctx, &mut replay, now, max_skew_ms)?;
    }
    Ok(Some(envelope))
}

/// Run the generic receive/dispatch/respond loop until the peer closes the
/// stream or sends something that fails verification.
pub async fn run_passive_session<R, W>(
    mut recv: R,
    mut send: W,
    ctx: PeerContext,
    state: &NodeState,
) -> MeshResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let Some(envelope) = recv_verified(&mut recv, &ctx, state).await? else {
            return Ok(());
        };
        let now = now_ms();
        match dispatch_async(&envelope, &ctx, state, now).await {
            Ok(Some(response)) => send_envelope(&mut send, &response).await?,
            Ok(None) => {}
            Err(e) if e.is_silent() => {
                tracing::debug!(peer = %ctx.peer_id, error = %e, "envelope dropped");
            }
            Err(e) => return Err(e),
        }
    }
}
