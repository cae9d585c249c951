// Copyright (c) 2024 Mesh Overlay Contributors

//! Minimal SOCKS5 CONNECT client (§4.4) for dialing through a local Tor or
//! I2P proxy. Always uses SOCKS5 remote (proxy-side) hostname resolution —
//! the hostname is never resolved locally, which is what prevents the
//! anonymity network's DNS-leak class of bug.

use std::net::IpAddr;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use mesh_common::PeerId;
use mesh_directory::TransportKind;

use crate::error::{TransportError, TransportResult};

const SOCKS_VERSION: u8 = 0x05;
const AUTH_USERNAME_PASSWORD: u8 = 0x02;
const AUTH_NO_ACCEPTABLE_METHODS: u8 = 0xff;
const CMD_CONNECT: u8 = 0x01;
const ATYP_DOMAIN_NAME: u8 = 0x03;
const REPLY_SUCCEEDED: u8 = 0x00;

/// Per-peer SOCKS5 username/password, deterministically derived from the
/// target `PeerId` so each peer gets its own Tor circuit (stream isolation).
pub fn derive_stream_isolation_credentials(peer_id: &PeerId) -> (String, String) {
    let mut hasher = Sha256::new();
    hasher.update(b"mesh-overlay-stream-isolation-username");
    hasher.update(peer_id.as_str().as_bytes());
    let username = hex::encode(&hasher.finalize()[..16]);

    let mut hasher = Sha256::new();
    hasher.update(b"mesh-overlay-stream-isolation-password");
    hasher.update(peer_id.as_str().as_bytes());
    let password = hex::encode(&hasher.finalize()[..16]);

    (username, password)
}

/// Reject hosts that would defeat the point of routing over an anonymizing
/// transport: IP literals (nothing to anonymize) and anything not matching
/// the transport kind's required suffix (§4.4 DNS-leak guard / domain policy).
pub fn validate_host_for_transport(host: &str, kind: TransportKind) -> TransportResult<()> {
    if kind.is_anonymizing() && host.parse::<IpAddr>().is_ok() {
        return Err(TransportError::NonAnonymizingHost {
            host: host.to_string(),
            expected_suffix: if kind == TransportKind::TorOnionQuic {
                ".onion"
            } else {
                ".i2p"
            },
        });
    }
    if !kind.host_satisfies_policy(host) {
        return Err(TransportError::NonAnonymizingHost {
            host: host.to_string(),
            expected_suffix: if kind == TransportKind::TorOnionQuic {
                ".onion"
            } else {
                ".i2p"
            },
        });
    }
    Ok(())
}

/// Open a TCP stream to `proxy_addr` and negotiate a SOCKS5 CONNECT to
/// `target_host:target_port` using username/password auth, with the proxy
/// performing DNS resolution. Returns the established stream on success.
pub async fn connect_via_socks5(
    proxy_addr: std::net::SocketAddr,
    target_host: &str,
    target_port: u16,
    username: &str,
    password: &str,
) -> TransportResult<TcpStream> {
    let mut stream = TcpStream::connect(proxy_addr)
        .await
        .map_err(|e| TransportError::SocksFailure(e.to_string()))?;

    // Greeting: offer username/password auth only.
    stream
        .write_all(&[SOCKS_VERSION, 1, AUTH_USERNAME_PASSWORD])
        .await?;
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[0] != SOCKS_VERSION || reply[1] == AUTH_NO_ACCEPTABLE_METHODS {
        return Err(TransportError::SocksFailure(
            "proxy rejected username/password auth".into(),
        ));
    }

    // Username/password subnegotiation (RFC 1929).
    let mut auth = vec![0x01, username.len() as u8];
    auth.extend_from_slice(username.as_bytes());
    auth.push(password.len() as u8);
    auth.extend_from_slice(password.as_bytes());
    stream.write_all(&auth).await?;
    let mut auth_reply = [0u8; 2];
    stream.read_exact(&mut auth_reply).await?;
    if auth_reply[1] != 0x00 {
        return Err(TransportError::SocksFailure(
            "proxy rejected credentials".into(),
        ));
    }

    // CONNECT request with ATYP=DOMAINNAME so resolution happens proxy-side.
    let mut request = vec![SOCKS_VERSION, CMD_CONNECT, 0x00, ATYP_DOMAIN_NAME];
    request.push(target_host.len() as u8);
    request.extend_from_slice(target_host.as_bytes());
    request.extend_from_slice(&target_port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err(TransportError::SocksFailure(
            "malformed SOCKS5 reply version".into(),
        ));
    }
    if header[1] != REPLY_SUCCEEDED {
        return Err(TransportError::SocksFailure(format!(
            "proxy returned reply code {}",
            header[1]
        )));
    }

    // Drain the bound-address field before handing the stream back.
    let skip = match header[3] {
        0x01 => 4 + 2,                    // IPv4 + port
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize + 2
        }
        0x04 => 16 + 2, // IPv6 + port
        other => {
            return Err(TransportError::SocksFailure(format!(
                "unsupported bound address type {other}"
            )))
        }
    };
    let mut discard = vec![0u8; skip];
    stream.read_exact(&mut discard).await?;

    Ok(stream)
}
