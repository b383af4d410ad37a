//! Legacy WebSocket version sniffing and upgrade responses.
//!
//! Browsers of the era spoke several incompatible WebSocket drafts. The
//! version is decided from the request headers alone, before any transport
//! code runs:
//!
//! | Header present | Version |
//! |----------------|---------|
//! | `Sec-WebSocket-Version: 7, 8 or 13` | [`ProtocolVersion::Hybi`] |
//! | `Sec-WebSocket-Key1` | [`ProtocolVersion::Hixie76`] |
//! | `Upgrade: websocket` | [`ProtocolVersion::Hixie75`] |
//! | none of the above | [`ProtocolVersion::SocketIo`] |
//!
//! The hixie-76 handshake proves the server read the request by returning an
//! MD5 digest computed from two obfuscated keys and eight body bytes. MD5 is
//! kept only for wire compatibility with those clients.

use http::{
    HeaderMap,
    HeaderName,
    HeaderValue,
    StatusCode,
    header::{
        CONNECTION,
        HOST,
        ORIGIN,
        SEC_WEBSOCKET_ACCEPT,
        SEC_WEBSOCKET_KEY,
        SEC_WEBSOCKET_PROTOCOL,
        SEC_WEBSOCKET_VERSION,
        UPGRADE,
    },
};
use md5::{Digest, Md5};
use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use super::HandshakeError;
use crate::{
    request::{TransportRequest, header_str},
    response::HttpReply,
};

/// First hixie-76 challenge key.
pub const SEC_WEBSOCKET_KEY1: HeaderName = HeaderName::from_static("sec-websocket-key1");
/// Second hixie-76 challenge key.
pub const SEC_WEBSOCKET_KEY2: HeaderName = HeaderName::from_static("sec-websocket-key2");
const SEC_WEBSOCKET_ORIGIN: HeaderName = HeaderName::from_static("sec-websocket-origin");
const SEC_WEBSOCKET_LOCATION: HeaderName = HeaderName::from_static("sec-websocket-location");
const WEBSOCKET_ORIGIN: HeaderName = HeaderName::from_static("websocket-origin");
const WEBSOCKET_LOCATION: HeaderName = HeaderName::from_static("websocket-location");

/// WebSocket dialect spoken by a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Unversioned path-based scheme; no upgrade takes place.
    SocketIo,
    /// Draft hixie-75: no key challenge.
    Hixie75,
    /// Draft hixie-76 (hybi-00): MD5 key challenge.
    Hixie76,
    /// Hybi drafts 7 and 8 and RFC 6455 (13).
    Hybi(u8),
}

impl ProtocolVersion {
    /// Whether this version uses the `0x00 .. 0xFF` byte framing.
    #[must_use]
    pub fn uses_legacy_framing(self) -> bool { matches!(self, Self::Hixie75 | Self::Hixie76) }
}

/// Reasons a hixie-76 key challenge cannot be answered.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LegacyChallengeError {
    /// A challenge key header, or the eight-byte body (key 3), is absent.
    #[error("key {key} is missing")]
    MissingKey { key: u8 },

    /// The key has no spaces, so the divisor would be zero.
    #[error("key {key} contains no spaces")]
    NoSpaces { key: u8 },

    /// The key's digits are not a multiple of its space count.
    #[error("key {key} is not divisible by its space count")]
    NotDivisible { key: u8 },

    /// The key's digits do not form a number, or the quotient exceeds 32 bits.
    #[error("key {key} is out of range")]
    OutOfRange { key: u8 },
}

const RFC6455_VERSIONS: [u8; 3] = [7, 8, 13];

/// Decide which WebSocket dialect the request speaks.
///
/// # Errors
///
/// Returns [`HandshakeError::UnsupportedVersion`] for a
/// `Sec-WebSocket-Version` other than 7, 8 or 13.
pub fn detect_legacy_version(headers: &HeaderMap) -> Result<ProtocolVersion, HandshakeError> {
    if let Some(raw) = headers.get(SEC_WEBSOCKET_VERSION) {
        return raw
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<u8>().ok())
            .filter(|v| RFC6455_VERSIONS.contains(v))
            .map(ProtocolVersion::Hybi)
            .ok_or_else(|| {
                let raw = String::from_utf8_lossy(raw.as_bytes()).into_owned();
                HandshakeError::UnsupportedVersion(raw)
            });
    }
    if headers.contains_key(SEC_WEBSOCKET_KEY1) {
        return Ok(ProtocolVersion::Hixie76);
    }
    let upgrade = header_str(headers, UPGRADE)
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("websocket"));
    if upgrade {
        return Ok(ProtocolVersion::Hixie75);
    }
    Ok(ProtocolVersion::SocketIo)
}

fn key_number(key: &str, index: u8) -> Result<u32, LegacyChallengeError> {
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let spaces = key.chars().filter(|c| *c == ' ').count();
    if spaces == 0 {
        return Err(LegacyChallengeError::NoSpaces { key: index });
    }
    let number: u64 = digits
        .parse()
        .map_err(|_| LegacyChallengeError::OutOfRange { key: index })?;
    let spaces = spaces as u64;
    if number % spaces != 0 {
        return Err(LegacyChallengeError::NotDivisible { key: index });
    }
    u32::try_from(number / spaces).map_err(|_| LegacyChallengeError::OutOfRange { key: index })
}

/// Answer a hixie-76 key challenge.
///
/// Each key's digits are read as a decimal number and divided by the key's
/// space count. The two quotients, packed as big-endian `u32`s and followed by
/// the eight request body bytes, are hashed with MD5.
///
/// # Errors
///
/// Returns a [`LegacyChallengeError`] naming the offending key.
///
/// # Examples
///
/// ```
/// use socketframe::handshake::legacy_challenge;
///
/// let digest = legacy_challenge("4 @1  46546xW%0l 1 5", "12998 5 Y3 1  .P00", b"^n:ds[4U").unwrap();
/// assert_eq!(&digest, b"8jKS'y:G*Co,Wxa-");
/// ```
pub fn legacy_challenge(
    key1: &str,
    key2: &str,
    body: &[u8; 8],
) -> Result<[u8; 16], LegacyChallengeError> {
    let first = key_number(key1, 1)?;
    let second = key_number(key2, 2)?;
    let mut hasher = Md5::new();
    hasher.update(first.to_be_bytes());
    hasher.update(second.to_be_bytes());
    hasher.update(body);
    let mut digest = [0_u8; 16];
    digest.copy_from_slice(&hasher.finalize());
    Ok(digest)
}

fn origin(headers: &HeaderMap) -> Result<HeaderValue, HandshakeError> {
    headers
        .get(ORIGIN)
        .cloned()
        .ok_or(HandshakeError::MissingHeader("Origin"))
}

fn challenge_key(
    headers: &HeaderMap,
    name: HeaderName,
    key: u8,
) -> Result<&str, LegacyChallengeError> {
    header_str(headers, name).ok_or(LegacyChallengeError::MissingKey { key })
}

fn location(request: &TransportRequest) -> Result<HeaderValue, HandshakeError> {
    let host = request.header(HOST).ok_or(HandshakeError::MissingHeader("Host"))?;
    let scheme = if request.secure { "wss" } else { "ws" };
    let location = match &request.query {
        Some(query) => format!("{scheme}://{host}{}?{query}", request.path),
        None => format!("{scheme}://{host}{}", request.path),
    };
    HeaderValue::try_from(location).map_err(|_| HandshakeError::InvalidHeader("Location"))
}

fn switching_protocols(upgrade: &'static str) -> HttpReply {
    HttpReply::new(StatusCode::SWITCHING_PROTOCOLS)
        .with_header(UPGRADE, HeaderValue::from_static(upgrade))
        .with_header(CONNECTION, HeaderValue::from_static("Upgrade"))
}

/// Build the `101` reply completing a WebSocket upgrade.
///
/// # Errors
///
/// Returns [`HandshakeError::UpgradeRequired`] for
/// [`ProtocolVersion::SocketIo`], [`HandshakeError::MissingHeader`] when a
/// header the dialect needs is absent, and
/// [`HandshakeError::LegacyChallenge`] when a hixie-76 key is missing or
/// cannot be answered.
pub fn upgrade_response(
    version: ProtocolVersion,
    request: &TransportRequest,
) -> Result<HttpReply, HandshakeError> {
    let headers = &request.headers;
    match version {
        ProtocolVersion::SocketIo => Err(HandshakeError::UpgradeRequired),
        ProtocolVersion::Hixie75 => Ok(switching_protocols("WebSocket")
            .with_reason("Web Socket Protocol Handshake")
            .with_header(WEBSOCKET_ORIGIN, origin(headers)?)
            .with_header(WEBSOCKET_LOCATION, location(request)?)),
        ProtocolVersion::Hixie76 => {
            let key1 = challenge_key(headers, SEC_WEBSOCKET_KEY1, 1)?;
            let key2 = challenge_key(headers, SEC_WEBSOCKET_KEY2, 2)?;
            let body: &[u8; 8] = request
                .body
                .get(..8)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or(LegacyChallengeError::MissingKey { key: 3 })?;
            let digest = legacy_challenge(key1, key2, body)?;
            let mut reply = switching_protocols("WebSocket")
                .with_reason("WebSocket Protocol Handshake")
                .with_header(SEC_WEBSOCKET_ORIGIN, origin(headers)?)
                .with_header(SEC_WEBSOCKET_LOCATION, location(request)?);
            if let Some(protocol) = headers.get(SEC_WEBSOCKET_PROTOCOL) {
                reply = reply.with_header(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
            }
            Ok(reply.with_body(digest.to_vec()))
        }
        ProtocolVersion::Hybi(_) => {
            let key = request
                .header(SEC_WEBSOCKET_KEY)
                .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key"))?;
            let accept = HeaderValue::try_from(derive_accept_key(key.trim().as_bytes()))
                .map_err(|_| HandshakeError::InvalidHeader("Sec-WebSocket-Accept"))?;
            Ok(switching_protocols("websocket").with_header(SEC_WEBSOCKET_ACCEPT, accept))
        }
    }
}
