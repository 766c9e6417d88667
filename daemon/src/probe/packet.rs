/// Wire format of the Minecraft Server List Ping exchange.
///
/// Every packet is framed as `VarInt length | VarInt packet id | body`.  The
/// status exchange is:
///   1. client → handshake (id 0x00): protocol version, host, port, next state = 1
///   2. client → status request (id 0x00, empty body)
///   3. server → status response (id 0x00): one length-prefixed UTF-8 JSON string
///
/// Everything here works on in-memory buffers; socket I/O lives in the parent module.
use serde::Deserialize;
use thiserror::Error;

/// A VarInt never occupies more than five bytes on the wire.
pub const MAX_VARINT_LEN: usize = 5;
/// Upper bound for a single response frame. Real status payloads are a few KiB.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

const HANDSHAKE_PACKET_ID: i32 = 0x00;
const STATUS_PACKET_ID: i32 = 0x00;
/// "Any version": servers answer status requests regardless of the value.
const PROTOCOL_VERSION_ANY: i32 = -1;
const NEXT_STATE_STATUS: i32 = 1;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("VarInt is longer than 5 bytes")]
    VarIntTooLong,
    #[error("packet ended before all fields were read")]
    Truncated,
    #[error("frame of {0} bytes exceeds the 1 MiB limit")]
    FrameTooLarge(usize),
    #[error("negative length field: {0}")]
    NegativeLength(i32),
    #[error("unexpected packet id {0:#04x}")]
    UnexpectedPacket(i32),
    #[error("status payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("status payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The subset of the status JSON the daemon cares about.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub version: Option<ServerVersion>,
    pub players: Players,
}

#[derive(Debug, Deserialize)]
pub struct ServerVersion {
    pub name: String,
    pub protocol: i32,
}

#[derive(Debug, Deserialize)]
pub struct Players {
    pub online: u32,
    #[serde(default)]
    pub max: u32,
}

// ── VarInt ─────────────────────────────────────────────────────────────────────

/// Appends `value` to `buf` as a little-endian base-128 VarInt.
/// Negative values use the two's complement bit pattern (always five bytes).
pub fn write_varint(buf: &mut Vec<u8>, value: i32) {
    let mut remaining = value as u32;
    loop {
        if remaining & !0x7F == 0 {
            buf.push(remaining as u8);
            return;
        }
        buf.push((remaining & 0x7F) as u8 | 0x80);
        remaining >>= 7;
    }
}

/// Decodes a VarInt from the start of `bytes`.
/// Returns the value and the number of bytes consumed.
pub fn read_varint(bytes: &[u8]) -> Result<(i32, usize), PacketError> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().take(MAX_VARINT_LEN).enumerate() {
        value |= u32::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value as i32, i + 1));
        }
    }
    if bytes.len() >= MAX_VARINT_LEN {
        Err(PacketError::VarIntTooLong)
    } else {
        Err(PacketError::Truncated)
    }
}

/// Validates a frame length read off the wire and converts it to `usize`.
pub fn checked_frame_len(raw: i32) -> Result<usize, PacketError> {
    let len = usize::try_from(raw).map_err(|_| PacketError::NegativeLength(raw))?;
    if len > MAX_FRAME_LEN {
        return Err(PacketError::FrameTooLarge(len));
    }
    Ok(len)
}

// ── Outgoing packets ───────────────────────────────────────────────────────────

fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + MAX_VARINT_LEN);
    write_varint(&mut out, body.len() as i32);
    out.extend_from_slice(body);
    out
}

/// Builds the framed handshake packet announcing a status request for `host:port`.
pub fn handshake(host: &str, port: u16) -> Vec<u8> {
    let mut body = Vec::with_capacity(host.len() + 16);
    write_varint(&mut body, HANDSHAKE_PACKET_ID);
    write_varint(&mut body, PROTOCOL_VERSION_ANY);
    write_varint(&mut body, host.len() as i32);
    body.extend_from_slice(host.as_bytes());
    body.extend_from_slice(&port.to_be_bytes());
    write_varint(&mut body, NEXT_STATE_STATUS);
    frame(&body)
}

/// Builds the framed, empty-bodied status request packet.
pub fn status_request() -> Vec<u8> {
    let mut body = Vec::with_capacity(1);
    write_varint(&mut body, STATUS_PACKET_ID);
    frame(&body)
}

// ── Incoming packets ───────────────────────────────────────────────────────────

/// Decodes the body of a status response frame (everything after the length prefix).
pub fn decode_status(payload: &[u8]) -> Result<StatusResponse, PacketError> {
    let (packet_id, id_len) = read_varint(payload)?;
    if packet_id != STATUS_PACKET_ID {
        return Err(PacketError::UnexpectedPacket(packet_id));
    }
    let rest = payload.get(id_len..).ok_or(PacketError::Truncated)?;
    let (raw_len, len_len) = read_varint(rest)?;
    let json_len = checked_frame_len(raw_len)?;
    let json = rest
        .get(len_len..len_len + json_len)
        .ok_or(PacketError::Truncated)?;
    let text = std::str::from_utf8(json).map_err(|_| PacketError::InvalidUtf8)?;
    Ok(serde_json::from_str(text)?)
}
