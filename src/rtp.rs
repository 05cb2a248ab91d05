//! RFC 3550 RTP header parsing.
//!
//! Stateless byte-string → header fields + payload. No jitter buffer, no
//! NACK, no RTCP — this module only strips the wire framing.

use crate::error::RtpError;

const FIXED_HEADER_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub seq: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Payload type 0 — G.711 μ-law.
    pub fn is_ulaw(&self) -> bool {
        self.payload_type == 0
    }

    /// Payload type 8 — G.711 A-law.
    pub fn is_alaw(&self) -> bool {
        self.payload_type == 8
    }
}

/// Parses a raw RTP datagram.
///
/// Rejects packets shorter than the fixed 12-byte header, any version other
/// than 2, and a computed header size exceeding the packet length. CSRC
/// list, extension header and trailing padding are stripped from the
/// payload per RFC 3550 §5.1.
pub fn parse(b: &[u8]) -> Result<RtpPacket, RtpError> {
    if b.len() < FIXED_HEADER_LEN {
        return Err(RtpError::TooShort(b.len()));
    }

    let version = (b[0] >> 6) & 0x03;
    if version != 2 {
        return Err(RtpError::UnsupportedVersion(version));
    }
    let padding = (b[0] & 0x20) != 0;
    let extension = (b[0] & 0x10) != 0;
    let csrc_count = (b[0] & 0x0F) as usize;

    let marker = (b[1] & 0x80) != 0;
    let payload_type = b[1] & 0x7F;

    let seq = u16::from_be_bytes([b[2], b[3]]);
    let timestamp = u32::from_be_bytes([b[4], b[5], b[6], b[7]]);
    let ssrc = u32::from_be_bytes([b[8], b[9], b[10], b[11]]);

    let mut offset = FIXED_HEADER_LEN + csrc_count * 4;
    if offset > b.len() {
        return Err(RtpError::HeaderExceedsLength { header: offset, len: b.len() });
    }

    if extension {
        if offset + 4 > b.len() {
            return Err(RtpError::HeaderExceedsLength { header: offset + 4, len: b.len() });
        }
        let ext_len = u16::from_be_bytes([b[offset + 2], b[offset + 3]]) as usize;
        offset += 4 + ext_len * 4;
        if offset > b.len() {
            return Err(RtpError::HeaderExceedsLength { header: offset, len: b.len() });
        }
    }

    let mut end = b.len();
    if padding {
        let pad_len = *b.last().ok_or(RtpError::TooShort(b.len()))? as usize;
        if pad_len == 0 || offset + pad_len > end {
            return Err(RtpError::HeaderExceedsLength { header: offset + pad_len, len: b.len() });
        }
        end -= pad_len;
    }

    Ok(RtpPacket {
        version,
        padding,
        extension,
        marker,
        payload_type,
        seq,
        timestamp,
        ssrc,
        payload: b[offset..end].to_vec(),
    })
}
