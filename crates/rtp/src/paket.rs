//! RTP-Paketkopf (RFC 3550)
//!
//! ## Format (12 Bytes, big-endian)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   V=2, P=0, X=0, CC=0  (konstant 0x80)
//!  1       1   M-Bit | Payload-Typ
//!  2       2   Sequenznummer
//!  4       4   Zeitstempel (Samples)
//!  8       4   SSRC
//! ```
//!
//! Direkte Byte-Serialisierung, kein serde.

use std::io;

/// Kopfgroesse in Bytes
pub const RTP_HEADER_LAENGE: usize = 12;

/// L16 stereo, 44.1 kHz (RFC 3551)
pub const PAYLOAD_TYP_STEREO: u8 = 10;
/// L16 mono, 44.1 kHz (RFC 3551)
pub const PAYLOAD_TYP_MONO: u8 = 11;

/// RTP-Paketkopf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// M-Bit: erstes Paket nach Start oder Fortsetzung
    pub marker: bool,
    /// Payload-Typ (10 = stereo, 11 = mono)
    pub payload_typ: u8,
    /// Sequenznummer, pro Paket inkrementiert (modulo 2^16)
    pub sequenz: u16,
    /// Zeitstempel in Samples
    pub zeitstempel: u32,
    /// Synchronisation Source, konstant pro Sitzung
    pub ssrc: u32,
}

impl RtpHeader {
    /// Serialisiert den Kopf (big-endian)
    pub fn encode(&self) -> [u8; RTP_HEADER_LAENGE] {
        let mut buf = [0u8; RTP_HEADER_LAENGE];
        buf[0] = 2 << 6; // V=2, P=0, X=0, CC=0
        buf[1] = self.payload_typ | if self.marker { 0x80 } else { 0 };
        buf[2..4].copy_from_slice(&self.sequenz.to_be_bytes());
        buf[4..8].copy_from_slice(&self.zeitstempel.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        buf
    }

    /// Deserialisiert einen Kopf (Tests, Diagnose)
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < RTP_HEADER_LAENGE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("RTP-Kopf zu kurz: {} Bytes", buf.len()),
            ));
        }
        if buf[0] >> 6 != 2 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Ungueltige RTP-Version: {}", buf[0] >> 6),
            ));
        }
        Ok(Self {
            marker: buf[1] & 0x80 != 0,
            payload_typ: buf[1] & 0x7f,
            sequenz: u16::from_be_bytes([buf[2], buf[3]]),
            zeitstempel: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }
}

/// Haengt Samples in Netz-Byte-Reihenfolge an einen Puffer an
pub fn samples_anhaengen(puffer: &mut Vec<u8>, samples: &[i16]) {
    puffer.reserve(samples.len() * 2);
    for sample in samples {
        puffer.extend_from_slice(&sample.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let kopf = RtpHeader {
            marker: true,
            payload_typ: PAYLOAD_TYP_STEREO,
            sequenz: 0xBEEF,
            zeitstempel: 0x0102_0304,
            ssrc: 0xCAFE_BABE,
        };
        let bytes = kopf.encode();
        assert_eq!(bytes.len(), RTP_HEADER_LAENGE);
        assert_eq!(RtpHeader::decode(&bytes).unwrap(), kopf);
    }

    #[test]
    fn byte_reihenfolge() {
        let kopf = RtpHeader {
            marker: false,
            payload_typ: PAYLOAD_TYP_MONO,
            sequenz: 0x0102,
            zeitstempel: 0x0304_0506,
            ssrc: 0x0708_090A,
        };
        let bytes = kopf.encode();
        assert_eq!(bytes[0], 0x80, "V=2 ohne P/X/CC");
        assert_eq!(bytes[1], 11);
        assert_eq!(&bytes[2..4], &[0x01, 0x02]);
        assert_eq!(&bytes[4..8], &[0x03, 0x04, 0x05, 0x06]);
        assert_eq!(&bytes[8..12], &[0x07, 0x08, 0x09, 0x0A]);
    }

    #[test]
    fn marker_bit_liegt_im_zweiten_byte() {
        let mut kopf = RtpHeader {
            marker: true,
            payload_typ: PAYLOAD_TYP_STEREO,
            sequenz: 0,
            zeitstempel: 0,
            ssrc: 0,
        };
        assert_eq!(kopf.encode()[1], 0x80 | 10);
        kopf.marker = false;
        assert_eq!(kopf.encode()[1], 10);
    }

    #[test]
    fn samples_landen_big_endian_im_puffer() {
        let mut puffer = Vec::new();
        samples_anhaengen(&mut puffer, &[0x0102, -2]);
        assert_eq!(puffer, vec![0x01, 0x02, 0xFF, 0xFE]);
    }

    #[test]
    fn decode_weist_fremde_version_ab() {
        let mut bytes = RtpHeader {
            marker: false,
            payload_typ: 10,
            sequenz: 0,
            zeitstempel: 0,
            ssrc: 0,
        }
        .encode();
        bytes[0] = 0x40; // V=1
        assert!(RtpHeader::decode(&bytes).is_err());
    }
}
