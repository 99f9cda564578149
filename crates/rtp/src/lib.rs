//! RTP-Versand fuer Musikbox
//!
//! Paketiert dekodiertes PCM als RTP (RFC 3550/3551, L16) und haelt den
//! 32-Bit-Drahtzeitstempel auch ueber Leerlaufphasen hinweg synchron zur
//! Wanduhr, damit Empfaenger die richtige Stille einlegen.

pub mod paket;
pub mod sender;

pub use paket::{RtpHeader, PAYLOAD_TYP_MONO, PAYLOAD_TYP_STEREO, RTP_HEADER_LAENGE};
pub use sender::{RtpKonfig, RtpSender, SendeFehler};
