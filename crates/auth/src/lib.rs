//! Authentifizierung und Rechte fuer Musikbox
//!
//! Drei Bausteine: die Rechte-Bitmaske samt Aktionspruefungen, der
//! Challenge-Response-Hash der Anmeldung und die signierten Cookies fuer
//! verbindungsunabhaengige Sitzungen.

pub mod cookie;
pub mod fehler;
pub mod hash;
pub mod rechte;

pub use cookie::CookieFabrik;
pub use fehler::AuthFehler;
pub use hash::{antwort_hash, nonce_erzeugen, HashAlgorithmus, NONCE_LAENGE};
pub use rechte::{AktionsZiel, Recht, Rechte};
