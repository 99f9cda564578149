//! Befehlsprotokoll fuer Musikbox
//!
//! Zeilenorientiertes Request/Response-Protokoll ueber TCP und
//! Unix-Sockets. Jede Verbindung beginnt mit der Begruessung
//! `231 2 <algorithmus> <hex-nonce>`; danach laufen Befehle mit
//! Shell-artigem Quoting durch die Dispatch-Tabelle in [`handler`].
//! Antworten bestehen aus drei Ziffern plus Text; mehrzeilige Antworten
//! enden mit einer einzelnen Punktzeile.

pub mod antwort;
pub mod fehler;
pub mod handler;
pub mod kontext;
pub mod verbindung;

pub use fehler::ProtokollFehler;
pub use kontext::{ProtokollKonfig, ServerKontext, SitzungsEintrag};
pub use verbindung::{verbindung_behandeln, Verbindung};

/// Protokollversion in der Begruessung
pub const PROTOKOLL_VERSION: u32 = 2;
