//! Fehlertypen des Mixers

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MixerFehler {
    #[error("Kein Dekoder fuer '{0}' konfiguriert")]
    KeinDekoder(String),

    #[error("Backend-Fehler: {0}")]
    Backend(String),

    #[error("RTP-Fehler: {0}")]
    Rtp(#[from] musikbox_rtp::SendeFehler),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}
