//! Fehlertypen der TrackDB-Schnittstelle

use thiserror::Error;

/// Alle moeglichen Fehler beim Zugriff auf die Titeldatenbank
#[derive(Debug, Error)]
pub enum DbFehler {
    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Existiert bereits: {0}")]
    ExistiertBereits(String),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Zugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbFehler>;
