//! Gemeinsamer Fehlertyp der Basisschicht

use thiserror::Error;

/// Fehler die in mehreren Crates auftreten koennen
#[derive(Debug, Error)]
pub enum KernFehler {
    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KernFehler>;
