//! Fehlertypen der Warteschlange

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueFehler {
    #[error("Kein Eintrag mit ID {0}")]
    UnbekannteId(String),

    #[error("Der spielende Eintrag laesst sich nicht verschieben")]
    SpielendUnverschiebbar,

    #[error("Marshalling-Fehler: {0}")]
    Marshalling(String),
}
