//! Fehlertypen der Authentifizierung

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthFehler {
    #[error("Unbekanntes Recht: {0}")]
    UnbekanntesRecht(String),

    #[error("Unbekannter Hash-Algorithmus: {0}")]
    UnbekannterAlgorithmus(String),

    #[error("Cookie ungueltig")]
    CookieUngueltig,

    #[error("Cookie abgelaufen")]
    CookieAbgelaufen,

    #[error("Cookie widerrufen")]
    CookieWiderrufen,
}
