//! Fehlertypen des Protokolls
//!
//! Jeder Fehler kennt seinen Drahtcode; die Verbindung laeuft nach einem
//! Fehler grundsaetzlich weiter.

use thiserror::Error;

// Die Display-Texte landen auf dem Draht und bleiben darum englisch
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown command")]
    UnbekannterBefehl,

    #[error("missing argument(s)")]
    ZuWenigArgumente,

    #[error("too many arguments")]
    ZuVieleArgumente,

    #[error("{0}")]
    NichtAutorisiert(String),

    #[error("authentication failed")]
    AuthFehlgeschlagen,

    #[error("{0}")]
    UngueltigeEingabe(String),

    #[error("not set")]
    NichtGesetzt,

    #[error("database error")]
    Datenbank(#[from] musikbox_trackdb::DbFehler),
}

impl ProtokollFehler {
    /// Drahtcode der Antwortzeile
    pub fn protokoll_code(&self) -> u16 {
        match self {
            Self::Parse(_)
            | Self::UnbekannterBefehl
            | Self::ZuWenigArgumente
            | Self::ZuVieleArgumente => 500,
            Self::NichtAutorisiert(_) => 510,
            Self::AuthFehlgeschlagen => 530,
            Self::UngueltigeEingabe(_) => 550,
            Self::NichtGesetzt => 555,
            Self::Datenbank(musikbox_trackdb::DbFehler::ZugriffVerweigert(_)) => 510,
            Self::Datenbank(_) => 550,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_pro_fehlerklasse() {
        assert_eq!(ProtokollFehler::UnbekannterBefehl.protokoll_code(), 500);
        assert_eq!(
            ProtokollFehler::NichtAutorisiert("x".into()).protokoll_code(),
            510
        );
        assert_eq!(ProtokollFehler::AuthFehlgeschlagen.protokoll_code(), 530);
        assert_eq!(
            ProtokollFehler::UngueltigeEingabe("x".into()).protokoll_code(),
            550
        );
        assert_eq!(ProtokollFehler::NichtGesetzt.protokoll_code(), 555);
    }
}
