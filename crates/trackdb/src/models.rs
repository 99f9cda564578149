//! Datensaetze der Titeldatenbank
//!
//! Reine Datenuebertragungsobjekte, getrennt von der Geschaeftslogik.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Titelkatalog
// ---------------------------------------------------------------------------

/// Ein Titel im Katalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitelRecord {
    /// Aufgeloester Pfad (Primaerschluessel)
    pub pfad: String,
    /// Laenge in Sekunden, falls bekannt
    pub laenge: Option<u64>,
    /// Wann der Titel in den Katalog aufgenommen wurde
    pub aufgenommen_am: DateTime<Utc>,
    /// Zugeordnete Tags
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Benutzer
// ---------------------------------------------------------------------------

/// Benutzer-Datensatz
///
/// Das Passwort bleibt ein opakes Geheimnis: der Challenge-Response der
/// Anmeldung hasht Nonce||Passwort, ein einseitig gespeicherter Hash kann
/// daran nicht teilnehmen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenutzerRecord {
    /// Benutzername (Primaerschluessel)
    pub username: String,
    /// Passwort-Geheimnis
    pub passwort: String,
    /// E-Mail-Adresse, falls hinterlegt
    pub email: Option<String>,
    /// Rechte als Textliste (z.B. "read,play,pause")
    pub rechte: String,
    /// Ausstehendes Bestaetigungs-Token einer Selbstregistrierung
    pub bestaetigung: Option<String>,
    /// Anlagezeitpunkt
    pub angelegt_am: DateTime<Utc>,
}

/// Editierbare Felder eines Benutzers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenutzerFeld {
    Email,
    Passwort,
    Rechte,
}

impl BenutzerFeld {
    pub fn parsen(s: &str) -> Option<Self> {
        match s {
            "email" => Some(Self::Email),
            "password" => Some(Self::Passwort),
            "rights" => Some(Self::Rechte),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Playlists
// ---------------------------------------------------------------------------

/// Freigabestufe einer Playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freigabe {
    /// Fuer alle lesbar
    Public,
    /// Nur fuer den Besitzer
    Private,
    /// Lesbar fuer alle, schreibbar nur fuer den Besitzer
    Shared,
}

impl Freigabe {
    pub fn parsen(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }

    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Shared => "shared",
        }
    }
}

/// Playlist-Datensatz
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistRecord {
    /// Playlist-Name (Primaerschluessel)
    pub name: String,
    /// Besitzer; `None` fuer globale Playlists
    pub besitzer: Option<String>,
    /// Freigabestufe
    pub freigabe: Freigabe,
    /// Titel in Reihenfolge
    pub titel: Vec<String>,
}

// ---------------------------------------------------------------------------
// Geplante Ereignisse
// ---------------------------------------------------------------------------

/// Aktion eines geplanten Ereignisses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "art", rename_all = "lowercase")]
pub enum PlanAktion {
    /// Einen Titel in die Warteschlange stellen
    Play { titel: String },
    /// Eine globale Vorliebe setzen (oder loeschen bei `wert = None`)
    SetGlobal { schluessel: String, wert: Option<String> },
}

/// Prioritaet eines geplanten Ereignisses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanPrioritaet {
    /// Wird bei verpasster Ausloesung nachgeholt
    Normal,
    /// Verfaellt bei verpasster Ausloesung
    Junk,
}

impl PlanPrioritaet {
    pub fn parsen(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "junk" => Some(Self::Junk),
            _ => None,
        }
    }

    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Junk => "junk",
        }
    }
}

/// Geplantes Ereignis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEintrag {
    /// Ereignis-ID (Primaerschluessel)
    pub id: String,
    /// Wer das Ereignis angelegt hat
    pub absender: String,
    /// Ausloesezeitpunkt
    pub ausloesung: DateTime<Utc>,
    /// Prioritaet
    pub prioritaet: PlanPrioritaet,
    /// Auszufuehrende Aktion
    pub aktion: PlanAktion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freigabe_parsen_und_formatieren() {
        for s in ["public", "private", "shared"] {
            let f = Freigabe::parsen(s).expect("bekannte Stufe muss parsen");
            assert_eq!(f.als_str(), s);
        }
        assert!(Freigabe::parsen("geheim").is_none());
    }

    #[test]
    fn benutzer_feld_parsen() {
        assert_eq!(BenutzerFeld::parsen("email"), Some(BenutzerFeld::Email));
        assert_eq!(BenutzerFeld::parsen("password"), Some(BenutzerFeld::Passwort));
        assert_eq!(BenutzerFeld::parsen("rights"), Some(BenutzerFeld::Rechte));
        assert!(BenutzerFeld::parsen("schuhgroesse").is_none());
    }

    #[test]
    fn plan_aktion_ist_serde_kompatibel() {
        let aktion = PlanAktion::Play {
            titel: "tracks/lied.ogg".into(),
        };
        let json = serde_json::to_string(&aktion).unwrap();
        let zurueck: PlanAktion = serde_json::from_str(&json).unwrap();
        assert_eq!(aktion, zurueck);
    }
}
