//! Repository-Trait-Definitionen
//!
//! Das Repository-Pattern entkoppelt den Kern von der konkreten
//! Datenbank. Der Server haelt genau eine Implementierung und reicht sie
//! generisch an die Protokoll-Handler weiter; [`TrackDb`] buendelt alle
//! Teil-Traits zu der einen Schranke die dort gebraucht wird.

use crate::fehler::DbResult;
use crate::models::{
    BenutzerRecord, Freigabe, PlanEintrag, PlaylistRecord, TitelRecord,
};

/// Zugriff auf den Titelkatalog
#[allow(async_fn_in_trait)]
pub trait TitelKatalog: Send + Sync {
    /// Prueft ob ein Titel (oder Alias) im Katalog ist
    async fn existiert(&self, titel: &str) -> DbResult<bool>;

    /// Loest einen Titelnamen (ggf. Alias) in den kanonischen Pfad auf
    async fn aufloesen(&self, titel: &str) -> DbResult<String>;

    /// Laenge eines Titels in Sekunden, falls bekannt
    async fn laenge(&self, titel: &str) -> DbResult<Option<u64>>;

    /// Namensbestandteil eines Titels (z.B. "title", "artist", "album")
    ///
    /// `kontext` ist "display" oder "sort".
    async fn teil(&self, titel: &str, kontext: &str, teil: &str) -> DbResult<String>;

    /// Unterverzeichnisse eines Verzeichnisses
    async fn verzeichnisse(&self, verzeichnis: &str, muster: Option<&str>) -> DbResult<Vec<String>>;

    /// Abspielbare Dateien eines Verzeichnisses
    async fn dateien(&self, verzeichnis: &str, muster: Option<&str>) -> DbResult<Vec<String>>;

    /// Dateien und Verzeichnisse zusammen
    async fn alle_dateien(&self, verzeichnis: &str, muster: Option<&str>) -> DbResult<Vec<String>>;

    /// Volltextsuche; Terme werden UND-verknuepft, `tag:x` filtert auf Tags
    async fn suchen(&self, terme: &[String]) -> DbResult<Vec<String>>;

    /// Alle bekannten Tags
    async fn tags(&self) -> DbResult<Vec<String>>;

    /// Zuletzt in den Katalog aufgenommene Titel, neueste zuerst
    async fn neue_titel(&self, maximal: usize) -> DbResult<Vec<String>>;

    /// Vollstaendige Titelliste (fuer die Zufallswahl)
    async fn alle_titel(&self) -> DbResult<Vec<TitelRecord>>;

    /// Kennzahlen der Datenbank als Textzeilen
    async fn statistik(&self) -> DbResult<Vec<String>>;

    /// Gleicht den Katalog nach einem Rescanner-Lauf mit dem Dateisystem
    /// ab; gibt die Anzahl neuer Titel zurueck
    async fn abgleichen(&self, wurzel: &std::path::Path) -> DbResult<usize>;
}

/// Zugriff auf Titel- und globale Vorlieben
#[allow(async_fn_in_trait)]
pub trait VorliebenRepository: Send + Sync {
    /// Liest eine Vorliebe eines Titels; `None` heisst "nie gesetzt"
    async fn vorliebe(&self, titel: &str, schluessel: &str) -> DbResult<Option<String>>;

    /// Setzt eine Vorliebe eines Titels
    async fn vorliebe_setzen(&self, titel: &str, schluessel: &str, wert: &str) -> DbResult<()>;

    /// Loescht eine Vorliebe eines Titels
    async fn vorliebe_loeschen(&self, titel: &str, schluessel: &str) -> DbResult<()>;

    /// Alle Vorlieben eines Titels
    async fn vorlieben(&self, titel: &str) -> DbResult<Vec<(String, String)>>;

    /// Liest eine globale Vorliebe
    async fn global(&self, schluessel: &str) -> DbResult<Option<String>>;

    /// Setzt eine globale Vorliebe
    async fn global_setzen(&self, schluessel: &str, wert: &str) -> DbResult<()>;

    /// Loescht eine globale Vorliebe
    async fn global_loeschen(&self, schluessel: &str) -> DbResult<()>;
}

/// Zugriff auf Benutzerkonten
#[allow(async_fn_in_trait)]
pub trait BenutzerRepository: Send + Sync {
    /// Laedt einen Benutzer; `None` wenn unbekannt
    async fn benutzer(&self, username: &str) -> DbResult<Option<BenutzerRecord>>;

    /// Legt einen Benutzer an; schlaegt fehl wenn er schon existiert
    async fn benutzer_anlegen(&self, record: BenutzerRecord) -> DbResult<()>;

    /// Loescht einen Benutzer
    async fn benutzer_loeschen(&self, username: &str) -> DbResult<()>;

    /// Ueberschreibt einen bestehenden Benutzer
    async fn benutzer_aktualisieren(&self, record: BenutzerRecord) -> DbResult<()>;

    /// Alle Benutzernamen, sortiert
    async fn benutzer_liste(&self) -> DbResult<Vec<String>>;
}

/// Zugriff auf Playlists
#[allow(async_fn_in_trait)]
pub trait PlaylistRepository: Send + Sync {
    /// Laedt eine Playlist
    async fn playlist(&self, name: &str) -> DbResult<Option<PlaylistRecord>>;

    /// Legt eine Playlist an oder ueberschreibt ihre Titel
    async fn playlist_setzen(&self, record: PlaylistRecord) -> DbResult<()>;

    /// Aendert nur die Freigabestufe
    async fn playlist_freigabe_setzen(&self, name: &str, freigabe: Freigabe) -> DbResult<()>;

    /// Loescht eine Playlist
    async fn playlist_loeschen(&self, name: &str) -> DbResult<()>;

    /// Namen aller fuer `betrachter` sichtbaren Playlists
    async fn playlist_liste(&self, betrachter: Option<&str>) -> DbResult<Vec<String>>;
}

/// Zugriff auf geplante Ereignisse
#[allow(async_fn_in_trait)]
pub trait PlanRepository: Send + Sync {
    /// IDs aller anstehenden Ereignisse
    async fn plan_liste(&self) -> DbResult<Vec<String>>;

    /// Laedt ein Ereignis
    async fn plan(&self, id: &str) -> DbResult<Option<PlanEintrag>>;

    /// Legt ein Ereignis an
    async fn plan_anlegen(&self, eintrag: PlanEintrag) -> DbResult<()>;

    /// Loescht ein Ereignis
    async fn plan_loeschen(&self, id: &str) -> DbResult<()>;
}

/// Die eine Schranke die der Kern konsumiert
pub trait TrackDb:
    TitelKatalog
    + VorliebenRepository
    + BenutzerRepository
    + PlaylistRepository
    + PlanRepository
    + Send
    + Sync
    + 'static
{
}

impl<T> TrackDb for T where
    T: TitelKatalog
        + VorliebenRepository
        + BenutzerRepository
        + PlaylistRepository
        + PlanRepository
        + Send
        + Sync
        + 'static
{
}
