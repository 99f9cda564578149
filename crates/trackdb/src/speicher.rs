//! In-Memory-Referenzimplementierung der TrackDB
//!
//! Der produktive Katalog ist ein externer Mitspieler hinter den Traits
//! aus [`crate::repository`]; diese Implementierung traegt den Server im
//! Alleinbetrieb und saemtliche Tests. Schluesselvergleiche laufen ueber
//! vollstaendige Strings, nie ueber Hashwerte allein.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::fehler::{DbFehler, DbResult};
use crate::models::{
    BenutzerRecord, Freigabe, PlanEintrag, PlaylistRecord, TitelRecord,
};
use crate::repository::{
    BenutzerRepository, PlanRepository, PlaylistRepository, TitelKatalog, VorliebenRepository,
};

/// Dateiendungen die als abspielbare Titel gelten
const TITEL_ENDUNGEN: &[&str] = &["ogg", "mp3", "flac", "wav", "aiff"];

#[derive(Default)]
struct Innen {
    titel: BTreeMap<String, TitelRecord>,
    aliase: HashMap<String, String>,
    vorlieben: HashMap<String, BTreeMap<String, String>>,
    globale: BTreeMap<String, String>,
    benutzer: BTreeMap<String, BenutzerRecord>,
    playlists: BTreeMap<String, PlaylistRecord>,
    plaene: BTreeMap<String, PlanEintrag>,
}

/// In-Memory-TrackDB
#[derive(Default)]
pub struct MemorySpeicher {
    innen: RwLock<Innen>,
}

impl MemorySpeicher {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Nimmt einen Titel in den Katalog auf (Rescan, Tests)
    pub async fn titel_aufnehmen(&self, pfad: &str, laenge: Option<u64>) {
        let mut innen = self.innen.write().await;
        innen.titel.entry(pfad.to_string()).or_insert(TitelRecord {
            pfad: pfad.to_string(),
            laenge,
            aufgenommen_am: Utc::now(),
            tags: Vec::new(),
        });
    }

    /// Hinterlegt einen Alias fuer einen Titel
    pub async fn alias_setzen(&self, alias: &str, pfad: &str) {
        let mut innen = self.innen.write().await;
        innen.aliase.insert(alias.to_string(), pfad.to_string());
    }

    /// Durchsucht ein Wurzelverzeichnis nach abspielbaren Dateien
    ///
    /// Wird nach einem Rescanner-Lauf aufgerufen um den Katalog mit dem
    /// Dateisystem abzugleichen. Gibt die Anzahl neuer Titel zurueck.
    pub async fn verzeichnis_aufnehmen(&self, wurzel: &Path) -> DbResult<usize> {
        let mut gefunden = Vec::new();
        let mut stapel = vec![wurzel.to_path_buf()];
        while let Some(verzeichnis) = stapel.pop() {
            let eintraege = match std::fs::read_dir(&verzeichnis) {
                Ok(e) => e,
                Err(fehler) => {
                    tracing::warn!(pfad = %verzeichnis.display(), fehler = %fehler,
                        "Verzeichnis nicht lesbar, uebersprungen");
                    continue;
                }
            };
            for eintrag in eintraege.flatten() {
                let pfad = eintrag.path();
                if pfad.is_dir() {
                    stapel.push(pfad);
                } else if pfad
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| TITEL_ENDUNGEN.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
                {
                    gefunden.push(pfad.to_string_lossy().into_owned());
                }
            }
        }

        let mut innen = self.innen.write().await;
        let vorher = innen.titel.len();
        for pfad in gefunden {
            innen.titel.entry(pfad.clone()).or_insert(TitelRecord {
                pfad,
                laenge: None,
                aufgenommen_am: Utc::now(),
                tags: Vec::new(),
            });
        }
        Ok(innen.titel.len() - vorher)
    }

    /// Setzt die Tags eines Titels (Rescan, Tests)
    pub async fn tags_setzen(&self, pfad: &str, tags: Vec<String>) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        match innen.titel.get_mut(pfad) {
            Some(t) => {
                t.tags = tags;
                Ok(())
            }
            None => Err(DbFehler::NichtGefunden(pfad.to_string())),
        }
    }
}

fn kanonisch(innen: &Innen, titel: &str) -> Option<String> {
    if innen.titel.contains_key(titel) {
        return Some(titel.to_string());
    }
    innen.aliase.get(titel).cloned()
}

/// Prueft ob `name` das optionale Muster (Teilstring, Gross/klein egal) trifft
fn trifft(name: &str, muster: Option<&str>) -> bool {
    match muster {
        Some(m) => name.to_lowercase().contains(&m.to_lowercase()),
        None => true,
    }
}

/// Direkte Kinder eines Verzeichnisses aus dem Katalog ableiten
fn kinder(innen: &Innen, verzeichnis: &str, nur_dateien: Option<bool>) -> Vec<String> {
    let praefix = if verzeichnis.is_empty() || verzeichnis == "/" {
        String::new()
    } else {
        format!("{}/", verzeichnis.trim_end_matches('/'))
    };

    let mut dateien = BTreeSet::new();
    let mut verzeichnisse = BTreeSet::new();
    for pfad in innen.titel.keys() {
        let rest = match pfad.strip_prefix(&praefix) {
            Some(r) if !praefix.is_empty() => r,
            _ if praefix.is_empty() => pfad.as_str(),
            _ => continue,
        };
        match rest.split_once('/') {
            Some((kind, _)) => {
                verzeichnisse.insert(format!("{praefix}{kind}"));
            }
            None => {
                dateien.insert(pfad.clone());
            }
        }
    }

    match nur_dateien {
        Some(true) => dateien.into_iter().collect(),
        Some(false) => verzeichnisse.into_iter().collect(),
        None => verzeichnisse.into_iter().chain(dateien).collect(),
    }
}

impl TitelKatalog for MemorySpeicher {
    async fn existiert(&self, titel: &str) -> DbResult<bool> {
        let innen = self.innen.read().await;
        Ok(kanonisch(&innen, titel).is_some())
    }

    async fn aufloesen(&self, titel: &str) -> DbResult<String> {
        let innen = self.innen.read().await;
        kanonisch(&innen, titel).ok_or_else(|| DbFehler::NichtGefunden(titel.to_string()))
    }

    async fn laenge(&self, titel: &str) -> DbResult<Option<u64>> {
        let innen = self.innen.read().await;
        let pfad = kanonisch(&innen, titel)
            .ok_or_else(|| DbFehler::NichtGefunden(titel.to_string()))?;
        Ok(innen.titel.get(&pfad).and_then(|t| t.laenge))
    }

    async fn teil(&self, titel: &str, _kontext: &str, teil: &str) -> DbResult<String> {
        let innen = self.innen.read().await;
        let pfad = kanonisch(&innen, titel)
            .ok_or_else(|| DbFehler::NichtGefunden(titel.to_string()))?;
        // Namensbestandteile aus der Pfadstruktur .../interpret/album/titel.endung
        let p = Path::new(&pfad);
        let wert = match teil {
            "title" => p
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            "album" => p
                .parent()
                .and_then(|e| e.file_name())
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            "artist" => p
                .parent()
                .and_then(|e| e.parent())
                .and_then(|e| e.file_name())
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            _ => String::new(),
        };
        Ok(wert)
    }

    async fn verzeichnisse(&self, verzeichnis: &str, muster: Option<&str>) -> DbResult<Vec<String>> {
        let innen = self.innen.read().await;
        Ok(kinder(&innen, verzeichnis, Some(false))
            .into_iter()
            .filter(|n| trifft(n, muster))
            .collect())
    }

    async fn dateien(&self, verzeichnis: &str, muster: Option<&str>) -> DbResult<Vec<String>> {
        let innen = self.innen.read().await;
        Ok(kinder(&innen, verzeichnis, Some(true))
            .into_iter()
            .filter(|n| trifft(n, muster))
            .collect())
    }

    async fn alle_dateien(&self, verzeichnis: &str, muster: Option<&str>) -> DbResult<Vec<String>> {
        let innen = self.innen.read().await;
        Ok(kinder(&innen, verzeichnis, None)
            .into_iter()
            .filter(|n| trifft(n, muster))
            .collect())
    }

    async fn suchen(&self, terme: &[String]) -> DbResult<Vec<String>> {
        if terme.is_empty() {
            return Err(DbFehler::UngueltigeEingabe("leere Suchanfrage".into()));
        }
        let innen = self.innen.read().await;
        let mut treffer = Vec::new();
        'titel: for t in innen.titel.values() {
            let pfad_klein = t.pfad.to_lowercase();
            for term in terme {
                if let Some(tag) = term.strip_prefix("tag:") {
                    if !t.tags.iter().any(|vorhanden| vorhanden == tag) {
                        continue 'titel;
                    }
                } else if !pfad_klein.contains(&term.to_lowercase()) {
                    continue 'titel;
                }
            }
            treffer.push(t.pfad.clone());
        }
        Ok(treffer)
    }

    async fn tags(&self) -> DbResult<Vec<String>> {
        let innen = self.innen.read().await;
        let mut alle: BTreeSet<String> = BTreeSet::new();
        for t in innen.titel.values() {
            alle.extend(t.tags.iter().cloned());
        }
        Ok(alle.into_iter().collect())
    }

    async fn neue_titel(&self, maximal: usize) -> DbResult<Vec<String>> {
        let innen = self.innen.read().await;
        let mut alle: Vec<&TitelRecord> = innen.titel.values().collect();
        alle.sort_by(|a, b| b.aufgenommen_am.cmp(&a.aufgenommen_am));
        Ok(alle.into_iter().take(maximal).map(|t| t.pfad.clone()).collect())
    }

    async fn alle_titel(&self) -> DbResult<Vec<TitelRecord>> {
        let innen = self.innen.read().await;
        Ok(innen.titel.values().cloned().collect())
    }

    async fn statistik(&self) -> DbResult<Vec<String>> {
        let innen = self.innen.read().await;
        Ok(vec![
            format!("tracks {}", innen.titel.len()),
            format!("aliases {}", innen.aliase.len()),
            format!("users {}", innen.benutzer.len()),
            format!("playlists {}", innen.playlists.len()),
            format!("scheduled {}", innen.plaene.len()),
        ])
    }

    async fn abgleichen(&self, wurzel: &std::path::Path) -> DbResult<usize> {
        self.verzeichnis_aufnehmen(wurzel).await
    }
}

impl VorliebenRepository for MemorySpeicher {
    async fn vorliebe(&self, titel: &str, schluessel: &str) -> DbResult<Option<String>> {
        let innen = self.innen.read().await;
        let pfad = kanonisch(&innen, titel)
            .ok_or_else(|| DbFehler::NichtGefunden(titel.to_string()))?;
        Ok(innen
            .vorlieben
            .get(&pfad)
            .and_then(|m| m.get(schluessel))
            .cloned())
    }

    async fn vorliebe_setzen(&self, titel: &str, schluessel: &str, wert: &str) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        let pfad = kanonisch(&innen, titel)
            .ok_or_else(|| DbFehler::NichtGefunden(titel.to_string()))?;
        innen
            .vorlieben
            .entry(pfad)
            .or_default()
            .insert(schluessel.to_string(), wert.to_string());
        Ok(())
    }

    async fn vorliebe_loeschen(&self, titel: &str, schluessel: &str) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        let pfad = kanonisch(&innen, titel)
            .ok_or_else(|| DbFehler::NichtGefunden(titel.to_string()))?;
        if let Some(m) = innen.vorlieben.get_mut(&pfad) {
            m.remove(schluessel);
        }
        Ok(())
    }

    async fn vorlieben(&self, titel: &str) -> DbResult<Vec<(String, String)>> {
        let innen = self.innen.read().await;
        let pfad = kanonisch(&innen, titel)
            .ok_or_else(|| DbFehler::NichtGefunden(titel.to_string()))?;
        Ok(innen
            .vorlieben
            .get(&pfad)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn global(&self, schluessel: &str) -> DbResult<Option<String>> {
        let innen = self.innen.read().await;
        Ok(innen.globale.get(schluessel).cloned())
    }

    async fn global_setzen(&self, schluessel: &str, wert: &str) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        innen.globale.insert(schluessel.to_string(), wert.to_string());
        Ok(())
    }

    async fn global_loeschen(&self, schluessel: &str) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        innen.globale.remove(schluessel);
        Ok(())
    }
}

impl BenutzerRepository for MemorySpeicher {
    async fn benutzer(&self, username: &str) -> DbResult<Option<BenutzerRecord>> {
        let innen = self.innen.read().await;
        Ok(innen.benutzer.get(username).cloned())
    }

    async fn benutzer_anlegen(&self, record: BenutzerRecord) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        if innen.benutzer.contains_key(&record.username) {
            return Err(DbFehler::ExistiertBereits(record.username));
        }
        innen.benutzer.insert(record.username.clone(), record);
        Ok(())
    }

    async fn benutzer_loeschen(&self, username: &str) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        innen
            .benutzer
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| DbFehler::NichtGefunden(username.to_string()))
    }

    async fn benutzer_aktualisieren(&self, record: BenutzerRecord) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        if !innen.benutzer.contains_key(&record.username) {
            return Err(DbFehler::NichtGefunden(record.username));
        }
        innen.benutzer.insert(record.username.clone(), record);
        Ok(())
    }

    async fn benutzer_liste(&self) -> DbResult<Vec<String>> {
        let innen = self.innen.read().await;
        Ok(innen.benutzer.keys().cloned().collect())
    }
}

impl PlaylistRepository for MemorySpeicher {
    async fn playlist(&self, name: &str) -> DbResult<Option<PlaylistRecord>> {
        let innen = self.innen.read().await;
        Ok(innen.playlists.get(name).cloned())
    }

    async fn playlist_setzen(&self, record: PlaylistRecord) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        innen.playlists.insert(record.name.clone(), record);
        Ok(())
    }

    async fn playlist_freigabe_setzen(&self, name: &str, freigabe: Freigabe) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        match innen.playlists.get_mut(name) {
            Some(p) => {
                p.freigabe = freigabe;
                Ok(())
            }
            None => Err(DbFehler::NichtGefunden(name.to_string())),
        }
    }

    async fn playlist_loeschen(&self, name: &str) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        innen
            .playlists
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DbFehler::NichtGefunden(name.to_string()))
    }

    async fn playlist_liste(&self, betrachter: Option<&str>) -> DbResult<Vec<String>> {
        let innen = self.innen.read().await;
        Ok(innen
            .playlists
            .values()
            .filter(|p| match p.freigabe {
                Freigabe::Public | Freigabe::Shared => true,
                Freigabe::Private => p.besitzer.as_deref() == betrachter,
            })
            .map(|p| p.name.clone())
            .collect())
    }
}

impl PlanRepository for MemorySpeicher {
    async fn plan_liste(&self) -> DbResult<Vec<String>> {
        let innen = self.innen.read().await;
        Ok(innen.plaene.keys().cloned().collect())
    }

    async fn plan(&self, id: &str) -> DbResult<Option<PlanEintrag>> {
        let innen = self.innen.read().await;
        Ok(innen.plaene.get(id).cloned())
    }

    async fn plan_anlegen(&self, eintrag: PlanEintrag) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        if innen.plaene.contains_key(&eintrag.id) {
            return Err(DbFehler::ExistiertBereits(eintrag.id));
        }
        innen.plaene.insert(eintrag.id.clone(), eintrag);
        Ok(())
    }

    async fn plan_loeschen(&self, id: &str) -> DbResult<()> {
        let mut innen = self.innen.write().await;
        innen
            .plaene
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| DbFehler::NichtGefunden(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn speicher_mit_titeln() -> MemorySpeicher {
        let s = MemorySpeicher::neu();
        s.titel_aufnehmen("tracks/abba/arrival/dancing-queen.ogg", Some(231))
            .await;
        s.titel_aufnehmen("tracks/abba/arrival/money-money-money.ogg", None)
            .await;
        s.titel_aufnehmen("tracks/opeth/damnation/windowpane.flac", Some(465))
            .await;
        s
    }

    #[tokio::test]
    async fn aufloesen_kennt_aliase() {
        let s = speicher_mit_titeln().await;
        s.alias_setzen("dq", "tracks/abba/arrival/dancing-queen.ogg")
            .await;
        assert_eq!(
            s.aufloesen("dq").await.unwrap(),
            "tracks/abba/arrival/dancing-queen.ogg"
        );
        assert!(s.aufloesen("unbekannt").await.is_err());
    }

    #[tokio::test]
    async fn verzeichnisse_und_dateien() {
        let s = speicher_mit_titeln().await;
        let verzeichnisse = s.verzeichnisse("tracks", None).await.unwrap();
        assert_eq!(verzeichnisse, vec!["tracks/abba", "tracks/opeth"]);

        let dateien = s.dateien("tracks/abba/arrival", None).await.unwrap();
        assert_eq!(dateien.len(), 2);

        let gefiltert = s.dateien("tracks/abba/arrival", Some("queen")).await.unwrap();
        assert_eq!(gefiltert.len(), 1);
    }

    #[tokio::test]
    async fn suche_und_tags() {
        let s = speicher_mit_titeln().await;
        s.tags_setzen(
            "tracks/opeth/damnation/windowpane.flac",
            vec!["prog".into(), "ruhig".into()],
        )
        .await
        .unwrap();

        let treffer = s.suchen(&["opeth".into()]).await.unwrap();
        assert_eq!(treffer.len(), 1);

        let treffer = s.suchen(&["tag:prog".into()]).await.unwrap();
        assert_eq!(treffer.len(), 1);

        let treffer = s
            .suchen(&["abba".into(), "money".into()])
            .await
            .unwrap();
        assert_eq!(treffer.len(), 1, "Terme sind UND-verknuepft");

        assert_eq!(s.tags().await.unwrap(), vec!["prog", "ruhig"]);
    }

    #[tokio::test]
    async fn teil_liefert_namensbestandteile() {
        let s = speicher_mit_titeln().await;
        let titel = "tracks/abba/arrival/dancing-queen.ogg";
        assert_eq!(s.teil(titel, "display", "title").await.unwrap(), "dancing-queen");
        assert_eq!(s.teil(titel, "display", "album").await.unwrap(), "arrival");
        assert_eq!(s.teil(titel, "display", "artist").await.unwrap(), "abba");
    }

    #[tokio::test]
    async fn vorlieben_setzen_loeschen() {
        let s = speicher_mit_titeln().await;
        let titel = "tracks/abba/arrival/dancing-queen.ogg";

        assert_eq!(s.vorliebe(titel, "weight").await.unwrap(), None);
        s.vorliebe_setzen(titel, "weight", "90000").await.unwrap();
        assert_eq!(
            s.vorliebe(titel, "weight").await.unwrap().as_deref(),
            Some("90000")
        );
        s.vorliebe_loeschen(titel, "weight").await.unwrap();
        assert_eq!(s.vorliebe(titel, "weight").await.unwrap(), None);
    }

    #[tokio::test]
    async fn benutzer_lebenszyklus() {
        let s = MemorySpeicher::neu();
        let record = BenutzerRecord {
            username: "alice".into(),
            passwort: "geheim".into(),
            email: None,
            rechte: "read,play".into(),
            bestaetigung: None,
            angelegt_am: Utc::now(),
        };
        s.benutzer_anlegen(record.clone()).await.unwrap();
        assert!(matches!(
            s.benutzer_anlegen(record).await,
            Err(DbFehler::ExistiertBereits(_))
        ));
        assert!(s.benutzer("alice").await.unwrap().is_some());
        s.benutzer_loeschen("alice").await.unwrap();
        assert!(s.benutzer("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn playlist_sichtbarkeit() {
        let s = MemorySpeicher::neu();
        s.playlist_setzen(PlaylistRecord {
            name: "alice.privat".into(),
            besitzer: Some("alice".into()),
            freigabe: Freigabe::Private,
            titel: vec![],
        })
        .await
        .unwrap();
        s.playlist_setzen(PlaylistRecord {
            name: "party".into(),
            besitzer: Some("bob".into()),
            freigabe: Freigabe::Public,
            titel: vec![],
        })
        .await
        .unwrap();

        assert_eq!(s.playlist_liste(Some("alice")).await.unwrap().len(), 2);
        assert_eq!(s.playlist_liste(Some("bob")).await.unwrap().len(), 1);
        assert_eq!(s.playlist_liste(None).await.unwrap().len(), 1);
    }
}
