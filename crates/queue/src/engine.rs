//! Die Warteschlangen-Engine
//!
//! Zustandsmaschine pro Eintrag:
//! `unplayed -> prepared -> started -> {ok|scratched|failed}` mit
//! `paused` erreichbar aus `started`. Hoechstens ein Eintrag traegt
//! `started` oder `paused`; finale Eintraege wandern in die begrenzte
//! Liste der kuerzlich gespielten Titel und kehren nie zurueck.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use musikbox_core::{EintragsId, IdQuelle};
use musikbox_eventlog::{ereignis, EventLog};
use rand::seq::SliceRandom;

use crate::eintrag::{AbspielStatus, Herkunft, QueueEintrag};
use crate::fehler::QueueFehler;
use crate::zufall::ZufallsWaehler;

/// Konfiguration der Engine
#[derive(Debug, Clone)]
pub struct WarteschlangenKonfig {
    /// Zielbestand an anstehenden Titeln (Zufalls-Nachschub)
    pub queue_pad: usize,
    /// Obergrenze der Liste kuerzlich gespielter Titel
    pub historie: usize,
    /// Mindestabstand in Sekunden bevor ein Titel erneut zufaellig faellt
    pub replay_min: i64,
    /// Konfigurierte Scratch-Jingles
    pub scratch_jingles: Vec<String>,
}

impl Default for WarteschlangenKonfig {
    fn default() -> Self {
        Self {
            queue_pad: 10,
            historie: 60,
            replay_min: 8 * 3600,
            scratch_jingles: Vec::new(),
        }
    }
}

/// Ergebnis eines Pausier-Versuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PausenErgebnis {
    Pausiert,
    SchonPausiert,
    NichtsSpielt,
    NichtPausiert,
}

/// Einfuegeposition beim Einreihen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EinreihPosition {
    /// Ganz nach vorn (Scratch-Jingles)
    Anfang,
    /// Vor den ersten Zufallseintrag (normale `play`-Auftraege)
    VorZufall,
    /// Hinter den genannten Eintrag
    Nach(EintragsId),
    /// Ganz ans Ende (Zufalls-Nachschub)
    Ende,
}

/// Die Warteschlange samt spielendem Eintrag und Kuerzlich-Liste
pub struct Warteschlange {
    konfig: WarteschlangenKonfig,
    ids: IdQuelle,
    log: EventLog,
    anstehend: VecDeque<QueueEintrag>,
    spielend: Option<QueueEintrag>,
    kuerzlich: VecDeque<QueueEintrag>,
    laengen: HashMap<String, u64>,
    abspielen_aktiv: bool,
    zufall_aktiv: bool,
}

impl Warteschlange {
    pub fn neu(konfig: WarteschlangenKonfig, log: EventLog) -> Self {
        let startzeit = Utc::now().timestamp().max(0) as u64;
        Self {
            konfig,
            ids: IdQuelle::neu(startzeit),
            log,
            anstehend: VecDeque::new(),
            spielend: None,
            kuerzlich: VecDeque::new(),
            laengen: HashMap::new(),
            abspielen_aktiv: true,
            zufall_aktiv: true,
        }
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn spielend(&self) -> Option<&QueueEintrag> {
        self.spielend.as_ref()
    }

    pub fn anstehende(&self) -> impl Iterator<Item = &QueueEintrag> {
        self.anstehend.iter()
    }

    pub fn kuerzliche(&self) -> impl Iterator<Item = &QueueEintrag> {
        self.kuerzlich.iter()
    }

    /// Sucht einen anstehenden Eintrag
    pub fn finden(&self, id: &EintragsId) -> Option<&QueueEintrag> {
        self.anstehend.iter().find(|e| &e.id == id)
    }

    pub fn ist_pausiert(&self) -> bool {
        matches!(
            self.spielend.as_ref().map(|e| e.status),
            Some(AbspielStatus::Paused)
        )
    }

    pub fn abspielen_aktiv(&self) -> bool {
        self.abspielen_aktiv
    }

    pub fn zufall_aktiv(&self) -> bool {
        self.zufall_aktiv
    }

    // -----------------------------------------------------------------------
    // Einreihen
    // -----------------------------------------------------------------------

    /// Reiht einen Titel ein und gibt die neue ID zurueck
    pub fn einreihen(
        &mut self,
        titel: &str,
        absender: Option<&str>,
        position: EinreihPosition,
        herkunft: Herkunft,
    ) -> Result<EintragsId, QueueFehler> {
        let eintrag = QueueEintrag::neu(
            self.ids.naechste(),
            titel.to_string(),
            absender.map(|s| s.to_string()),
            herkunft,
            Utc::now().timestamp(),
        );
        let id = eintrag.id.clone();

        let index = match position {
            EinreihPosition::Anfang => 0,
            EinreihPosition::Ende => self.anstehend.len(),
            EinreihPosition::VorZufall => self
                .anstehend
                .iter()
                .position(|e| e.herkunft == Herkunft::Random)
                .unwrap_or(self.anstehend.len()),
            EinreihPosition::Nach(nach_id) => {
                match self.anstehend.iter().position(|e| e.id == nach_id) {
                    Some(i) => i + 1,
                    None => return Err(QueueFehler::UnbekannteId(nach_id.to_string())),
                }
            }
        };
        self.anstehend.insert(index, eintrag);
        self.erwartete_zeiten_berechnen();

        let marshalliert = self
            .finden(&id)
            .expect("soeben eingefuegter Eintrag existiert")
            .marshallieren();
        self.log.veroeffentlichen(&ereignis::warteschlange(&marshalliert));
        tracing::info!(id = %id, titel = titel, herkunft = ?herkunft, "Titel eingereiht");
        Ok(id)
    }

    /// Hinterlegt eine bekannte Titellaenge fuer die Startzeit-Prognose
    pub fn laenge_hinterlegen(&mut self, titel: &str, laenge_sekunden: u64) {
        self.laengen.insert(titel.to_string(), laenge_sekunden);
        self.erwartete_zeiten_berechnen();
    }

    fn erwartete_zeiten_berechnen(&mut self) {
        let mut cursor = Utc::now().timestamp();
        if let Some(spielend) = &self.spielend {
            if let Some(laenge) = self.laengen.get(&spielend.titel) {
                let rest = (*laenge as i64)
                    - (spielend.frames_bisher / crate::zufall::FRAMES_PRO_SEKUNDE) as i64;
                cursor += rest.max(0);
            }
        }
        for eintrag in self.anstehend.iter_mut() {
            eintrag.erwartet = Some(cursor);
            if let Some(laenge) = self.laengen.get(&eintrag.titel) {
                cursor += *laenge as i64;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Kopf-Vorbereitung und Start
    // -----------------------------------------------------------------------

    /// Gibt den Kopfeintrag zurueck der einen Dekoder braucht
    ///
    /// Mehrfache Vorbereitung ist ungefaehrlich: ein bereits vorbereiteter
    /// Kopf wird nicht erneut gemeldet.
    pub fn vorzubereitender_kopf(&self) -> Option<(EintragsId, String)> {
        self.anstehend
            .front()
            .filter(|e| e.status == AbspielStatus::Unplayed && !e.vorbereitet)
            .map(|e| (e.id.clone(), e.titel.clone()))
    }

    /// Markiert einen Eintrag als vorbereitet
    ///
    /// Gibt `false` zurueck wenn er schon vorbereitet war (Deduplizierung).
    pub fn als_vorbereitet_markieren(&mut self, id: &EintragsId) -> bool {
        match self.anstehend.iter_mut().find(|e| &e.id == id) {
            Some(e) if !e.vorbereitet => {
                e.vorbereitet = true;
                true
            }
            _ => false,
        }
    }

    /// Startet den Kopfeintrag falls nichts spielt und er vorbereitet ist
    ///
    /// Gibt eine Kopie des gestarteten Eintrags fuer die Pipeline zurueck.
    pub fn naechsten_starten(&mut self) -> Option<QueueEintrag> {
        if !self.abspielen_aktiv || self.spielend.is_some() {
            return None;
        }
        if !self
            .anstehend
            .front()
            .map(|e| e.vorbereitet)
            .unwrap_or(false)
        {
            return None;
        }
        let mut eintrag = self.anstehend.pop_front().expect("Kopf existiert");
        eintrag.status = AbspielStatus::Started;
        eintrag.gespielt_am = Some(Utc::now().timestamp());
        let kopie = eintrag.clone();
        self.log.veroeffentlichen(&ereignis::spielt(eintrag.id.as_str()));
        tracing::info!(id = %eintrag.id, titel = %eintrag.titel, "Abspielen gestartet");
        self.spielend = Some(eintrag);
        self.erwartete_zeiten_berechnen();
        Some(kopie)
    }

    /// Aktualisiert den Frame-Zaehler des spielenden Eintrags
    pub fn frames_aktualisieren(&mut self, frames: u64) {
        if let Some(spielend) = &mut self.spielend {
            spielend.frames_bisher = frames;
        }
    }

    /// Schliesst den spielenden Eintrag ab und verschiebt ihn in die
    /// Kuerzlich-Liste
    pub fn abspiel_beendet(
        &mut self,
        status: AbspielStatus,
        exit_status: i64,
    ) -> Option<EintragsId> {
        debug_assert!(status.ist_final(), "Abschlusszustand muss final sein");
        let mut eintrag = self.spielend.take()?;
        eintrag.status = status;
        eintrag.exit_status = exit_status;
        let id = eintrag.id.clone();
        self.log.veroeffentlichen(&ereignis::kuerzlich(id.as_str()));
        tracing::info!(id = %id, status = status.als_str(), "Abspielen beendet");
        self.kuerzlich.push_back(eintrag);
        while self.kuerzlich.len() > self.konfig.historie {
            self.kuerzlich.pop_front();
        }
        Some(id)
    }

    /// Verwirft einen anstehenden Eintrag der nicht abspielbar ist
    ///
    /// Der Eintrag wandert mit finalem Zustand direkt in die
    /// Kuerzlich-Liste (kein Dekoder gefunden, Startfehler).
    pub fn verwerfen(&mut self, id: &EintragsId, status: AbspielStatus) {
        debug_assert!(status.ist_final());
        let Some(index) = self.anstehend.iter().position(|e| &e.id == id) else {
            return;
        };
        let mut eintrag = self.anstehend.remove(index).expect("Index gueltig");
        eintrag.status = status;
        tracing::warn!(id = %id, titel = %eintrag.titel, status = status.als_str(),
            "Eintrag verworfen");
        self.log.veroeffentlichen(&ereignis::kuerzlich(id.as_str()));
        self.kuerzlich.push_back(eintrag);
        while self.kuerzlich.len() > self.konfig.historie {
            self.kuerzlich.pop_front();
        }
        self.erwartete_zeiten_berechnen();
    }

    // -----------------------------------------------------------------------
    // Pause / Fortsetzen / Scratch
    // -----------------------------------------------------------------------

    pub fn pausieren(&mut self) -> PausenErgebnis {
        match &mut self.spielend {
            None => PausenErgebnis::NichtsSpielt,
            Some(e) if e.status == AbspielStatus::Paused => PausenErgebnis::SchonPausiert,
            Some(e) => {
                e.status = AbspielStatus::Paused;
                e.frames_bis_pause = e.frames_bisher;
                e.zuletzt_pausiert = Some(Utc::now().timestamp());
                self.log.veroeffentlichen(&ereignis::zustand("pause"));
                PausenErgebnis::Pausiert
            }
        }
    }

    pub fn fortsetzen(&mut self) -> PausenErgebnis {
        match &mut self.spielend {
            Some(e) if e.status == AbspielStatus::Paused => {
                e.status = AbspielStatus::Started;
                e.zuletzt_fortgesetzt = Some(Utc::now().timestamp());
                self.log.veroeffentlichen(&ereignis::zustand("resume"));
                PausenErgebnis::Pausiert
            }
            Some(_) => PausenErgebnis::NichtPausiert,
            None => PausenErgebnis::NichtsSpielt,
        }
    }

    /// Wuergt den spielenden Eintrag ab
    ///
    /// Ein pausierter Eintrag wird zuerst fortgesetzt. Das konfigurierte
    /// Jingle wird als naechster Titel eingereiht. Gibt die ID des
    /// abgewuergten Eintrags zurueck; die Pipeline beendet daraufhin den
    /// Dekoder.
    pub fn kratzen(&mut self, wer: &str) -> Option<EintragsId> {
        self.spielend.as_ref()?;
        if self.ist_pausiert() {
            self.fortsetzen();
        }
        let mut eintrag = self.spielend.take().expect("oben geprueft");
        eintrag.status = AbspielStatus::Scratched;
        eintrag.gekratzt_von = Some(wer.to_string());
        let id = eintrag.id.clone();
        self.log
            .veroeffentlichen(&ereignis::gekratzt(id.as_str(), wer));
        self.kuerzlich.push_back(eintrag);
        while self.kuerzlich.len() > self.konfig.historie {
            self.kuerzlich.pop_front();
        }
        tracing::info!(id = %id, wer = wer, "Titel abgewuergt");

        if let Some(jingle) = self
            .konfig
            .scratch_jingles
            .choose(&mut rand::thread_rng())
            .cloned()
        {
            let _ = self.einreihen(&jingle, None, EinreihPosition::Anfang, Herkunft::Scratch);
        }
        Some(id)
    }

    // -----------------------------------------------------------------------
    // Entfernen / Verschieben / Adoption
    // -----------------------------------------------------------------------

    /// Entfernt einen anstehenden Eintrag
    pub fn entfernen(
        &mut self,
        id: &EintragsId,
        wer: &str,
    ) -> Result<QueueEintrag, QueueFehler> {
        let index = self
            .anstehend
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| QueueFehler::UnbekannteId(id.to_string()))?;
        let eintrag = self.anstehend.remove(index).expect("Index gueltig");
        self.erwartete_zeiten_berechnen();
        self.log
            .veroeffentlichen(&format!("removed {} {}", id, musikbox_core::zitieren(wer)));
        Ok(eintrag)
    }

    /// Verschiebt einen Eintrag um `delta` Plaetze Richtung Kopf
    ///
    /// Negativer `delta` verschiebt Richtung Ende. Gibt die tatsaechlich
    /// verschobene Distanz zurueck. Der spielende Eintrag ist
    /// unverschiebbar (er steht nicht in der anstehenden Liste).
    pub fn bewegen(&mut self, id: &EintragsId, delta: i64) -> Result<i64, QueueFehler> {
        if self.spielend.as_ref().map(|e| &e.id) == Some(id) {
            return Err(QueueFehler::SpielendUnverschiebbar);
        }
        let von = self
            .anstehend
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| QueueFehler::UnbekannteId(id.to_string()))?;
        let nach = (von as i64 - delta).clamp(0, self.anstehend.len() as i64 - 1) as usize;
        let eintrag = self.anstehend.remove(von).expect("Index gueltig");
        self.anstehend.insert(nach, eintrag);
        self.erwartete_zeiten_berechnen();
        Ok(von as i64 - nach as i64)
    }

    /// Verankert Eintraege hinter einem Zielobjekt neu
    ///
    /// `ziel = None` verschiebt an den Kopf der anstehenden Liste.
    pub fn nach_verschieben(
        &mut self,
        ziel: Option<&EintragsId>,
        ids: &[EintragsId],
    ) -> Result<(), QueueFehler> {
        // Erst alle Kandidaten herausloesen (validiert die IDs)
        let mut herausgeloest = Vec::with_capacity(ids.len());
        for id in ids {
            let index = self
                .anstehend
                .iter()
                .position(|e| &e.id == id)
                .ok_or_else(|| QueueFehler::UnbekannteId(id.to_string()))?;
            herausgeloest.push(self.anstehend.remove(index).expect("Index gueltig"));
        }
        let basis = match ziel {
            None => 0,
            Some(ziel_id) => {
                match self.anstehend.iter().position(|e| &e.id == ziel_id) {
                    Some(i) => i + 1,
                    None => {
                        // Kandidaten zurueckstellen bevor der Fehler rausgeht
                        for e in herausgeloest.into_iter().rev() {
                            self.anstehend.push_front(e);
                        }
                        return Err(QueueFehler::UnbekannteId(ziel_id.to_string()));
                    }
                }
            }
        };
        for (n, eintrag) in herausgeloest.into_iter().enumerate() {
            self.anstehend.insert(basis + n, eintrag);
        }
        self.erwartete_zeiten_berechnen();
        Ok(())
    }

    /// Adoptiert einen Zufallseintrag
    pub fn adoptieren(&mut self, id: &EintragsId, wer: &str) -> Result<(), QueueFehler> {
        let eintrag = self
            .anstehend
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| QueueFehler::UnbekannteId(id.to_string()))?;
        if eintrag.herkunft != Herkunft::Random {
            return Err(QueueFehler::UnbekannteId(id.to_string()));
        }
        eintrag.herkunft = Herkunft::Adopted;
        eintrag.absender = Some(wer.to_string());
        self.log
            .veroeffentlichen(&ereignis::adoptiert(id.as_str(), wer));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Abspiel-/Zufallsschalter
    // -----------------------------------------------------------------------

    pub fn abspielen_schalten(&mut self, aktiv: bool) {
        if self.abspielen_aktiv != aktiv {
            self.abspielen_aktiv = aktiv;
            self.log.veroeffentlichen(&ereignis::zustand(if aktiv {
                "enable_play"
            } else {
                "disable_play"
            }));
        }
    }

    pub fn zufall_schalten(&mut self, aktiv: bool) {
        if self.zufall_aktiv != aktiv {
            self.zufall_aktiv = aktiv;
            self.log.veroeffentlichen(&ereignis::zustand(if aktiv {
                "enable_random"
            } else {
                "disable_random"
            }));
        }
    }

    // -----------------------------------------------------------------------
    // Zufalls-Nachschub
    // -----------------------------------------------------------------------

    /// Titel die der Zufallswaehler derzeit nicht liefern darf
    pub fn ausschlussliste(&self) -> Vec<String> {
        let schwelle = Utc::now().timestamp() - self.konfig.replay_min;
        let mut ausschluss: Vec<String> = self
            .anstehend
            .iter()
            .map(|e| e.titel.clone())
            .chain(self.spielend.iter().map(|e| e.titel.clone()))
            .collect();
        ausschluss.extend(
            self.kuerzlich
                .iter()
                .filter(|e| e.gespielt_am.unwrap_or(0) >= schwelle)
                .map(|e| e.titel.clone()),
        );
        ausschluss
    }

    /// Fuellt die anstehende Liste bis `queue_pad` mit Zufallstiteln auf
    ///
    /// Gibt die Anzahl der nachgelegten Titel zurueck.
    pub async fn auffuellen<W: ZufallsWaehler>(&mut self, waehler: &W) -> usize {
        if !self.zufall_aktiv {
            return 0;
        }
        let mut nachgelegt = 0;
        while self.anstehend.len() < self.konfig.queue_pad {
            let ausschluss = self.ausschlussliste();
            match waehler.waehlen(&ausschluss).await {
                Some(titel) => {
                    if self
                        .einreihen(&titel, None, EinreihPosition::Ende, Herkunft::Random)
                        .is_err()
                    {
                        break;
                    }
                    nachgelegt += 1;
                }
                None => break,
            }
        }
        nachgelegt
    }

    // -----------------------------------------------------------------------
    // Persistenz
    // -----------------------------------------------------------------------

    /// Marshalliert den gesamten Zustand, ein Eintrag pro Zeile
    pub fn alle_marshallieren(&self) -> Vec<String> {
        self.spielend
            .iter()
            .chain(self.anstehend.iter())
            .map(|e| e.marshallieren())
            .collect()
    }

    /// Stellt den Zustand aus der Persistenzdatei wieder her
    ///
    /// Ein beim Absturz spielender Eintrag wird ungestartet wieder vorn
    /// eingereiht; finale Eintraege landen in der Kuerzlich-Liste.
    pub fn wiederherstellen(&mut self, zeilen: impl Iterator<Item = String>) {
        for zeile in zeilen {
            let zeile = zeile.trim();
            if zeile.is_empty() {
                continue;
            }
            match QueueEintrag::entmarshallieren(zeile) {
                Ok(mut eintrag) => {
                    eintrag.vorbereitet = false;
                    if eintrag.status.ist_final() {
                        self.kuerzlich.push_back(eintrag);
                    } else {
                        eintrag.status = AbspielStatus::Unplayed;
                        eintrag.gespielt_am = None;
                        self.anstehend.push_back(eintrag);
                    }
                }
                Err(fehler) => {
                    tracing::warn!(fehler = %fehler, zeile = zeile, "Persistenzzeile verworfen");
                }
            }
        }
        while self.kuerzlich.len() > self.konfig.historie {
            self.kuerzlich.pop_front();
        }
        self.erwartete_zeiten_berechnen();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Warteschlange {
        engine_mit(WarteschlangenKonfig {
            queue_pad: 3,
            historie: 4,
            replay_min: 3600,
            scratch_jingles: vec!["jingles/kratzer.ogg".into()],
        })
    }

    fn engine_mit(konfig: WarteschlangenKonfig) -> Warteschlange {
        Warteschlange::neu(konfig, EventLog::neu())
    }

    fn start_vorbereitet(w: &mut Warteschlange, titel: &str) -> EintragsId {
        let id = w
            .einreihen(titel, Some("alice"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap();
        w.als_vorbereitet_markieren(&id);
        w.naechsten_starten().expect("muss starten");
        id
    }

    #[test]
    fn picked_landet_vor_zufall() {
        let mut w = engine();
        w.einreihen("z1", None, EinreihPosition::Ende, Herkunft::Random)
            .unwrap();
        w.einreihen("z2", None, EinreihPosition::Ende, Herkunft::Random)
            .unwrap();
        let id = w
            .einreihen("gewaehlt", Some("alice"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap();
        let reihenfolge: Vec<&str> = w.anstehende().map(|e| e.titel.as_str()).collect();
        assert_eq!(reihenfolge, vec!["gewaehlt", "z1", "z2"]);
        assert_eq!(w.finden(&id).unwrap().absender.as_deref(), Some("alice"));
    }

    #[test]
    fn hoechstens_ein_eintrag_spielt() {
        let mut w = engine();
        start_vorbereitet(&mut w, "a");
        let id2 = w
            .einreihen("b", Some("bob"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap();
        w.als_vorbereitet_markieren(&id2);
        assert!(
            w.naechsten_starten().is_none(),
            "Zweiter Start waehrend etwas spielt ist verboten"
        );
        let spielende = w
            .anstehende()
            .filter(|e| !matches!(e.status, AbspielStatus::Unplayed))
            .count();
        assert_eq!(spielende, 0);
    }

    #[test]
    fn start_verlangt_vorbereitung() {
        let mut w = engine();
        w.einreihen("a", Some("alice"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap();
        assert!(w.naechsten_starten().is_none(), "Unvorbereitet startet nicht");
        let (id, _titel) = w.vorzubereitender_kopf().expect("Kopf braucht Dekoder");
        assert!(w.als_vorbereitet_markieren(&id));
        assert!(!w.als_vorbereitet_markieren(&id), "Vorbereitung ist dedupliziert");
        assert!(w.naechsten_starten().is_some());
    }

    #[test]
    fn pause_und_fortsetzen() {
        let mut w = engine();
        start_vorbereitet(&mut w, "a");
        assert_eq!(w.pausieren(), PausenErgebnis::Pausiert);
        assert!(w.ist_pausiert());
        assert_eq!(w.pausieren(), PausenErgebnis::SchonPausiert);
        assert_eq!(w.fortsetzen(), PausenErgebnis::Pausiert);
        assert!(!w.ist_pausiert());
        assert_eq!(w.fortsetzen(), PausenErgebnis::NichtPausiert);
    }

    #[test]
    fn pause_ohne_spielenden_eintrag() {
        let mut w = engine();
        assert_eq!(w.pausieren(), PausenErgebnis::NichtsSpielt);
    }

    #[test]
    fn kratzen_legt_jingle_nach_vorn() {
        let mut w = engine();
        let gespielt = start_vorbereitet(&mut w, "a");
        w.einreihen("b", Some("bob"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap();

        let gekratzt = w.kratzen("carol").expect("es spielte etwas");
        assert_eq!(gekratzt, gespielt);
        assert!(w.spielend().is_none());

        let kopf = w.anstehende().next().unwrap();
        assert_eq!(kopf.titel, "jingles/kratzer.ogg");
        assert_eq!(kopf.herkunft, Herkunft::Scratch);

        let letzter = w.kuerzliche().last().unwrap();
        assert_eq!(letzter.status, AbspielStatus::Scratched);
        assert_eq!(letzter.gekratzt_von.as_deref(), Some("carol"));
    }

    #[test]
    fn kratzen_eines_pausierten_setzt_erst_fort() {
        let mut w = engine();
        start_vorbereitet(&mut w, "a");
        w.pausieren();
        assert!(w.kratzen("alice").is_some());
        assert!(!w.ist_pausiert());
    }

    #[test]
    fn beendete_eintraege_wandern_in_kuerzlich() {
        let mut w = engine();
        start_vorbereitet(&mut w, "a");
        let id = w.abspiel_beendet(AbspielStatus::Ok, 0).unwrap();
        assert!(w.spielend().is_none());
        assert_eq!(w.kuerzliche().last().unwrap().id, id);
    }

    #[test]
    fn kuerzlich_ist_begrenzt() {
        let mut w = engine();
        for n in 0..8 {
            start_vorbereitet(&mut w, &format!("titel{n}"));
            w.abspiel_beendet(AbspielStatus::Ok, 0);
        }
        assert_eq!(w.kuerzliche().count(), 4, "Historie ist auf 4 begrenzt");
        assert_eq!(w.kuerzliche().last().unwrap().titel, "titel7");
    }

    #[test]
    fn bewegen_richtung_kopf() {
        let mut w = engine();
        let _a = w.einreihen("a", Some("u"), EinreihPosition::Ende, Herkunft::Picked).unwrap();
        let _b = w.einreihen("b", Some("u"), EinreihPosition::Ende, Herkunft::Picked).unwrap();
        let c = w.einreihen("c", Some("u"), EinreihPosition::Ende, Herkunft::Picked).unwrap();

        let verschoben = w.bewegen(&c, 2).unwrap();
        assert_eq!(verschoben, 2);
        let reihenfolge: Vec<&str> = w.anstehende().map(|e| e.titel.as_str()).collect();
        assert_eq!(reihenfolge, vec!["c", "a", "b"]);

        // Ueber den Kopf hinaus wird gekappt
        let verschoben = w.bewegen(&c, 5).unwrap();
        assert_eq!(verschoben, 0);
    }

    #[test]
    fn nach_verschieben_verankert_neu() {
        let mut w = engine();
        let a = w.einreihen("a", Some("u"), EinreihPosition::Ende, Herkunft::Picked).unwrap();
        let b = w.einreihen("b", Some("u"), EinreihPosition::Ende, Herkunft::Picked).unwrap();
        let c = w.einreihen("c", Some("u"), EinreihPosition::Ende, Herkunft::Picked).unwrap();

        w.nach_verschieben(Some(&c), &[a.clone()]).unwrap();
        let reihenfolge: Vec<&str> = w.anstehende().map(|e| e.titel.as_str()).collect();
        assert_eq!(reihenfolge, vec!["b", "c", "a"]);

        w.nach_verschieben(None, &[c.clone(), b.clone()]).unwrap();
        let reihenfolge: Vec<&str> = w.anstehende().map(|e| e.titel.as_str()).collect();
        assert_eq!(reihenfolge, vec!["c", "b", "a"]);
    }

    #[test]
    fn adoption_nur_fuer_zufallseintraege() {
        let mut w = engine();
        let zufall = w.einreihen("z", None, EinreihPosition::Ende, Herkunft::Random).unwrap();
        let eigen = w
            .einreihen("e", Some("alice"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap();

        w.adoptieren(&zufall, "bob").unwrap();
        let adoptiert = w.finden(&zufall).unwrap();
        assert_eq!(adoptiert.herkunft, Herkunft::Adopted);
        assert_eq!(adoptiert.absender.as_deref(), Some("bob"));

        assert!(w.adoptieren(&eigen, "bob").is_err());
    }

    #[tokio::test]
    async fn auffuellen_bis_queue_pad() {
        struct FesteWahl;
        impl ZufallsWaehler for FesteWahl {
            async fn waehlen(&self, ausschluss: &[String]) -> Option<String> {
                for kandidat in ["r1", "r2", "r3", "r4"] {
                    if !ausschluss.iter().any(|a| a == kandidat) {
                        return Some(kandidat.to_string());
                    }
                }
                None
            }
        }

        let mut w = engine();
        w.einreihen("fest", Some("alice"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap();
        let nachgelegt = w.auffuellen(&FesteWahl).await;
        assert_eq!(nachgelegt, 2, "queue_pad=3 bei einem vorhandenen Eintrag");
        assert_eq!(w.anstehende().count(), 3);

        w.zufall_schalten(false);
        assert_eq!(w.auffuellen(&FesteWahl).await, 0);
    }

    #[test]
    fn persistenz_roundtrip_mit_spielendem_eintrag() {
        let mut w = engine();
        start_vorbereitet(&mut w, "lief-gerade");
        w.einreihen("kommt-noch", Some("bob"), EinreihPosition::Ende, Herkunft::Picked)
            .unwrap();

        let zeilen = w.alle_marshallieren();
        assert_eq!(zeilen.len(), 2);

        let mut neu = engine();
        neu.wiederherstellen(zeilen.into_iter());
        assert!(neu.spielend().is_none());
        let reihenfolge: Vec<&str> = neu.anstehende().map(|e| e.titel.as_str()).collect();
        assert_eq!(reihenfolge, vec!["lief-gerade", "kommt-noch"]);
        assert!(
            neu.anstehende().all(|e| e.status == AbspielStatus::Unplayed && !e.vorbereitet),
            "Wiederhergestellte Eintraege sind ungestartet und unvorbereitet"
        );
    }

    #[test]
    fn ausschlussliste_beachtet_replay_min() {
        let mut w = engine();
        start_vorbereitet(&mut w, "eben-gespielt");
        w.abspiel_beendet(AbspielStatus::Ok, 0);
        assert!(w
            .ausschlussliste()
            .iter()
            .any(|t| t == "eben-gespielt"));
    }
}
