//! Ereignisprotokoll-Bus
//!
//! Prozessweiter Faecher fuer textuelle Zustandsaenderungen. Abonnenten
//! sind die Schreibseiten von Verbindungen die `log` aufgerufen haben;
//! jede zugestellte Zeile traegt einen Zeitstempel in Hex-Sekunden.
//!
//! ## Filterregel
//! Ereignisse deren Name mit `user_` beginnt gehen nur an Abonnenten mit
//! Admin-Recht; ueber nicht-lokale Transporte zusaetzlich nur wenn die
//! Fernverwaltung (`remote_userman`) freigeschaltet ist. Der Abonnent
//! haelt dieses Urteil selbst aktuell (Rechteaenderungen laufen ueber
//! dieselben Verbindungen).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use musikbox_core::zitieren;
use uuid::Uuid;

/// Zustellcallback eines Abonnements
///
/// Bekommt die fertig formatierte Zeile (ohne `\n`). `false` heisst: der
/// Abonnent ist tot und wird beim naechsten Durchlauf ausgetragen.
pub type AboSenke = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct Abo {
    /// Aktuelles Urteil ob `user_*`-Ereignisse zugestellt werden duerfen
    darf_user_ereignisse: Arc<AtomicBool>,
    senke: AboSenke,
}

/// Handle auf ein Abonnement
#[derive(Clone)]
pub struct AboHandle {
    id: Uuid,
    darf_user_ereignisse: Arc<AtomicBool>,
}

impl AboHandle {
    /// Aktualisiert das `user_*`-Urteil (nach Rechteaenderung)
    pub fn user_ereignisse_erlauben(&self, erlaubt: bool) {
        self.darf_user_ereignisse.store(erlaubt, Ordering::SeqCst);
    }
}

/// Der Ereignis-Bus
///
/// Clone teilt den inneren Zustand (Arc + DashMap).
#[derive(Clone, Default)]
pub struct EventLog {
    abos: Arc<DashMap<Uuid, Abo>>,
}

impl EventLog {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Registriert ein Abonnement
    ///
    /// `darf_user_ereignisse` ist das anfaengliche Urteil des Abonnenten
    /// ueber `user_*`-Ereignisse (Admin-Recht und Transport).
    pub fn abonnieren(&self, darf_user_ereignisse: bool, senke: AboSenke) -> AboHandle {
        let id = Uuid::new_v4();
        let flagge = Arc::new(AtomicBool::new(darf_user_ereignisse));
        self.abos.insert(
            id,
            Abo {
                darf_user_ereignisse: Arc::clone(&flagge),
                senke,
            },
        );
        tracing::debug!(abo = %id, anzahl = self.abos.len(), "Ereignis-Abonnement registriert");
        AboHandle {
            id,
            darf_user_ereignisse: flagge,
        }
    }

    /// Traegt ein Abonnement aus
    pub fn austragen(&self, handle: &AboHandle) {
        self.abos.remove(&handle.id);
        tracing::debug!(abo = %handle.id, "Ereignis-Abonnement ausgetragen");
    }

    /// Veroeffentlicht ein Ereignis an alle lebenden Abonnenten
    ///
    /// Gibt die Anzahl der erfolgten Zustellungen zurueck.
    pub fn veroeffentlichen(&self, nachricht: &str) -> usize {
        let eingeschraenkt = nachricht.starts_with("user_");
        let zeile = format!("{:x} {}", jetzt_sekunden(), nachricht);

        let mut zugestellt = 0;
        let mut tote = Vec::new();
        for eintrag in self.abos.iter() {
            if eingeschraenkt && !eintrag.darf_user_ereignisse.load(Ordering::SeqCst) {
                continue;
            }
            if (eintrag.senke)(&zeile) {
                zugestellt += 1;
            } else {
                tote.push(*eintrag.key());
            }
        }
        for id in tote {
            self.abos.remove(&id);
            tracing::debug!(abo = %id, "Totes Ereignis-Abonnement entfernt");
        }
        zugestellt
    }

    /// Anzahl der aktiven Abonnements
    pub fn abo_anzahl(&self) -> usize {
        self.abos.len()
    }
}

fn jetzt_sekunden() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Ereignis-Vokabular
// ---------------------------------------------------------------------------

/// Formatierungshelfer fuer das feste Ereignis-Vokabular
pub mod ereignis {
    use super::zitieren;

    pub fn zustand(was: &str) -> String {
        format!("state {was}")
    }

    pub fn lautstaerke(links: u32, rechts: u32) -> String {
        format!("volume {links} {rechts}")
    }

    pub fn spielt(id: &str) -> String {
        format!("playing {id}")
    }

    pub fn gekratzt(id: &str, benutzer: &str) -> String {
        format!("scratched {id} {}", zitieren(benutzer))
    }

    pub fn adoptiert(id: &str, benutzer: &str) -> String {
        format!("adopted {id} {}", zitieren(benutzer))
    }

    pub fn warteschlange(marshalliert: &str) -> String {
        format!("queue {marshalliert}")
    }

    pub fn kuerzlich(id: &str) -> String {
        format!("recent {id}")
    }

    pub fn rechte_geaendert(rechte: &str) -> String {
        format!("rights_changed {}", zitieren(rechte))
    }

    pub fn benutzer_angelegt(name: &str) -> String {
        format!("user_add {}", zitieren(name))
    }

    pub fn benutzer_geloescht(name: &str) -> String {
        format!("user_delete {}", zitieren(name))
    }

    pub fn benutzer_geaendert(name: &str, feld: &str) -> String {
        format!("user_edit {} {}", zitieren(name), zitieren(feld))
    }

    pub fn benutzer_bestaetigt(name: &str) -> String {
        format!("user_confirm {}", zitieren(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sammel_abo() -> (AboSenke, Arc<Mutex<Vec<String>>>) {
        let gesammelt = Arc::new(Mutex::new(Vec::new()));
        let klon = Arc::clone(&gesammelt);
        let senke: AboSenke = Box::new(move |zeile| {
            klon.lock().unwrap().push(zeile.to_string());
            true
        });
        (senke, gesammelt)
    }

    #[test]
    fn zustellung_mit_hex_zeitstempel() {
        let bus = EventLog::neu();
        let (senke, gesammelt) = sammel_abo();
        bus.abonnieren(false, senke);

        assert_eq!(bus.veroeffentlichen("playing abc_1"), 1);
        let zeilen = gesammelt.lock().unwrap();
        assert_eq!(zeilen.len(), 1);
        let (zeit, rest) = zeilen[0].split_once(' ').unwrap();
        assert!(u64::from_str_radix(zeit, 16).is_ok(), "Zeitstempel muss Hex sein");
        assert_eq!(rest, "playing abc_1");
    }

    #[test]
    fn user_ereignisse_werden_gefiltert() {
        let bus = EventLog::neu();
        let (senke_admin, gesammelt_admin) = sammel_abo();
        let (senke_normal, gesammelt_normal) = sammel_abo();
        bus.abonnieren(true, senke_admin);
        bus.abonnieren(false, senke_normal);

        assert_eq!(bus.veroeffentlichen(&ereignis::benutzer_angelegt("carol")), 1);
        assert_eq!(bus.veroeffentlichen("volume 5 5"), 2);

        assert_eq!(gesammelt_admin.lock().unwrap().len(), 2);
        assert_eq!(gesammelt_normal.lock().unwrap().len(), 1);
    }

    #[test]
    fn urteil_ist_nachtraeglich_aenderbar() {
        let bus = EventLog::neu();
        let (senke, gesammelt) = sammel_abo();
        let handle = bus.abonnieren(false, senke);

        bus.veroeffentlichen("user_add alice");
        handle.user_ereignisse_erlauben(true);
        bus.veroeffentlichen("user_add bob");

        let zeilen = gesammelt.lock().unwrap();
        assert_eq!(zeilen.len(), 1);
        assert!(zeilen[0].ends_with("user_add bob"));
    }

    #[test]
    fn tote_abos_werden_entfernt() {
        let bus = EventLog::neu();
        bus.abonnieren(false, Box::new(|_| false));
        assert_eq!(bus.abo_anzahl(), 1);

        assert_eq!(bus.veroeffentlichen("volume 0 0"), 0);
        assert_eq!(bus.abo_anzahl(), 0, "Toter Abonnent muss ausgetragen sein");
    }

    #[test]
    fn austragen_ist_idempotent() {
        let bus = EventLog::neu();
        let (senke, _gesammelt) = sammel_abo();
        let handle = bus.abonnieren(false, senke);
        bus.austragen(&handle);
        bus.austragen(&handle);
        assert_eq!(bus.abo_anzahl(), 0);
    }
}
