//! Server-Kontext
//!
//! Der frueher uebliche Satz globaler Variablen (Konfiguration, spielender
//! Titel, Verbindungsliste, Abonnements) ist hier zu einem Kontextobjekt
//! zusammengefasst, das generisch ueber der TrackDB an alle Handler
//! gereicht wird.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use musikbox_auth::{CookieFabrik, HashAlgorithmus, Rechte};
use musikbox_eventlog::{AboHandle, EventLog};
use musikbox_mixer::{DekoderTabelle, MixerTreiber};
use musikbox_queue::Warteschlange;
use musikbox_rtp::sender::EmpfaengerListe;
use tokio::sync::{mpsc, oneshot, watch, Notify, RwLock};
use uuid::Uuid;

/// Konfigurationsausschnitt den das Protokoll braucht
#[derive(Debug, Clone)]
pub struct ProtokollKonfig {
    /// Algorithmus des Anmelde-Challenge
    pub algorithmus: HashAlgorithmus,
    /// Benutzerverwaltung ueber TCP zulassen
    pub remote_userman: bool,
    /// Rechte neu angelegter Benutzer
    pub default_rights: String,
    /// Maximale Titelzahl pro Playlist
    pub playlist_max: usize,
    /// Sekunden nach denen eine fremde Playlist-Sperre verfaellt
    pub playlist_lock_timeout: i64,
    /// Mindestabstand zwischen zwei Erinnerungsmails pro Benutzer
    pub reminder_interval: i64,
    /// Obergrenze der `new`-Liste
    pub new_max: usize,
    /// Persistenzdatei der Warteschlange
    pub statusdatei: Option<PathBuf>,
    /// Kommando des Rescanner-Kindprozesses
    pub rescan_kommando: Vec<String>,
    /// Kommando des Mailversand-Kindprozesses
    pub mail_kommando: Vec<String>,
    /// Musikwurzel fuer den Katalogabgleich nach dem Rescan
    pub musik_wurzel: Option<PathBuf>,
    /// Konfiguriertes RTP-Ziel (fuer `rtp-address`)
    pub rtp_adresse: Option<SocketAddr>,
}

impl Default for ProtokollKonfig {
    fn default() -> Self {
        Self {
            algorithmus: HashAlgorithmus::Sha256,
            remote_userman: false,
            default_rights: "read,play,scratch-own,remove-own,move-own,pause,prefs,volume".into(),
            playlist_max: 500,
            playlist_lock_timeout: 600,
            reminder_interval: 600,
            new_max: 100,
            statusdatei: None,
            rescan_kommando: Vec::new(),
            mail_kommando: Vec::new(),
            musik_wurzel: None,
            rtp_adresse: None,
        }
    }
}

/// Eine angemeldete Verbindung aus Sicht des Kontexts
///
/// Rechteaenderungen per `edituser` greifen hierueber in lebende
/// Verbindungen durch.
pub struct SitzungsEintrag {
    pub benutzer: String,
    pub rechte: Arc<Mutex<Rechte>>,
    pub lokal: bool,
    /// `user_*`-Urteil des Ereignis-Abonnements, falls `log` aktiv ist
    pub abo: Mutex<Option<AboHandle>>,
}

/// Eine gehaltene Playlist-Sperre
#[derive(Debug, Clone)]
pub struct Sperre {
    pub verbindung: Uuid,
    pub seit: i64,
}

/// Der Kontext den alle Handler teilen
pub struct ServerKontext<D> {
    pub db: Arc<D>,
    pub log: EventLog,
    pub warteschlange: Arc<RwLock<Warteschlange>>,
    pub mixer: Arc<tokio::sync::Mutex<MixerTreiber>>,
    pub dekoder: Arc<DekoderTabelle>,
    pub cookies: Arc<CookieFabrik>,
    pub konfig: Arc<ProtokollKonfig>,
    /// Unicast-Empfaenger des RTP-Senders (`rtp-request`)
    pub rtp_empfaenger: EmpfaengerListe,
    /// Angemeldete Verbindungen, nach Verbindungs-UUID
    pub sitzungen: Arc<DashMap<Uuid, Arc<SitzungsEintrag>>>,
    /// Gehaltene Playlist-Sperren, nach Playlist-Name
    pub sperren: Arc<Mutex<HashMap<String, Sperre>>>,
    /// Letzte Erinnerungsmail pro Benutzer (Unix-Sekunden)
    pub erinnerungen: Arc<Mutex<HashMap<String, i64>>>,
    /// Weckt die Abspielschleife nach Warteschlangen-Mutationen
    pub anstoss: Arc<Notify>,
    /// Shutdown-Signal (`shutdown`-Befehl, SIGTERM)
    pub shutdown: watch::Sender<bool>,
    /// Reconfigure-Auftraege an den Server (`reconfigure`, SIGHUP)
    pub reconfigure: mpsc::Sender<oneshot::Sender<bool>>,
}

// Manuelles Clone: `D` selbst muss nicht Clone sein
impl<D> Clone for ServerKontext<D> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            log: self.log.clone(),
            warteschlange: Arc::clone(&self.warteschlange),
            mixer: Arc::clone(&self.mixer),
            dekoder: Arc::clone(&self.dekoder),
            cookies: Arc::clone(&self.cookies),
            konfig: Arc::clone(&self.konfig),
            rtp_empfaenger: self.rtp_empfaenger.clone(),
            sitzungen: Arc::clone(&self.sitzungen),
            sperren: Arc::clone(&self.sperren),
            erinnerungen: Arc::clone(&self.erinnerungen),
            anstoss: Arc::clone(&self.anstoss),
            shutdown: self.shutdown.clone(),
            reconfigure: self.reconfigure.clone(),
        }
    }
}

impl<D> ServerKontext<D> {
    /// Schreibt den Warteschlangenzustand in die Persistenzdatei
    pub async fn warteschlange_sichern(&self) {
        let Some(pfad) = &self.konfig.statusdatei else {
            return;
        };
        let zeilen = {
            let w = self.warteschlange.read().await;
            w.alle_marshallieren()
        };
        let inhalt = if zeilen.is_empty() {
            String::new()
        } else {
            format!("{}\n", zeilen.join("\n"))
        };
        if let Err(fehler) = tokio::fs::write(pfad, inhalt).await {
            tracing::error!(pfad = %pfad.display(), fehler = %fehler,
                "Warteschlange liess sich nicht sichern");
        }
    }

    /// Weckt die Abspielschleife (Kopf-Vorbereitung, Nachschub, Start)
    pub fn abspiel_anstossen(&self) {
        self.anstoss.notify_one();
    }

    /// Setzt die Rechte aller Verbindungen eines Benutzers neu
    ///
    /// Das `_local`-Bit der jeweiligen Verbindung bleibt erhalten; das
    /// `user_*`-Urteil laufender Ereignis-Abonnements wird nachgezogen.
    pub fn rechte_durchsetzen(&self, benutzer: &str, neu: Rechte) {
        for eintrag in self.sitzungen.iter() {
            let sitzung = eintrag.value();
            if sitzung.benutzer != benutzer {
                continue;
            }
            let mut rechte = sitzung.rechte.lock().expect("Rechte-Mutex vergiftet");
            let lokal_bit = rechte.0 & musikbox_auth::Recht::LOKAL;
            *rechte = Rechte(neu.0 | lokal_bit);
            let darf_user = rechte.hat(musikbox_auth::Recht::ADMIN)
                && (sitzung.lokal || self.konfig.remote_userman);
            drop(rechte);
            if let Some(abo) = sitzung.abo.lock().expect("Abo-Mutex vergiftet").as_ref() {
                abo.user_ereignisse_erlauben(darf_user);
            }
        }
        self.log
            .veroeffentlichen(&musikbox_eventlog::ereignis::rechte_geaendert(
                &neu.formatieren(),
            ));
    }

    /// Raeumt den Zustand einer getrennten Verbindung ab
    pub fn verbindung_abraeumen(&self, verbindung: Uuid, rtp_ziel: Option<SocketAddr>) {
        self.sitzungen.remove(&verbindung);
        let mut sperren = self.sperren.lock().expect("Sperren-Mutex vergiftet");
        sperren.retain(|_, sperre| sperre.verbindung != verbindung);
        drop(sperren);
        if let Some(ziel) = rtp_ziel {
            self.rtp_empfaenger.entfernen(&ziel);
        }
    }
}
