//! Verbindungsbehandlung
//!
//! Jede Verbindung laeuft als eigene Task: Begruessung, Zeilenschleife,
//! Dispatch, Abraeumen. Befehle die auf Kindprozesse warten, warten
//! inline; solange liest die Verbindung nichts weiter, Antworten bleiben
//! damit strikt in Auftragsreihenfolge.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use musikbox_auth::{nonce_erzeugen, Rechte, NONCE_LAENGE};
use musikbox_core::{spalten, SpaltOptionen, VerbindungsTag};
use musikbox_eventlog::AboHandle;
use musikbox_reactor::{Leser, Schreiber, SchreiberGrenzen};
use musikbox_trackdb::TrackDb;
use tokio::io::{AsyncRead, AsyncWrite};
use unicode_normalization::UnicodeNormalization;

use crate::antwort::koerper_zeile_entgegennehmen;
use crate::handler;
use crate::kontext::ServerKontext;
use crate::PROTOKOLL_VERSION;

/// Ziel einer laufenden Koerpersammlung
#[derive(Debug, Clone)]
pub enum KoerperZiel {
    /// `playlist-set <name>`
    PlaylistSetzen { name: String },
}

/// Zustand einer Client-Verbindung
pub struct Verbindung {
    pub tag: VerbindungsTag,
    pub schreiber: Schreiber,
    /// Unix-Socket-Verbindung (vergibt `_local`)
    pub lokal: bool,
    pub nonce: [u8; NONCE_LAENGE],
    pub benutzer: Option<String>,
    /// Geteilt mit dem Sitzungsregister, damit `edituser` durchgreift
    pub rechte: Arc<Mutex<Rechte>>,
    /// Gesetzt wenn die Anmeldung per Cookie erfolgte
    pub cookie: Option<String>,
    pub log_abo: Option<AboHandle>,
    /// Nach `log`: eingehende Zeilen sind nur noch Keepalive
    pub log_modus: bool,
    pub rtp_ziel: Option<SocketAddr>,
    /// Hoechstens eine gehaltene Playlist-Sperre pro Verbindung
    pub gesperrte_playlist: Option<String>,
    koerper_ziel: Option<KoerperZiel>,
    koerper: Vec<String>,
}

impl Verbindung {
    pub fn neu(schreiber: Schreiber, lokal: bool) -> Self {
        Self {
            tag: VerbindungsTag::neu(),
            schreiber,
            lokal,
            nonce: nonce_erzeugen(),
            benutzer: None,
            rechte: Arc::new(Mutex::new(Rechte::KEINE)),
            cookie: None,
            log_abo: None,
            log_modus: false,
            rtp_ziel: None,
            gesperrte_playlist: None,
            koerper_ziel: None,
            koerper: Vec::new(),
        }
    }

    /// Aktuelle Rechte der Verbindung
    pub fn rechte(&self) -> Rechte {
        *self.rechte.lock().expect("Rechte-Mutex vergiftet")
    }

    /// Beginnt eine Koerpersammlung; bis zur Punktzeile werden keine
    /// weiteren Befehle dispatcht
    pub fn koerper_beginnen(&mut self, ziel: KoerperZiel) {
        self.koerper_ziel = Some(ziel);
        self.koerper = Vec::new();
    }

    pub fn sammelt_koerper(&self) -> bool {
        self.koerper_ziel.is_some()
    }
}

/// Behandelt eine Verbindung bis EOF oder Schreibfehler
pub async fn verbindung_behandeln<D, S>(kontext: ServerKontext<D>, strom: S, lokal: bool)
where
    D: TrackDb,
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (lesehaelfte, schreibhaelfte) = tokio::io::split(strom);
    let mut leser = Leser::neu(lesehaelfte);

    let tag = VerbindungsTag::neu();
    let schreiber = Schreiber::starten(
        schreibhaelfte,
        SchreiberGrenzen::default(),
        tag.to_string(),
    );
    let mut verbindung = Verbindung::neu(schreiber, lokal);
    verbindung.tag = tag;

    tracing::info!(verbindung = %tag, lokal = lokal, "Neue Verbindung");

    // Begruessung: Protokollversion, Algorithmus, Challenge-Nonce
    let begruessung = format!(
        "231 {} {} {}",
        PROTOKOLL_VERSION,
        kontext.konfig.algorithmus,
        hex::encode(verbindung.nonce)
    );
    if verbindung.schreiber.zeile(&begruessung).is_err() {
        return;
    }

    let mut fehler_rx = verbindung.schreiber.fehler_beobachten();

    loop {
        let zeile = tokio::select! {
            ergebnis = leser.zeile_lesen() => match ergebnis {
                Ok(Some(zeile)) => zeile,
                Ok(None) => {
                    tracing::info!(verbindung = %tag, "Verbindung beendet (EOF)");
                    break;
                }
                Err(fehler) => {
                    tracing::info!(verbindung = %tag, fehler = %fehler, "Lesefehler");
                    break;
                }
            },
            _ = fehler_rx.changed() => {
                let fehler = fehler_rx.borrow().clone();
                tracing::info!(verbindung = %tag, fehler = ?fehler, "Schreibseite tot");
                break;
            }
        };

        if verbindung.log_modus {
            // Gelegentliche Keepalive-Daten eines log-Clients, verwerfen
            continue;
        }

        if verbindung.sammelt_koerper() {
            match koerper_zeile_entgegennehmen(&zeile) {
                Some(datenzeile) => verbindung.koerper.push(datenzeile),
                None => {
                    let ziel = verbindung.koerper_ziel.take().expect("Sammlung aktiv");
                    let koerper = std::mem::take(&mut verbindung.koerper);
                    handler::koerper_abschliessen(&kontext, &mut verbindung, ziel, koerper).await;
                }
            }
            continue;
        }

        zeile_verarbeiten(&kontext, &mut verbindung, &zeile).await;
    }

    // Abraeumen: Sitzung, Sperren, RTP-Empfaenger, Ereignis-Abonnement
    if let Some(abo) = verbindung.log_abo.take() {
        kontext.log.austragen(&abo);
    }
    kontext.verbindung_abraeumen(verbindung.tag.0, verbindung.rtp_ziel);
    tracing::debug!(verbindung = %tag, "Verbindung abgeraeumt");
}

/// Normalisiert, zerlegt und dispatcht eine Befehlszeile
async fn zeile_verarbeiten<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    zeile: &str,
) {
    // So frueh wie moeglich nach NFC normalisieren
    let zeile: String = zeile.nfc().collect();

    let ergebnis = dispatchen(kontext, verbindung, &zeile).await;
    if let Err(fehler) = ergebnis {
        let _ = verbindung
            .schreiber
            .zeile(&format!("{} {}", fehler.protokoll_code(), fehler));
    }
}

async fn dispatchen<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    zeile: &str,
) -> Result<(), crate::fehler::ProtokollFehler> {
    use crate::fehler::ProtokollFehler;

    let tokens = spalten(zeile, SpaltOptionen::protokoll())
        .map_err(|fehler| ProtokollFehler::Parse(fehler.to_string()))?;
    if tokens.is_empty() {
        return Err(ProtokollFehler::Parse("do what?".into()));
    }

    let name = tokens[0].as_str();
    let argumente = &tokens[1..];

    let eintrag = handler::tabelle()
        .iter()
        .find(|b| b.name == name)
        .ok_or(ProtokollFehler::UnbekannterBefehl)?;

    if eintrag.rechte != 0 && !verbindung.rechte().hat(eintrag.rechte) {
        tracing::info!(
            verbindung = %verbindung.tag,
            benutzer = verbindung.benutzer.as_deref().unwrap_or("-"),
            befehl = name,
            "Befehl ohne noetige Rechte"
        );
        return Err(ProtokollFehler::NichtAutorisiert("Prohibited".into()));
    }
    if argumente.len() < eintrag.min {
        return Err(ProtokollFehler::ZuWenigArgumente);
    }
    if argumente.len() > eintrag.max {
        return Err(ProtokollFehler::ZuVieleArgumente);
    }

    handler::ausfuehren(kontext, verbindung, eintrag.art, argumente).await
}
