//! Musikbox-Server
//!
//! Verdrahtet alle Teile: TrackDB, Ereignis-Bus, Warteschlange, Mixer,
//! RTP, Protokoll-Listener, Signale, Planer und Abspielschleife.

pub mod config;
pub mod pipeline;
pub mod planer;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use musikbox_auth::{CookieFabrik, HashAlgorithmus};
use musikbox_eventlog::EventLog;
use musikbox_mixer::{
    AudioBackend, DekoderTabelle, KommandoBackend, MixerTreiber, RtpAudioBackend,
};
use musikbox_protocol::{verbindung_behandeln, ProtokollKonfig, ServerKontext};
use musikbox_queue::{AbspielStatus, GewichteteWahl, Warteschlange, WarteschlangenKonfig};
use musikbox_reactor::{Lauscher, Signale, Zeitplaner};
use musikbox_rtp::sender::EmpfaengerListe;
use musikbox_rtp::{RtpKonfig, RtpSender};
use musikbox_trackdb::repository::{TitelKatalog, VorliebenRepository};
use musikbox_trackdb::MemorySpeicher;
use tokio::net::{TcpListener, UnixListener};
use tokio::signal::unix::SignalKind;
use tokio::sync::{mpsc, oneshot, watch, Notify, RwLock};
use tokio::time::Duration;

use config::ServerConfig;

/// Der Server: haelt Konfiguration und faehrt alles hoch
pub struct Server {
    config: ServerConfig,
    config_pfad: String,
}

impl Server {
    pub fn neu(config: ServerConfig, config_pfad: String) -> Self {
        Self { config, config_pfad }
    }

    /// Startet den Server und blockiert bis zum Shutdown
    pub async fn starten(self) -> anyhow::Result<()> {
        let Server { config, config_pfad } = self;

        // -------------------------------------------------------------------
        // TrackDB
        // -------------------------------------------------------------------
        let db = Arc::new(MemorySpeicher::neu());
        if let Some(wurzel) = &config.warteschlange.musik_wurzel {
            match db.abgleichen(wurzel).await {
                Ok(anzahl) => {
                    tracing::info!(wurzel = %wurzel.display(), titel = anzahl, "Katalog eingelesen")
                }
                Err(fehler) => {
                    tracing::warn!(wurzel = %wurzel.display(), fehler = %fehler,
                        "Katalog nicht einlesbar")
                }
            }
        }

        // -------------------------------------------------------------------
        // Ereignis-Bus und Warteschlange
        // -------------------------------------------------------------------
        let log = EventLog::neu();
        let mut warteschlange = Warteschlange::neu(
            WarteschlangenKonfig {
                queue_pad: config.warteschlange.queue_pad,
                historie: config.warteschlange.history,
                replay_min: config.warteschlange.replay_min,
                scratch_jingles: config.warteschlange.scratch.clone(),
            },
            log.clone(),
        );

        if let Some(pfad) = &config.warteschlange.statusdatei {
            match tokio::fs::read_to_string(pfad).await {
                Ok(inhalt) => {
                    warteschlange.wiederherstellen(inhalt.lines().map(|z| z.to_string()));
                    tracing::info!(
                        pfad = %pfad.display(),
                        eintraege = warteschlange.anstehende().count(),
                        "Warteschlange wiederhergestellt"
                    );
                }
                Err(fehler) if fehler.kind() == std::io::ErrorKind::NotFound => {}
                Err(fehler) => {
                    tracing::warn!(pfad = %pfad.display(), fehler = %fehler,
                        "Warteschlangen-Datei nicht lesbar")
                }
            }
        }

        // Schalterzustand ueberlebt Neustarts in den globalen Vorlieben
        if let Ok(Some(wert)) = db.global("playing").await {
            if wert == "no" {
                warteschlange.abspielen_schalten(false);
            }
        }
        if let Ok(Some(wert)) = db.global("random-play").await {
            if wert == "no" {
                warteschlange.zufall_schalten(false);
            }
        }
        let warteschlange = Arc::new(RwLock::new(warteschlange));

        // -------------------------------------------------------------------
        // Auth: Algorithmus, Cookies, Schluesselrotation
        // -------------------------------------------------------------------
        let algorithmus = HashAlgorithmus::parsen(&config.auth.authorization_algorithm)
            .map_err(|fehler| anyhow::anyhow!("Konfiguration: {fehler}"))?;
        let cookies = Arc::new(CookieFabrik::neu(config.auth.cookie_login_lifetime));
        {
            let cookies = Arc::clone(&cookies);
            let intervall = Duration::from_secs(config.auth.cookie_key_lifetime.max(60) as u64);
            tokio::spawn(async move {
                let mut takt = tokio::time::interval(intervall);
                takt.tick().await; // der erste Tick kommt sofort
                loop {
                    takt.tick().await;
                    cookies.rotieren();
                }
            });
        }

        // -------------------------------------------------------------------
        // Audio-Backend und Mixer
        // -------------------------------------------------------------------
        let (backend, rtp_empfaenger, rtp_adresse) = match config.audio.backend.as_str() {
            "command" => (
                AudioBackend::Kommando(KommandoBackend::neu(
                    config.audio.sink_kommando.clone(),
                    config.audio.kanaele,
                )),
                EmpfaengerListe::default(),
                None,
            ),
            "rtp" => {
                let sender = RtpSender::oeffnen(RtpKonfig {
                    ziel: config.rtp.ziel,
                    quelle: config.rtp.quelle,
                    multicast_ttl: config.rtp.multicast_ttl,
                    multicast_loop: config.rtp.multicast_loop,
                    max_nutzlast: config.rtp.rtp_max_payload,
                    rate: 44_100,
                    kanaele: config.audio.kanaele,
                })
                .context("RTP-Socket liess sich nicht oeffnen")?;
                let empfaenger = sender.empfaenger();
                (
                    AudioBackend::Rtp(RtpAudioBackend::neu(sender, config.audio.kanaele)),
                    empfaenger,
                    config.rtp.ziel,
                )
            }
            anderes => anyhow::bail!("Unbekanntes Audio-Backend '{anderes}'"),
        };
        let mixer = Arc::new(tokio::sync::Mutex::new(MixerTreiber::neu(
            backend,
            log.clone(),
        )));
        let dekoder = Arc::new(DekoderTabelle::neu(
            config
                .audio
                .dekoder
                .iter()
                .map(|d| (d.endung.clone(), d.kommando.clone()))
                .collect(),
        ));

        // -------------------------------------------------------------------
        // Kontext
        // -------------------------------------------------------------------
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reconfigure_tx, mut reconfigure_rx) = mpsc::channel::<oneshot::Sender<bool>>(4);

        let kontext = ServerKontext {
            db: Arc::clone(&db),
            log: log.clone(),
            warteschlange: Arc::clone(&warteschlange),
            mixer: Arc::clone(&mixer),
            dekoder: Arc::clone(&dekoder),
            cookies: Arc::clone(&cookies),
            konfig: Arc::new(ProtokollKonfig {
                algorithmus,
                remote_userman: config.auth.remote_userman,
                default_rights: config.auth.default_rights.clone(),
                playlist_max: config.playlists.playlist_max,
                playlist_lock_timeout: config.playlists.playlist_lock_timeout,
                reminder_interval: config.auth.reminder_interval,
                new_max: config.warteschlange.new_max,
                statusdatei: config.warteschlange.statusdatei.clone(),
                rescan_kommando: config.helfer.rescan_kommando.clone(),
                mail_kommando: config.helfer.mail_kommando.clone(),
                musik_wurzel: config.warteschlange.musik_wurzel.clone(),
                rtp_adresse,
            }),
            rtp_empfaenger,
            sitzungen: Arc::new(dashmap::DashMap::new()),
            sperren: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
            erinnerungen: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
            anstoss: Arc::new(Notify::new()),
            shutdown: shutdown_tx.clone(),
            reconfigure: reconfigure_tx.clone(),
        };

        // -------------------------------------------------------------------
        // Listener
        // -------------------------------------------------------------------
        let mut listener_anzahl = 0usize;
        for adresse in &config.netzwerk.tcp_listener {
            match TcpListener::bind(adresse).await {
                Ok(listener) => {
                    tracing::info!(adresse = %adresse, "TCP-Listener gebunden");
                    listener_anzahl += 1;
                    let kontext = kontext.clone();
                    tokio::spawn(async move {
                        let _ = Lauscher::tcp(listener, move |strom, peer| {
                            tracing::debug!(peer = %peer, "TCP-Verbindung angenommen");
                            let kontext = kontext.clone();
                            tokio::spawn(verbindung_behandeln(kontext, strom, false));
                        })
                        .await;
                    });
                }
                Err(fehler) => {
                    tracing::error!(adresse = %adresse, fehler = %fehler,
                        "TCP-Listener nicht bindbar")
                }
            }
        }

        let mut unix_pfad: Option<PathBuf> = None;
        if let Some(pfad) = &config.netzwerk.unix_socket {
            let _ = std::fs::remove_file(pfad);
            match UnixListener::bind(pfad) {
                Ok(listener) => {
                    tracing::info!(pfad = %pfad.display(), "Unix-Listener gebunden");
                    listener_anzahl += 1;
                    unix_pfad = Some(pfad.clone());
                    let kontext = kontext.clone();
                    tokio::spawn(async move {
                        let _ = Lauscher::unix(listener, move |strom| {
                            let kontext = kontext.clone();
                            // Unix-Socket-Verbindungen bekommen `_local`
                            tokio::spawn(verbindung_behandeln(kontext, strom, true));
                        })
                        .await;
                    });
                }
                Err(fehler) => {
                    tracing::error!(pfad = %pfad.display(), fehler = %fehler,
                        "Unix-Listener nicht bindbar")
                }
            }
        }

        if listener_anzahl == 0 {
            anyhow::bail!("Kein Listener gebunden, Start abgebrochen");
        }

        // -------------------------------------------------------------------
        // Signale: TERM/INT beenden, HUP laedt die Konfiguration neu
        // -------------------------------------------------------------------
        {
            let shutdown = shutdown_tx.clone();
            Signale::registrieren(SignalKind::terminate(), move || {
                tracing::info!("SIGTERM, fahre herunter");
                let _ = shutdown.send(true);
            })?;
        }
        {
            let shutdown = shutdown_tx.clone();
            Signale::registrieren(SignalKind::interrupt(), move || {
                tracing::info!("SIGINT, fahre herunter");
                let _ = shutdown.send(true);
            })?;
        }
        {
            let reconfigure = reconfigure_tx.clone();
            Signale::registrieren(SignalKind::hangup(), move || {
                let (tx, _rx) = oneshot::channel();
                let _ = reconfigure.try_send(tx);
            })?;
        }

        // Reconfigure-Auftraege (Befehl und SIGHUP) laufen hier zusammen
        {
            let pfad = config_pfad.clone();
            tokio::spawn(async move {
                while let Some(antwort) = reconfigure_rx.recv().await {
                    let ok = match ServerConfig::laden(&pfad) {
                        Ok(_neu) => {
                            tracing::info!(
                                pfad = pfad,
                                "Konfiguration neu eingelesen; Listener und Audio-Backend \
                                 uebernehmen Aenderungen erst beim Neustart"
                            );
                            true
                        }
                        Err(fehler) => {
                            tracing::error!(fehler = %fehler, "Reconfigure fehlgeschlagen");
                            false
                        }
                    };
                    let _ = antwort.send(ok);
                }
            });
        }

        // -------------------------------------------------------------------
        // Planer und Abspielschleife
        // -------------------------------------------------------------------
        let zeitplaner = Zeitplaner::starten();
        let wahl = GewichteteWahl::neu(
            Arc::clone(&db),
            config.warteschlange.new_bias_age,
            config.warteschlange.new_bias,
        );
        tokio::spawn(pipeline::abspielschleife(
            kontext.clone(),
            wahl,
            shutdown_rx.clone(),
        ));
        tokio::spawn(planer::planer_schleife(
            kontext.clone(),
            zeitplaner,
            shutdown_rx.clone(),
        ));

        tracing::info!(version = env!("CARGO_PKG_VERSION"), "Musikbox-Server bereit");

        // -------------------------------------------------------------------
        // Auf Shutdown warten und aufraeumen
        // -------------------------------------------------------------------
        let mut shutdown_rx = shutdown_rx;
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }

        // Erst sichern (der spielende Eintrag soll den Neustart ueberleben),
        // dann als unterbrochen kennzeichnen
        kontext.warteschlange_sichern().await;
        {
            let mut w = kontext.warteschlange.write().await;
            if w.spielend().is_some() {
                w.abspiel_beendet(AbspielStatus::Quitting, 0);
            }
        }
        if let Some(pfad) = unix_pfad {
            let _ = std::fs::remove_file(pfad);
        }
        tracing::info!("Server beendet");
        Ok(())
    }
}
