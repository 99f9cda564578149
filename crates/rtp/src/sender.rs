//! RTP-Sender
//!
//! Haelt einen 64-Bit-Sample-Zaehler `rtp_time` (gesendete Samples, nicht
//! Frames) und bildet ihn plus Zufallsversatz auf den 32-Bit-
//! Drahtzeitstempel ab. Nach Leerlauf wird der Zaehler auf die Wanduhr
//! vorgerueckt, damit Empfaenger die richtige Stille einlegen; rueckwaerts
//! bewegt er sich nie.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{Duration, Instant};

use crate::paket::{samples_anhaengen, RtpHeader, PAYLOAD_TYP_MONO, PAYLOAD_TYP_STEREO};

/// Wie weit der Sender der Wanduhr vorauslaufen darf
const RTP_VORAUS_MS: u64 = 1000;

/// Soviele Sendefehler in Folge sind fatal
const FEHLER_LIMIT: u32 = 10;

/// Wunschgroesse des Socket-Sendepuffers
const ZIEL_SNDBUF: usize = 131072;

/// Konfiguration des RTP-Senders
#[derive(Debug, Clone)]
pub struct RtpKonfig {
    /// Konfiguriertes Ziel (Unicast, Broadcast oder Multicast-Gruppe);
    /// `None` heisst reiner Request-Betrieb
    pub ziel: Option<SocketAddr>,
    /// Optionale Quelladresse (bind vor dem Senden)
    pub quelle: Option<SocketAddr>,
    /// TTL fuer Multicast-Gruppen
    pub multicast_ttl: u32,
    /// Multicast-Loopback
    pub multicast_loop: bool,
    /// Maximale Nutzlast pro Paket in Bytes (1500 - UDP - IP - Reserve)
    pub max_nutzlast: usize,
    /// Abtastrate in Hz
    pub rate: u32,
    /// Kanalanzahl (1 oder 2)
    pub kanaele: u32,
}

impl Default for RtpKonfig {
    fn default() -> Self {
        Self {
            ziel: None,
            quelle: None,
            multicast_ttl: 1,
            multicast_loop: true,
            max_nutzlast: 1444,
            rate: 44_100,
            kanaele: 2,
        }
    }
}

/// Fehlerzustaende des Senders
#[derive(Debug, Error)]
pub enum SendeFehler {
    #[error("Socket-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zu viele Sendefehler in Folge ({FEHLER_LIMIT})")]
    ZuVieleFehler,
}

/// Geteilte Liste der per `rtp-request` registrierten Unicast-Empfaenger
#[derive(Clone, Default)]
pub struct EmpfaengerListe {
    innen: Arc<DashMap<SocketAddr, ()>>,
}

impl EmpfaengerListe {
    pub fn hinzufuegen(&self, addr: SocketAddr) {
        self.innen.insert(addr, ());
        tracing::info!(ziel = %addr, "RTP-Empfaenger registriert");
    }

    pub fn entfernen(&self, addr: &SocketAddr) {
        self.innen.remove(addr);
        tracing::info!(ziel = %addr, "RTP-Empfaenger ausgetragen");
    }

    pub fn anzahl(&self) -> usize {
        self.innen.len()
    }

    fn alle(&self) -> Vec<SocketAddr> {
        self.innen.iter().map(|e| *e.key()).collect()
    }
}

/// Der RTP-Sender; alleiniger Mutator von `rtp_time`
pub struct RtpSender {
    socket: UdpSocket,
    konfig: RtpKonfig,
    empfaenger: EmpfaengerListe,
    payload_typ: u8,
    ssrc: u32,
    sequenz: u16,
    zeitversatz: u32,
    /// Gesendete Samples seit Start (64 Bit gegen Mehrdeutigkeit in
    /// langen Sitzungen)
    rtp_time: u64,
    start: Instant,
    fehler: u32,
    marker: bool,
}

impl RtpSender {
    /// Oeffnet den Socket und wuerfelt die RFC-3550-Anfangswerte
    pub fn oeffnen(konfig: RtpKonfig) -> std::io::Result<Self> {
        let bind_addr = konfig.quelle.unwrap_or_else(|| match konfig.ziel {
            Some(SocketAddr::V6(_)) => "[::]:0".parse().expect("gueltige Adresse"),
            _ => "0.0.0.0:0".parse().expect("gueltige Adresse"),
        });
        let socket = std::net::UdpSocket::bind(bind_addr)?;

        if let Some(ziel) = konfig.ziel {
            if ziel.ip().is_multicast() {
                match ziel {
                    SocketAddr::V4(_) => {
                        socket.set_multicast_ttl_v4(konfig.multicast_ttl)?;
                        socket.set_multicast_loop_v4(konfig.multicast_loop)?;
                    }
                    SocketAddr::V6(_) => {
                        socket.set_multicast_loop_v6(konfig.multicast_loop)?;
                    }
                }
                tracing::info!(
                    ziel = %ziel,
                    ttl = konfig.multicast_ttl,
                    loopback = konfig.multicast_loop,
                    "RTP: Multicast"
                );
            } else if broadcast_schnittstelle_vorhanden(&ziel) {
                socket.set_broadcast(true)?;
                tracing::info!(ziel = %ziel, "RTP: Broadcast");
            } else {
                tracing::info!(ziel = %ziel, "RTP: Unicast");
            }
        }

        // Sendepuffer bestmoeglich vergroessern; Scheitern ist kein Fehler
        match nix::sys::socket::setsockopt(&socket, nix::sys::socket::sockopt::SndBuf, &ZIEL_SNDBUF)
        {
            Ok(()) => tracing::debug!(bytes = ZIEL_SNDBUF, "SO_SNDBUF gesetzt"),
            Err(fehler) => {
                tracing::info!(fehler = %fehler, "SO_SNDBUF nicht vergroesserbar, Standard bleibt")
            }
        }

        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;

        let payload_typ = if konfig.kanaele == 1 {
            PAYLOAD_TYP_MONO
        } else {
            PAYLOAD_TYP_STEREO
        };

        // RFC 3550 verlangt zufaellige Anfangswerte
        let mut rng = rand::thread_rng();
        Ok(Self {
            socket,
            konfig,
            empfaenger: EmpfaengerListe::default(),
            payload_typ,
            ssrc: rng.gen(),
            sequenz: rng.gen(),
            zeitversatz: rng.gen(),
            rtp_time: 0,
            start: Instant::now(),
            fehler: 0,
            marker: true,
        })
    }

    /// Geteiltes Handle auf die Request-Empfaengerliste
    pub fn empfaenger(&self) -> EmpfaengerListe {
        self.empfaenger.clone()
    }

    /// Setzt das M-Bit auf das naechste Paket (Start oder Fortsetzung)
    pub fn markieren(&mut self) {
        self.marker = true;
    }

    /// Anzahl Samples (nicht Frames) die in ein Paket passen
    fn samples_pro_paket(&self) -> usize {
        let frame = self.konfig.kanaele as usize;
        ((self.konfig.max_nutzlast / 2) / frame) * frame
    }

    /// Sample-Sollstand nach Wanduhr
    fn soll_samples(&self) -> u64 {
        let us = self.start.elapsed().as_micros();
        let mut ziel = (us * self.konfig.rate as u128 * self.konfig.kanaele as u128
            / 1_000_000) as u64;
        if self.konfig.kanaele == 2 {
            ziel &= !1; // ganze Frames
        }
        ziel
    }

    fn voraus_samples(&self) -> u64 {
        RTP_VORAUS_MS * self.konfig.rate as u64 * self.konfig.kanaele as u64 / 1000
    }

    /// Rueckt `rtp_time` nach Leerlauf auf die Wanduhr vor
    fn zeit_reparieren(&mut self) {
        let soll = self.soll_samples();
        if soll > self.rtp_time {
            tracing::debug!(
                luecke_samples = soll - self.rtp_time,
                "RTP-Zeit nach Leerlauf vorgerueckt"
            );
            self.rtp_time = soll;
        } else if self.rtp_time - soll > self.voraus_samples() {
            // Rueckwaerts geht nie, Pakete duerfen sich nicht ueberlappen
            tracing::warn!(
                voraus_samples = self.rtp_time - soll,
                "RTP-Zeit laeuft der Wanduhr zu weit voraus"
            );
        }
    }

    /// Kann der Sender gerade Nachschub brauchen?
    pub fn bereit(&self) -> bool {
        self.rtp_time <= self.soll_samples() + self.voraus_samples()
    }

    /// Wartet bis der Sender wieder hinter der Voraus-Schwelle liegt
    pub async fn takt_abwarten(&self) {
        let soll = self.soll_samples();
        let schwelle = soll + self.voraus_samples();
        if self.rtp_time > schwelle {
            let ueberhang = self.rtp_time - schwelle;
            let us =
                ueberhang as u128 * 1_000_000 / (self.konfig.rate as u128 * self.konfig.kanaele as u128);
            tokio::time::sleep(Duration::from_micros(us as u64)).await;
        }
    }

    /// Aktueller Drahtzeitstempel (Versatz + niedrige 32 Bit)
    pub fn drahtzeitstempel(&self) -> u32 {
        self.zeitversatz.wrapping_add(self.rtp_time as u32)
    }

    /// Paketiert und versendet Samples; gibt die gesendete Sample-Anzahl
    /// zurueck
    pub async fn senden(&mut self, samples: &[i16]) -> Result<usize, SendeFehler> {
        self.zeit_reparieren();

        let pro_paket = self.samples_pro_paket();
        let mut gesendet = 0;
        for block in samples.chunks(pro_paket) {
            let kopf = RtpHeader {
                marker: std::mem::take(&mut self.marker),
                payload_typ: self.payload_typ,
                sequenz: self.sequenz,
                zeitstempel: self.drahtzeitstempel(),
                ssrc: self.ssrc,
            };
            self.sequenz = self.sequenz.wrapping_add(1);

            let mut paket = Vec::with_capacity(crate::paket::RTP_HEADER_LAENGE + block.len() * 2);
            paket.extend_from_slice(&kopf.encode());
            samples_anhaengen(&mut paket, block);

            self.uebertragen(&paket).await?;
            self.rtp_time += block.len() as u64;
            gesendet += block.len();
        }
        Ok(gesendet)
    }

    /// Schickt ein fertiges Paket an Ziel und alle Request-Empfaenger
    async fn uebertragen(&mut self, paket: &[u8]) -> Result<(), SendeFehler> {
        let mut ziele = self.empfaenger.alle();
        if let Some(ziel) = self.konfig.ziel {
            ziele.push(ziel);
        }
        if ziele.is_empty() {
            // Niemand hoert zu; der Zaehler laeuft trotzdem weiter
            return Ok(());
        }

        let mut erfolg = false;
        for ziel in ziele {
            match self.socket.send_to(paket, ziel).await {
                Ok(_) => erfolg = true,
                Err(fehler) => {
                    tracing::warn!(ziel = %ziel, fehler = %fehler, "RTP-Sendefehler");
                }
            }
        }

        if erfolg {
            self.fehler /= 2; // langsamer Abbau
            Ok(())
        } else {
            self.fehler += 1;
            if self.fehler >= FEHLER_LIMIT {
                tracing::error!(anzahl = self.fehler, "Zu viele RTP-Sendefehler, gebe auf");
                Err(SendeFehler::ZuVieleFehler)
            } else {
                Ok(())
            }
        }
    }
}

/// Prueft ob eine Schnittstelle mit genau dieser Broadcast-Adresse existiert
fn broadcast_schnittstelle_vorhanden(ziel: &SocketAddr) -> bool {
    let schnittstellen = match nix::ifaddrs::getifaddrs() {
        Ok(s) => s,
        Err(fehler) => {
            tracing::debug!(fehler = %fehler, "getifaddrs fehlgeschlagen");
            return false;
        }
    };
    for schnittstelle in schnittstellen {
        let Some(broadcast) = schnittstelle.broadcast else {
            continue;
        };
        if let Some(sin) = broadcast.as_sockaddr_in() {
            if std::net::IpAddr::V4(std::net::Ipv4Addr::from(sin.ip())) == ziel.ip() {
                return true;
            }
        }
    }
    false
}
