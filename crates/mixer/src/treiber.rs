//! Der Mixer-Treiber
//!
//! Besitzt das Backend und dessen Geraetezustand. Nach einem
//! Backend-Fehler wird eine kurze Wartezeit erzwungen bevor die naechste
//! Aktivierung versucht wird; ohne sie wuerde die Abspielschleife bei
//! kaputtem Geraet heisslaufen.

use std::time::Duration;

use musikbox_eventlog::{ereignis, EventLog};
use tokio::time::Instant;

use crate::backend::{AudioBackend, Backend};
use crate::fehler::MixerFehler;

/// Wartezeit nach einem Geraetefehler
const FEHLER_PAUSE: Duration = Duration::from_secs(5);

/// Zustand des Audio-Geraets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeraeteZustand {
    Geschlossen,
    Offen,
    Fehler,
}

/// Treiber ueber genau einem Backend
pub struct MixerTreiber {
    backend: AudioBackend,
    zustand: GeraeteZustand,
    naechster_versuch: Option<Instant>,
    lautstaerke: (u32, u32),
    log: EventLog,
}

impl MixerTreiber {
    pub fn neu(backend: AudioBackend, log: EventLog) -> Self {
        Self {
            backend,
            zustand: GeraeteZustand::Geschlossen,
            naechster_versuch: None,
            lautstaerke: (100, 100),
            log,
        }
    }

    pub fn zustand(&self) -> GeraeteZustand {
        self.zustand
    }

    pub fn backend(&self) -> &AudioBackend {
        &self.backend
    }

    pub fn kanaele(&self) -> u32 {
        self.backend.kanaele()
    }

    // -----------------------------------------------------------------------
    // Geraetezustand
    // -----------------------------------------------------------------------

    /// Stellt sicher dass das Geraet offen und aktiv ist
    ///
    /// Nach einem Fehler wird erst nach Ablauf der Fehler-Pause erneut
    /// versucht. Gibt `true` zurueck wenn gespielt werden kann.
    pub async fn aktiv_sicherstellen(&mut self) -> bool {
        if let Some(frist) = self.naechster_versuch {
            if Instant::now() < frist {
                return false;
            }
            self.naechster_versuch = None;
        }

        match self.zustand {
            GeraeteZustand::Offen => true,
            GeraeteZustand::Geschlossen | GeraeteZustand::Fehler => {
                let ergebnis = async {
                    if self.zustand == GeraeteZustand::Geschlossen {
                        self.backend.init().await?;
                    }
                    self.backend.aktivieren().await
                }
                .await;
                match ergebnis {
                    Ok(()) => {
                        self.zustand = GeraeteZustand::Offen;
                        true
                    }
                    Err(fehler) => {
                        tracing::error!(backend = self.backend.name(), fehler = %fehler,
                            "Geraet liess sich nicht aktivieren");
                        self.zustand = GeraeteZustand::Fehler;
                        self.naechster_versuch = Some(Instant::now() + FEHLER_PAUSE);
                        false
                    }
                }
            }
        }
    }

    /// Deaktiviert das Backend (Pause, Warteschlange leer)
    ///
    /// Die naechste Aktivierung laeuft wieder ueber `aktiv_sicherstellen`;
    /// beim RTP-Backend traegt das erste Paket danach das M-Bit.
    pub async fn deaktivieren(&mut self) {
        if self.zustand == GeraeteZustand::Offen {
            if let Err(fehler) = self.backend.deaktivieren().await {
                tracing::warn!(fehler = %fehler, "Deaktivieren fehlgeschlagen");
            }
            self.zustand = GeraeteZustand::Geschlossen;
        }
    }

    /// Meldet dem Backend eine bevorstehende Wartephase
    pub fn vor_poll(&self, timeout: &mut Option<Duration>) {
        self.backend.vor_poll(timeout);
    }

    pub fn bereit(&self) -> bool {
        self.backend.bereit()
    }

    // -----------------------------------------------------------------------
    // Abspielen
    // -----------------------------------------------------------------------

    /// Spielt einen Block ganzer Frames; wendet vorher die Lautstaerke an
    ///
    /// Gibt die Anzahl gespielter Frames zurueck. Ein Backend-Fehler
    /// versetzt das Geraet in den Fehlerzustand (mit Wartezeit), ein
    /// fataler RTP-Fehler wird durchgereicht.
    pub async fn block_spielen(&mut self, samples: &[i16]) -> Result<usize, MixerFehler> {
        let kanaele = self.backend.kanaele() as usize;
        let ganze = samples.len() / kanaele * kanaele;
        if ganze == 0 {
            return Ok(0);
        }

        let angepasst = self.lautstaerke_anwenden(&samples[..ganze]);
        match self.backend.spielen(&angepasst).await {
            Ok(frames) => Ok(frames),
            Err(MixerFehler::Rtp(fehler)) => Err(MixerFehler::Rtp(fehler)),
            Err(fehler) => {
                tracing::error!(backend = self.backend.name(), fehler = %fehler, "Abspielfehler");
                self.zustand = GeraeteZustand::Fehler;
                self.naechster_versuch = Some(Instant::now() + FEHLER_PAUSE);
                Ok(0)
            }
        }
    }

    fn lautstaerke_anwenden(&self, samples: &[i16]) -> Vec<i16> {
        let (links, rechts) = self.lautstaerke;
        if links == 100 && rechts == 100 {
            return samples.to_vec();
        }
        let kanaele = self.backend.kanaele() as usize;
        samples
            .iter()
            .enumerate()
            .map(|(n, &s)| {
                let faktor = if kanaele == 2 && n % 2 == 1 {
                    rechts
                } else {
                    links
                };
                ((s as i32 * faktor as i32) / 100).clamp(i16::MIN as i32, i16::MAX as i32) as i16
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Lautstaerke
    // -----------------------------------------------------------------------

    pub fn lautstaerke(&self) -> (u32, u32) {
        self.lautstaerke
    }

    /// Setzt die Lautstaerke (0..=100 je Kanal) und meldet sie im
    /// Ereignisprotokoll
    pub fn lautstaerke_setzen(&mut self, links: u32, rechts: u32) {
        self.lautstaerke = (links.min(100), rechts.min(100));
        self.log
            .veroeffentlichen(&ereignis::lautstaerke(self.lautstaerke.0, self.lautstaerke.1));
    }
}
