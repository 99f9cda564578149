//! Gepufferte Lese- und Schreibseiten einer Verbindung
//!
//! Eine Verbindung wird per `tokio::io::split` in Lese- und Schreibseite
//! zerlegt; der Strom selbst lebt solange noch eine der beiden Haelften
//! existiert. Die Schreibseite laeuft als eigene Task mit Warteschlange
//! und setzt zwei Schranken durch:
//!
//! - **Zeitschranke** (Standard 600 s): maximale Zeit zwischen zwei
//!   erfolgreichen Schreibvorgaengen waehrend Daten anstehen. Wird sie
//!   ueberschritten gilt die Verbindung als tot.
//! - **Platzschranke** (Standard 512 KiB): maximale gepufferte Menge.
//!   Wird sie ueberschritten wird die Schreibseite aufgegeben.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};

/// Maximale Zeilenlaenge auf der Leseseite
const ZEILENLIMIT_BYTES: usize = 8192;

/// Schranken der Schreibseite
#[derive(Debug, Clone, Copy)]
pub struct SchreiberGrenzen {
    /// Maximale Zeit zwischen erfolgreichen Schreibvorgaengen
    pub zeit_schranke: Duration,
    /// Maximale gepufferte Byte-Menge
    pub platz_schranke: usize,
}

impl Default for SchreiberGrenzen {
    fn default() -> Self {
        Self {
            zeit_schranke: Duration::from_secs(600),
            platz_schranke: 512 * 1024,
        }
    }
}

/// Fehlerzustaende der Schreibseite
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchreiberFehler {
    #[error("Zeitschranke ueberschritten: kein erfolgreicher Schreibvorgang binnen {0:?}")]
    ZeitSchranke(Duration),

    #[error("Platzschranke ueberschritten: {gepuffert} Bytes anstehend (Schranke {schranke})")]
    PlatzSchranke { gepuffert: usize, schranke: usize },

    #[error("Schreibfehler: {0}")]
    Io(String),

    #[error("Schreibseite geschlossen")]
    Geschlossen,
}

enum Auftrag {
    Daten(Vec<u8>),
    /// Bestaetigt sobald alles bis hierher geschrieben wurde
    Leeren(oneshot::Sender<()>),
}

/// Handle auf die Schreibseite einer Verbindung
///
/// `senden` reiht Daten nur ein; die eigentliche Uebertragung erledigt
/// die Schreib-Task. Nach einem Fehler schlagen alle weiteren Sendungen
/// fehl; der Zustand ist ueber [`Schreiber::fehler_beobachten`] abonnierbar.
#[derive(Clone)]
pub struct Schreiber {
    tx: mpsc::UnboundedSender<Auftrag>,
    gepuffert: Arc<AtomicUsize>,
    grenzen: SchreiberGrenzen,
    fehler_rx: watch::Receiver<Option<SchreiberFehler>>,
}

impl Schreiber {
    /// Startet die Schreib-Task ueber der gegebenen Senke
    pub fn starten<W>(senke: W, grenzen: SchreiberGrenzen, label: String) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let gepuffert = Arc::new(AtomicUsize::new(0));
        let (fehler_tx, fehler_rx) = watch::channel(None);

        tokio::spawn(schreib_task(
            senke,
            rx,
            Arc::clone(&gepuffert),
            grenzen,
            fehler_tx,
            label,
        ));

        Self {
            tx,
            gepuffert,
            grenzen,
            fehler_rx,
        }
    }

    /// Reiht Daten zum Versand ein
    ///
    /// Schlaegt fehl wenn die Platzschranke ueberschritten wuerde oder die
    /// Schreibseite bereits tot ist.
    pub fn senden(&self, daten: impl Into<Vec<u8>>) -> Result<(), SchreiberFehler> {
        if let Some(f) = self.fehler_rx.borrow().as_ref() {
            return Err(f.clone());
        }
        let daten = daten.into();
        let neu = self.gepuffert.fetch_add(daten.len(), Ordering::SeqCst) + daten.len();
        if neu > self.grenzen.platz_schranke {
            self.gepuffert.fetch_sub(daten.len(), Ordering::SeqCst);
            return Err(SchreiberFehler::PlatzSchranke {
                gepuffert: neu,
                schranke: self.grenzen.platz_schranke,
            });
        }
        self.tx
            .send(Auftrag::Daten(daten))
            .map_err(|_| SchreiberFehler::Geschlossen)
    }

    /// Reiht eine Textzeile (mit `\n`) zum Versand ein
    pub fn zeile(&self, text: &str) -> Result<(), SchreiberFehler> {
        let mut daten = Vec::with_capacity(text.len() + 1);
        daten.extend_from_slice(text.as_bytes());
        daten.push(b'\n');
        self.senden(daten)
    }

    /// Wartet bis alle bis jetzt eingereihten Daten geschrieben wurden
    pub async fn leeren(&self) -> Result<(), SchreiberFehler> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Auftrag::Leeren(tx))
            .map_err(|_| SchreiberFehler::Geschlossen)?;
        rx.await.map_err(|_| SchreiberFehler::Geschlossen)
    }

    /// Beobachtet den Fehlerzustand der Schreibseite
    pub fn fehler_beobachten(&self) -> watch::Receiver<Option<SchreiberFehler>> {
        self.fehler_rx.clone()
    }

    /// Gibt die aktuell gepufferte Byte-Menge zurueck
    pub fn gepufferte_bytes(&self) -> usize {
        self.gepuffert.load(Ordering::SeqCst)
    }
}

async fn schreib_task<W>(
    mut senke: W,
    mut rx: mpsc::UnboundedReceiver<Auftrag>,
    gepuffert: Arc<AtomicUsize>,
    grenzen: SchreiberGrenzen,
    fehler_tx: watch::Sender<Option<SchreiberFehler>>,
    label: String,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        // Auch ohne anstehende Daten gilt die Zeitschranke: eine
        // Verbindung ohne einen erfolgreichen Schreibvorgang im Intervall
        // ist tot (Clients halten sich mit nop am Leben)
        let auftrag = match tokio::time::timeout(grenzen.zeit_schranke, rx.recv()).await {
            Ok(Some(auftrag)) => auftrag,
            Ok(None) => break,
            Err(_) => {
                tracing::info!(
                    verbindung = %label,
                    schranke = ?grenzen.zeit_schranke,
                    "Schreibseite aufgegeben: keine Schreibvorgaenge im Intervall"
                );
                let _ = fehler_tx.send(Some(SchreiberFehler::ZeitSchranke(grenzen.zeit_schranke)));
                break;
            }
        };
        match auftrag {
            Auftrag::Daten(daten) => {
                // Jeder Block muss binnen der Zeitschranke durchgehen
                let ergebnis =
                    tokio::time::timeout(grenzen.zeit_schranke, senke.write_all(&daten)).await;
                match ergebnis {
                    Ok(Ok(())) => {
                        gepuffert.fetch_sub(daten.len(), Ordering::SeqCst);
                    }
                    Ok(Err(e)) => {
                        // Gegenstelle weg ist Alltag, alles andere auffaellig
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            tracing::debug!(verbindung = %label, "Gegenstelle hat geschlossen");
                        } else {
                            tracing::error!(verbindung = %label, fehler = %e, "Schreibfehler");
                        }
                        let _ = fehler_tx.send(Some(SchreiberFehler::Io(e.to_string())));
                        break;
                    }
                    Err(_) => {
                        tracing::error!(
                            verbindung = %label,
                            schranke = ?grenzen.zeit_schranke,
                            "Schreibseite aufgegeben: Zeitschranke ueberschritten"
                        );
                        let _ =
                            fehler_tx.send(Some(SchreiberFehler::ZeitSchranke(grenzen.zeit_schranke)));
                        break;
                    }
                }
            }
            Auftrag::Leeren(quittung) => {
                let _ = senke.flush().await;
                let _ = quittung.send(());
            }
        }
    }
    // Bestmoeglich sauber beenden; die Leseseite haelt den Strom ggf. noch
    let _ = senke.shutdown().await;
    tracing::trace!(verbindung = %label, "Schreib-Task beendet");
}

/// Gepufferte Leseseite einer Verbindung
///
/// Liefert Zeilen ohne das abschliessende `\n`; `Ok(None)` bedeutet EOF.
pub struct Leser<R> {
    innen: BufReader<R>,
    zeile: String,
}

impl<R: AsyncRead + Unpin> Leser<R> {
    pub fn neu(quelle: R) -> Self {
        Self {
            innen: BufReader::new(quelle),
            zeile: String::new(),
        }
    }

    /// Liest die naechste Zeile
    ///
    /// Ueberlange Zeilen werden als Protokollfehler gewertet.
    pub async fn zeile_lesen(&mut self) -> std::io::Result<Option<String>> {
        self.zeile.clear();
        let n = self.innen.read_line(&mut self.zeile).await?;
        if n == 0 {
            return Ok(None);
        }
        if n > ZEILENLIMIT_BYTES {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Zeile laenger als {ZEILENLIMIT_BYTES} Bytes"),
            ));
        }
        if self.zeile.ends_with('\n') {
            self.zeile.pop();
        }
        Ok(Some(self.zeile.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schreiber_liefert_daten_aus() {
        let (client, server) = tokio::io::duplex(4096);
        let schreiber = Schreiber::starten(client, SchreiberGrenzen::default(), "test".into());

        schreiber.zeile("hallo").expect("senden muss klappen");
        schreiber.leeren().await.expect("leeren muss klappen");

        let mut leser = Leser::neu(server);
        let zeile = leser.zeile_lesen().await.unwrap();
        assert_eq!(zeile.as_deref(), Some("hallo"));
    }

    #[tokio::test]
    async fn platz_schranke_gibt_schreibseite_auf() {
        // Winzige Gegenseite die nie liest: Daten stauen sich
        let (client, _server) = tokio::io::duplex(16);
        let grenzen = SchreiberGrenzen {
            zeit_schranke: Duration::from_secs(600),
            platz_schranke: 64,
        };
        let schreiber = Schreiber::starten(client, grenzen, "test".into());

        // Bis zur Schranke geht alles durch
        assert!(schreiber.senden(vec![0u8; 60]).is_ok());
        // Darueber hinaus nicht
        let fehler = schreiber.senden(vec![0u8; 32]).unwrap_err();
        assert!(matches!(fehler, SchreiberFehler::PlatzSchranke { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn zeit_schranke_erklaert_verbindung_fuer_tot() {
        // Gegenseite liest nie; write_all bleibt haengen
        let (client, _server) = tokio::io::duplex(8);
        let grenzen = SchreiberGrenzen {
            zeit_schranke: Duration::from_secs(600),
            platz_schranke: 512 * 1024,
        };
        let schreiber = Schreiber::starten(client, grenzen, "test".into());
        let mut fehler_rx = schreiber.fehler_beobachten();

        schreiber.senden(vec![0u8; 1024]).expect("einreihen muss klappen");

        // Die pausierte Uhr springt automatisch zur Timeout-Frist
        fehler_rx
            .wait_for(|f| f.is_some())
            .await
            .expect("Fehlerzustand muss eintreten");
        assert!(matches!(
            fehler_rx.borrow().as_ref(),
            Some(SchreiberFehler::ZeitSchranke(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stille_verbindung_stirbt_an_der_zeitschranke() {
        let (client, _server) = tokio::io::duplex(4096);
        let schreiber = Schreiber::starten(client, SchreiberGrenzen::default(), "test".into());
        let mut fehler_rx = schreiber.fehler_beobachten();

        // Nichts senden; nach 600 s gilt die Verbindung als tot
        fehler_rx
            .wait_for(|f| f.is_some())
            .await
            .expect("Fehlerzustand muss eintreten");
        assert!(matches!(
            fehler_rx.borrow().as_ref(),
            Some(SchreiberFehler::ZeitSchranke(_))
        ));
    }

    #[tokio::test]
    async fn leser_meldet_eof() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let mut leser = Leser::neu(server);
        assert!(leser.zeile_lesen().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nach_fehler_schlagen_sendungen_fehl() {
        let (client, server) = tokio::io::duplex(4096);
        let schreiber = Schreiber::starten(client, SchreiberGrenzen::default(), "test".into());

        // Gegenseite schliessen -> Schreibfehler beim naechsten Versand
        drop(server);
        // Der Fehler stellt sich asynchron ein; solange pumpen bis er da ist
        let mut fehler_rx = schreiber.fehler_beobachten();
        loop {
            if schreiber.senden(b"x".to_vec()).is_err() {
                break;
            }
            if fehler_rx.has_changed().unwrap_or(true) {
                break;
            }
            tokio::task::yield_now().await;
        }
    }
}
