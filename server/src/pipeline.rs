//! Die Abspielschleife
//!
//! Eine Task besitzt die Dekoder und ist alleiniger Konsument ihrer
//! PCM-Stroeme: Zufalls-Nachschub, Kopf-Vorbereitung, Start des
//! naechsten Titels, Blockweise Uebergabe an den Mixer-Treiber. Das
//! RTP-Backend taktet sich dabei selbst gegen die Wanduhr.

use std::collections::HashMap;

use musikbox_core::EintragsId;
use musikbox_mixer::{Dekoder, MixerFehler};
use musikbox_protocol::ServerKontext;
use musikbox_queue::{AbspielStatus, GewichteteWahl};
use musikbox_reactor::kind_ueberwachen;
use musikbox_trackdb::TrackDb;
use tokio::sync::watch;
use tokio::time::Duration;

/// Lesepuffergroesse fuer Dekoder-Ausgabe
const BLOCK_BYTES: usize = 8192;

/// Grundtakt der Schleife wenn nichts ansteht
const LEERLAUF_TAKT: Duration = Duration::from_millis(500);

/// Maximale Wartezeit auf Dekoder-Nachschub pro Durchlauf
const LESE_TAKT: Duration = Duration::from_millis(250);

struct Laufend {
    id: EintragsId,
    dekoder: Dekoder,
    frames: u64,
    /// Ungerades Restbyte zwischen zwei Bloecken
    rest: Option<u8>,
}

/// Faehrt die Abspielschleife bis zum Shutdown
pub async fn abspielschleife<D: TrackDb>(
    kontext: ServerKontext<D>,
    wahl: GewichteteWahl<D>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut vorbereitet: HashMap<EintragsId, Dekoder> = HashMap::new();
    let mut aktuell: Option<Laufend> = None;
    let mut war_pausiert = false;

    tracing::info!("Abspielschleife gestartet");

    loop {
        if *shutdown.borrow() {
            break;
        }

        // -------------------------------------------------------------------
        // Nachschub, Kopf-Vorbereitung, Start
        // -------------------------------------------------------------------
        let pausiert;
        let mut veraendert = false;
        {
            let mut w = kontext.warteschlange.write().await;

            veraendert |= w.auffuellen(&wahl).await > 0;

            if let Some((id, titel)) = w.vorzubereitender_kopf() {
                if vorbereitet.contains_key(&id) {
                    w.als_vorbereitet_markieren(&id);
                } else {
                    match kontext.dekoder.starten(&titel) {
                        Ok(dekoder) => {
                            vorbereitet.insert(id.clone(), dekoder);
                            w.als_vorbereitet_markieren(&id);
                        }
                        Err(fehler) => {
                            tracing::warn!(titel = %titel, fehler = %fehler,
                                "Kopf nicht vorbereitbar");
                            w.verwerfen(&id, AbspielStatus::NoPlayer);
                            veraendert = true;
                        }
                    }
                }
            }

            if aktuell.is_none() {
                if let Some(eintrag) = w.naechsten_starten() {
                    match vorbereitet.remove(&eintrag.id) {
                        Some(dekoder) => {
                            aktuell = Some(Laufend {
                                id: eintrag.id,
                                dekoder,
                                frames: 0,
                                rest: None,
                            });
                            veraendert = true;
                        }
                        None => {
                            // Vorbereitet-Flag ohne Dekoder kommt nur nach
                            // einem Dekoder-Fruehableben vor
                            w.abspiel_beendet(AbspielStatus::Failed, -1);
                            veraendert = true;
                        }
                    }
                }
            }

            // Scratch oder Fremd-Abschluss: die Engine fuehrt unseren
            // Eintrag nicht mehr als spielend
            if let Some(laufend) = &mut aktuell {
                let noch_spielend = w.spielend().map(|e| e.id == laufend.id).unwrap_or(false);
                if !noch_spielend {
                    laufend.dekoder.abbrechen().await;
                    aktuell = None;
                    veraendert = true;
                }
            }

            pausiert = w.ist_pausiert();
        }
        if veraendert {
            kontext.warteschlange_sichern().await;
        }

        // -------------------------------------------------------------------
        // Pause-Kanten
        // -------------------------------------------------------------------
        if pausiert != war_pausiert {
            if pausiert {
                kontext.mixer.lock().await.deaktivieren().await;
            }
            war_pausiert = pausiert;
        }

        // -------------------------------------------------------------------
        // Einen Block abspielen
        // -------------------------------------------------------------------
        let mut gespielt = false;
        let mut fertig = false;
        let mut fatal = false;
        if let Some(laufend) = &mut aktuell {
            if !pausiert {
                let mut mixer = kontext.mixer.lock().await;
                if mixer.aktiv_sicherstellen().await {
                    let mut puffer = [0u8; BLOCK_BYTES];
                    // Ein stummer Dekoder darf Pause/Scratch/Shutdown nicht
                    // aufhalten; nach dem Lesetakt geht es zurueck in die
                    // Schleife
                    match tokio::time::timeout(LESE_TAKT, laufend.dekoder.lesen(&mut puffer)).await
                    {
                        Err(_) => {}
                        Ok(Ok(0)) => fertig = true,
                        Ok(Ok(n)) => {
                            let mut daten = Vec::with_capacity(n + 1);
                            if let Some(byte) = laufend.rest.take() {
                                daten.push(byte);
                            }
                            daten.extend_from_slice(&puffer[..n]);
                            let ganze = daten.len() - daten.len() % 2;
                            if ganze < daten.len() {
                                laufend.rest = Some(daten[daten.len() - 1]);
                            }
                            let samples: Vec<i16> = daten[..ganze]
                                .chunks_exact(2)
                                .map(|paar| i16::from_ne_bytes([paar[0], paar[1]]))
                                .collect();
                            match mixer.block_spielen(&samples).await {
                                Ok(frames) => {
                                    laufend.frames += frames as u64;
                                    let frames = laufend.frames;
                                    drop(mixer);
                                    kontext
                                        .warteschlange
                                        .write()
                                        .await
                                        .frames_aktualisieren(frames);
                                    gespielt = true;
                                }
                                Err(MixerFehler::Rtp(fehler)) => {
                                    // Zehn Sendefehler in Folge sind fatal
                                    tracing::error!(fehler = %fehler, "RTP gibt auf");
                                    fatal = true;
                                }
                                Err(_) => {
                                    // Treiber hat den Fehlerzustand gesetzt;
                                    // naechster Versuch nach der Wartezeit
                                }
                            }
                        }
                        Ok(Err(fehler)) => {
                            tracing::error!(id = %laufend.id, fehler = %fehler,
                                "Dekoder-Lesefehler");
                            fertig = true;
                        }
                    }
                }
            }
        }
        if fatal {
            let _ = kontext.shutdown.send(true);
            return;
        }
        if fertig {
            abschliessen(&kontext, aktuell.take().expect("es lief etwas")).await;
            continue;
        }

        if gespielt {
            // Das Backend taktet selbst (RTP wartet in spielen); sofort
            // weiter mit dem naechsten Block
            continue;
        }

        // -------------------------------------------------------------------
        // Warten auf Anstoss, Takt oder Shutdown
        // -------------------------------------------------------------------
        let mut takt = Some(LEERLAUF_TAKT);
        if aktuell.is_some() && !pausiert {
            kontext.mixer.lock().await.vor_poll(&mut takt);
        }
        tokio::select! {
            _ = kontext.anstoss.notified() => {}
            _ = tokio::time::sleep(takt.unwrap_or(LEERLAUF_TAKT)) => {}
            _ = shutdown.changed() => break,
        }
    }

    // Laufenden Dekoder sauber beenden
    if let Some(mut laufend) = aktuell.take() {
        laufend.dekoder.abbrechen().await;
    }
    tracing::info!("Abspielschleife beendet");
}

/// Schliesst den gerade gespielten Eintrag nach Dekoder-EOF ab
async fn abschliessen<D: TrackDb>(kontext: &ServerKontext<D>, mut laufend: Laufend) {
    let status = match laufend.dekoder.kind_entnehmen() {
        Some(kind) => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            kind_ueberwachen(kind, move |status| {
                let _ = tx.send(status);
            });
            rx.await.ok().and_then(|s| s.ok())
        }
        None => None,
    };

    let (abspiel_status, exit_status) = match status {
        Some(s) if s.success() => (AbspielStatus::Ok, 0),
        Some(s) => (AbspielStatus::Failed, s.code().unwrap_or(-1) as i64),
        None => (AbspielStatus::Ok, 0),
    };

    {
        let mut w = kontext.warteschlange.write().await;
        // Nur abschliessen wenn die Engine uns noch als spielend fuehrt
        if w.spielend().map(|e| e.id == laufend.id).unwrap_or(false) {
            w.abspiel_beendet(abspiel_status, exit_status);
        }
    }
    kontext.warteschlange_sichern().await;
    kontext.abspiel_anstossen();
}
