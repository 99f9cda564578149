//! Planer fuer persistierte Ereignisse
//!
//! Laedt faellige Ereignisse aus der TrackDB und fuehrt sie aus:
//! `play` reiht mit Herkunft `scheduled` ein, `set-global` setzt die
//! globale Vorliebe. Verpasste `junk`-Ereignisse verfallen mit einer
//! Logzeile. Der naechste Weckruf laeuft ueber den Timeout-Planer des
//! Reaktors, mit einem groben Sicherheitstakt als Rueckfall.

use std::sync::Arc;

use chrono::Utc;
use musikbox_protocol::ServerKontext;
use musikbox_queue::{EinreihPosition, Herkunft};
use musikbox_reactor::Zeitplaner;
use musikbox_trackdb::models::{PlanAktion, PlanPrioritaet};
use musikbox_trackdb::TrackDb;
use tokio::sync::{watch, Notify};
use tokio::time::{Duration, Instant};

/// Rueckfalltakt falls kein Weckruf ansteht
const SICHERHEITS_TAKT: Duration = Duration::from_secs(60);

/// Kulanz fuer verpasste `normal`-Ereignisse
const NACHHOL_FENSTER: i64 = 600;

/// Faehrt den Planer bis zum Shutdown
pub async fn planer_schleife<D: TrackDb>(
    kontext: ServerKontext<D>,
    zeitplaner: Zeitplaner,
    mut shutdown: watch::Receiver<bool>,
) {
    let weckruf = Arc::new(Notify::new());

    loop {
        faellige_ausfuehren(&kontext).await;

        // Weckruf auf das naechste anstehende Ereignis legen
        if let Some(naechste) = naechste_ausloesung(&kontext).await {
            let jetzt = Utc::now().timestamp();
            let abstand = (naechste - jetzt).max(0) as u64;
            let wecker = Arc::clone(&weckruf);
            zeitplaner.registrieren(
                Some(Instant::now() + Duration::from_secs(abstand)),
                move || wecker.notify_one(),
            );
        }

        tokio::select! {
            _ = weckruf.notified() => {}
            _ = tokio::time::sleep(SICHERHEITS_TAKT) => {}
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!("Planer beendet");
}

async fn naechste_ausloesung<D: TrackDb>(kontext: &ServerKontext<D>) -> Option<i64> {
    let ids = kontext.db.plan_liste().await.ok()?;
    let mut naechste: Option<i64> = None;
    for id in ids {
        if let Ok(Some(eintrag)) = kontext.db.plan(&id).await {
            let zeit = eintrag.ausloesung.timestamp();
            naechste = Some(naechste.map_or(zeit, |n: i64| n.min(zeit)));
        }
    }
    naechste
}

async fn faellige_ausfuehren<D: TrackDb>(kontext: &ServerKontext<D>) {
    let jetzt = Utc::now().timestamp();
    let ids = match kontext.db.plan_liste().await {
        Ok(ids) => ids,
        Err(fehler) => {
            tracing::warn!(fehler = %fehler, "Planer: Liste nicht lesbar");
            return;
        }
    };

    for id in ids {
        let eintrag = match kontext.db.plan(&id).await {
            Ok(Some(eintrag)) => eintrag,
            _ => continue,
        };
        let faellig = eintrag.ausloesung.timestamp();
        if faellig > jetzt {
            continue;
        }

        // Stark verspaetete junk-Ereignisse verfallen
        let verspaetet = jetzt - faellig;
        if eintrag.prioritaet == PlanPrioritaet::Junk && verspaetet > NACHHOL_FENSTER {
            tracing::info!(id = %id, verspaetet = verspaetet, "Verpasstes junk-Ereignis verworfen");
            let _ = kontext.db.plan_loeschen(&id).await;
            continue;
        }

        match &eintrag.aktion {
            PlanAktion::Play { titel } => {
                let mut w = kontext.warteschlange.write().await;
                match w.einreihen(
                    titel,
                    Some(&eintrag.absender),
                    EinreihPosition::VorZufall,
                    Herkunft::Scheduled,
                ) {
                    Ok(neue_id) => {
                        tracing::info!(id = %id, titel = %titel, eintrag = %neue_id,
                            "Geplantes Abspielen eingereiht");
                    }
                    Err(fehler) => {
                        tracing::warn!(id = %id, fehler = %fehler,
                            "Geplantes Abspielen fehlgeschlagen");
                    }
                }
                drop(w);
                kontext.warteschlange_sichern().await;
                kontext.abspiel_anstossen();
            }
            PlanAktion::SetGlobal { schluessel, wert } => {
                let ergebnis = match wert {
                    Some(wert) => kontext.db.global_setzen(schluessel, wert).await,
                    None => kontext.db.global_loeschen(schluessel).await,
                };
                match ergebnis {
                    Ok(()) => tracing::info!(id = %id, schluessel = %schluessel,
                        "Geplante globale Vorliebe gesetzt"),
                    Err(fehler) => tracing::warn!(id = %id, fehler = %fehler,
                        "Geplante globale Vorliebe fehlgeschlagen"),
                }
            }
        }
        let _ = kontext.db.plan_loeschen(&id).await;
    }
}
