//! Abspielbefehle: Warteschlange, Pause, Scratch, Schalter

use musikbox_auth::AktionsZiel;
use musikbox_core::EintragsId;
use musikbox_queue::{EinreihPosition, Herkunft, PausenErgebnis, QueueEintrag};
use musikbox_trackdb::TrackDb;

use super::{angemeldet, koerper_senden, senden};
use crate::fehler::ProtokollFehler;
use crate::kontext::ServerKontext;
use crate::verbindung::Verbindung;

/// Klassifiziert einen Eintrag aus Sicht des Aufrufers
fn aktionsziel(eintrag: &QueueEintrag, wer: &str) -> AktionsZiel {
    if eintrag.herkunft == Herkunft::Random {
        AktionsZiel::Zufall
    } else if eintrag.absender.as_deref() == Some(wer) {
        AktionsZiel::Eigen
    } else {
        AktionsZiel::Fremd
    }
}

/// Loest einen Titelnamen auf; unbekannt ergibt die 550-Texte des
/// Protokolls
async fn titel_aufloesen<D: TrackDb>(
    kontext: &ServerKontext<D>,
    titel: &str,
) -> Result<String, ProtokollFehler> {
    if !kontext.db.existiert(titel).await? {
        return Err(ProtokollFehler::UngueltigeEingabe(
            "track is not in database".into(),
        ));
    }
    kontext
        .db
        .aufloesen(titel)
        .await
        .map_err(|_| ProtokollFehler::UngueltigeEingabe("cannot resolve track".into()))
}

/// `play <titel>`
pub async fn play<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let titel = titel_aufloesen(kontext, &argumente[0]).await?;
    let laenge = kontext.db.laenge(&titel).await.ok().flatten();

    let id = {
        let mut w = kontext.warteschlange.write().await;
        if let Some(laenge) = laenge {
            w.laenge_hinterlegen(&titel, laenge);
        }
        w.einreihen(&titel, Some(&wer), EinreihPosition::VorZufall, Herkunft::Picked)
            .map_err(|fehler| ProtokollFehler::UngueltigeEingabe(fehler.to_string()))?
    };
    kontext.warteschlange_sichern().await;
    kontext.abspiel_anstossen();
    senden(verbindung, 252, id.as_str())
}

/// `playafter <id> <titel>...`
pub async fn playafter<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let mut nach = EintragsId::aus_string(argumente[0].clone());

    for titel in &argumente[1..] {
        let titel = titel_aufloesen(kontext, titel).await?;
        let mut w = kontext.warteschlange.write().await;
        let id = w
            .einreihen(
                &titel,
                Some(&wer),
                EinreihPosition::Nach(nach.clone()),
                Herkunft::Picked,
            )
            .map_err(|_| ProtokollFehler::UngueltigeEingabe("No such ID".into()))?;
        nach = id;
    }
    kontext.warteschlange_sichern().await;
    kontext.abspiel_anstossen();
    senden(verbindung, 252, "OK")
}

/// `pause`
pub async fn pause<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let ergebnis = kontext.warteschlange.write().await.pausieren();
    kontext.abspiel_anstossen();
    match ergebnis {
        PausenErgebnis::Pausiert => senden(verbindung, 250, "paused"),
        PausenErgebnis::SchonPausiert => senden(verbindung, 250, "already paused"),
        PausenErgebnis::NichtsSpielt => senden(verbindung, 250, "nothing is playing"),
        PausenErgebnis::NichtPausiert => senden(verbindung, 550, "cannot pause this track"),
    }
}

/// `resume`
pub async fn resume<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let ergebnis = kontext.warteschlange.write().await.fortsetzen();
    kontext.abspiel_anstossen();
    match ergebnis {
        PausenErgebnis::Pausiert => senden(verbindung, 250, "resumed"),
        PausenErgebnis::NichtPausiert | PausenErgebnis::NichtsSpielt => {
            senden(verbindung, 250, "not paused")
        }
        PausenErgebnis::SchonPausiert => unreachable!("fortsetzen liefert das nie"),
    }
}

/// `scratch [id]`
pub async fn scratch<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let mut w = kontext.warteschlange.write().await;

    let (ziel, spielend_id) = match w.spielend() {
        Some(spielend) => (aktionsziel(spielend, &wer), spielend.id.clone()),
        None => {
            drop(w);
            return senden(verbindung, 250, "nothing is playing");
        }
    };
    if let Some(id) = argumente.first() {
        if spielend_id.as_str() != id {
            drop(w);
            return senden(verbindung, 550, "that track is not playing");
        }
    }
    if !verbindung.rechte().darf_kratzen(ziel) {
        tracing::info!(benutzer = %wer, "Scratch ohne noetige Rechte");
        drop(w);
        return senden(verbindung, 510, "Not authorized to scratch that track");
    }

    w.kratzen(&wer);
    drop(w);
    kontext.warteschlange_sichern().await;
    kontext.abspiel_anstossen();
    senden(verbindung, 250, "scratched")
}

/// `remove <id>`
pub async fn remove<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let id = EintragsId::aus_string(argumente[0].clone());
    let mut w = kontext.warteschlange.write().await;

    let ziel = match w.finden(&id) {
        Some(eintrag) => aktionsziel(eintrag, &wer),
        None => {
            drop(w);
            return senden(verbindung, 550, "no such track on the queue");
        }
    };
    if !verbindung.rechte().darf_entfernen(ziel) {
        tracing::info!(benutzer = %wer, id = %id, "Remove ohne noetige Rechte");
        drop(w);
        return senden(verbindung, 510, "Not authorized to remove that track");
    }

    w.entfernen(&id, &wer)
        .map_err(|fehler| ProtokollFehler::UngueltigeEingabe(fehler.to_string()))?;
    drop(w);
    kontext.warteschlange_sichern().await;
    kontext.abspiel_anstossen();
    senden(verbindung, 250, "removed")
}

/// `move <id> <delta>`
pub async fn moven<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let id = EintragsId::aus_string(argumente[0].clone());
    let delta: i64 = argumente[1]
        .parse()
        .map_err(|_| ProtokollFehler::UngueltigeEingabe("invalid delta".into()))?;

    let mut w = kontext.warteschlange.write().await;
    let ziel = match w.finden(&id) {
        Some(eintrag) => aktionsziel(eintrag, &wer),
        None => {
            drop(w);
            return senden(verbindung, 550, "no such track on the queue");
        }
    };
    if !verbindung.rechte().darf_bewegen(ziel) {
        tracing::info!(benutzer = %wer, id = %id, "Move ohne noetige Rechte");
        drop(w);
        return senden(verbindung, 510, "Not authorized to move that track");
    }

    let verschoben = w
        .bewegen(&id, delta)
        .map_err(|fehler| ProtokollFehler::UngueltigeEingabe(fehler.to_string()))?;
    drop(w);
    kontext
        .log
        .veroeffentlichen(&format!("moved {}", musikbox_core::zitieren(&wer)));
    kontext.warteschlange_sichern().await;
    kontext.abspiel_anstossen();
    senden(verbindung, 252, &verschoben.to_string())
}

/// `moveafter <ziel-id> <id>...`
pub async fn moveafter<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let ziel = if argumente[0].is_empty() {
        None
    } else {
        Some(EintragsId::aus_string(argumente[0].clone()))
    };
    let ids: Vec<EintragsId> = argumente[1..]
        .iter()
        .map(|a| EintragsId::aus_string(a.clone()))
        .collect();

    let mut w = kontext.warteschlange.write().await;
    for id in &ids {
        let ziel = match w.finden(id) {
            Some(eintrag) => aktionsziel(eintrag, &wer),
            None => {
                drop(w);
                return senden(verbindung, 550, "no such track on the queue");
            }
        };
        if !verbindung.rechte().darf_bewegen(ziel) {
            drop(w);
            return senden(verbindung, 510, "Not authorized to move those tracks");
        }
    }
    w.nach_verschieben(ziel.as_ref(), &ids)
        .map_err(|fehler| ProtokollFehler::UngueltigeEingabe(fehler.to_string()))?;
    drop(w);
    kontext
        .log
        .veroeffentlichen(&format!("moved {}", musikbox_core::zitieren(&wer)));
    kontext.warteschlange_sichern().await;
    kontext.abspiel_anstossen();
    senden(verbindung, 250, "Moved tracks")
}

/// `adopt <id>`
pub async fn adopt<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let id = EintragsId::aus_string(argumente[0].clone());
    let mut w = kontext.warteschlange.write().await;
    w.adoptieren(&id, &wer)
        .map_err(|_| ProtokollFehler::UngueltigeEingabe("no such random track".into()))?;
    drop(w);
    kontext.warteschlange_sichern().await;
    senden(verbindung, 250, "adopted")
}

/// `playing`
pub async fn playing<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let w = kontext.warteschlange.read().await;
    match w.spielend() {
        Some(eintrag) => {
            let zeile = eintrag.marshallieren();
            drop(w);
            senden(verbindung, 252, &zeile)
        }
        None => {
            drop(w);
            senden(verbindung, 259, "nothing playing")
        }
    }
}

/// `queue`
pub async fn queue<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let zeilen: Vec<String> = {
        let w = kontext.warteschlange.read().await;
        w.anstehende().map(|e| e.marshallieren()).collect()
    };
    koerper_senden(verbindung, "Tracks follow", zeilen)
}

/// `recent`
pub async fn recent<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let zeilen: Vec<String> = {
        let w = kontext.warteschlange.read().await;
        w.kuerzliche().map(|e| e.marshallieren()).collect()
    };
    koerper_senden(verbindung, "Tracks follow", zeilen)
}

/// `enable`
pub async fn enable<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    kontext.warteschlange.write().await.abspielen_schalten(true);
    kontext.db.global_setzen("playing", "yes").await?;
    kontext.abspiel_anstossen();
    senden(verbindung, 250, "OK")
}

/// `disable [now]`
pub async fn disable<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    if let Some(arg) = argumente.first() {
        if arg != "now" {
            return Err(ProtokollFehler::UngueltigeEingabe("invalid argument".into()));
        }
    }
    kontext.warteschlange.write().await.abspielen_schalten(false);
    kontext.db.global_setzen("playing", "no").await?;
    senden(verbindung, 250, "OK")
}

/// `enabled`
pub async fn enabled<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let aktiv = kontext.warteschlange.read().await.abspielen_aktiv();
    senden(verbindung, 252, if aktiv { "yes" } else { "no" })
}

/// `random-enable` / `random-disable`
pub async fn random_schalten<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    aktiv: bool,
) -> Result<(), ProtokollFehler> {
    kontext.warteschlange.write().await.zufall_schalten(aktiv);
    kontext
        .db
        .global_setzen("random-play", if aktiv { "yes" } else { "no" })
        .await?;
    kontext.abspiel_anstossen();
    senden(verbindung, 250, "OK")
}

/// `random-enabled`
pub async fn random_enabled<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let aktiv = kontext.warteschlange.read().await.zufall_aktiv();
    senden(verbindung, 252, if aktiv { "yes" } else { "no" })
}
