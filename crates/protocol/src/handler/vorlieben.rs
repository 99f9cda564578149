//! Vorlieben: pro Titel und global
//!
//! `555` unterscheidet "nie gesetzt" von `550` "Titel unbekannt", damit
//! Clients beide Faelle auseinanderhalten koennen.

use musikbox_core::zitieren;
use musikbox_trackdb::{DbFehler, TrackDb};

use super::{koerper_senden, senden};
use crate::fehler::ProtokollFehler;
use crate::kontext::ServerKontext;
use crate::verbindung::Verbindung;

/// `get <titel> <schluessel>`
pub async fn get<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    match kontext.db.vorliebe(&argumente[0], &argumente[1]).await {
        Ok(Some(wert)) => senden(verbindung, 252, &zitieren(&wert)),
        Ok(None) => Err(ProtokollFehler::NichtGesetzt),
        Err(DbFehler::NichtGefunden(_)) => senden(verbindung, 550, "cannot resolve track"),
        Err(fehler) => Err(fehler.into()),
    }
}

/// `set <titel> <schluessel> <wert>`
pub async fn set<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    kontext
        .db
        .vorliebe_setzen(&argumente[0], &argumente[1], &argumente[2])
        .await?;
    kontext
        .log
        .veroeffentlichen(&format!("prefs_changed {}", zitieren(&argumente[0])));
    senden(verbindung, 250, "OK")
}

/// `unset <titel> <schluessel>`
pub async fn unset<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    kontext
        .db
        .vorliebe_loeschen(&argumente[0], &argumente[1])
        .await?;
    kontext
        .log
        .veroeffentlichen(&format!("prefs_changed {}", zitieren(&argumente[0])));
    senden(verbindung, 250, "OK")
}

/// `prefs <titel>`
pub async fn prefs<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let paare = match kontext.db.vorlieben(&argumente[0]).await {
        Ok(paare) => paare,
        Err(DbFehler::NichtGefunden(_)) => {
            return senden(verbindung, 550, "cannot resolve track")
        }
        Err(fehler) => return Err(fehler.into()),
    };
    koerper_senden(
        verbindung,
        "prefs follow",
        paare
            .iter()
            .map(|(schluessel, wert)| format!("{} {}", zitieren(schluessel), zitieren(wert))),
    )
}

/// `get-global <schluessel>`
pub async fn get_global<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    match kontext.db.global(&argumente[0]).await? {
        Some(wert) => senden(verbindung, 252, &zitieren(&wert)),
        None => Err(ProtokollFehler::NichtGesetzt),
    }
}

/// `set-global <schluessel> <wert>`
pub async fn set_global<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    kontext
        .db
        .global_setzen(&argumente[0], &argumente[1])
        .await?;
    kontext.log.veroeffentlichen(&format!(
        "global_pref {} {}",
        zitieren(&argumente[0]),
        zitieren(&argumente[1])
    ));
    senden(verbindung, 250, "OK")
}

/// `unset-global <schluessel>`
pub async fn unset_global<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    kontext.db.global_loeschen(&argumente[0]).await?;
    kontext
        .log
        .veroeffentlichen(&format!("global_pref {}", zitieren(&argumente[0])));
    senden(verbindung, 250, "OK")
}
