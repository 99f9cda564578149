//! Geplante Ereignisse
//!
//! Die Ereignisse selbst liegen in der TrackDB; das Protokoll bietet
//! nur Liste/Abfrage/Anlage/Loeschung. Ausgeloest werden sie von der
//! Planer-Task des Servers.

use chrono::{TimeZone, Utc};
use musikbox_auth::Recht;
use musikbox_core::zitieren;
use musikbox_trackdb::models::{PlanAktion, PlanEintrag, PlanPrioritaet};
use musikbox_trackdb::TrackDb;
use uuid::Uuid;

use super::{angemeldet, koerper_senden, senden};
use crate::fehler::ProtokollFehler;
use crate::kontext::ServerKontext;
use crate::verbindung::Verbindung;

/// `schedule-list`
pub async fn schedule_list<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let ids = kontext.db.plan_liste().await?;
    koerper_senden(verbindung, "Event IDs follow", ids)
}

/// `schedule-get <id>`
pub async fn schedule_get<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let eintrag = match kontext.db.plan(&argumente[0]).await? {
        Some(eintrag) => eintrag,
        None => return senden(verbindung, 550, "No such event"),
    };
    let mut zeilen = vec![
        format!("who {}", zitieren(&eintrag.absender)),
        format!("when {}", eintrag.ausloesung.timestamp()),
        format!("priority {}", eintrag.prioritaet.als_str()),
    ];
    match &eintrag.aktion {
        PlanAktion::Play { titel } => {
            zeilen.push("action play".to_string());
            zeilen.push(format!("track {}", zitieren(titel)));
        }
        PlanAktion::SetGlobal { schluessel, wert } => {
            zeilen.push("action set-global".to_string());
            zeilen.push(format!("key {}", zitieren(schluessel)));
            if let Some(wert) = wert {
                zeilen.push(format!("value {}", zitieren(wert)));
            }
        }
    }
    koerper_senden(verbindung, "Event details follow", zeilen)
}

/// `schedule-add <zeitpunkt> <prioritaet> <aktion> ...`
///
/// Aktionen: `play <titel>` (verlangt play-Recht) und
/// `set-global <schluessel> [wert]` (verlangt global-prefs-Recht).
pub async fn schedule_add<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;

    let zeitpunkt: i64 = argumente[0]
        .parse()
        .map_err(|_| ProtokollFehler::UngueltigeEingabe("invalid time".into()))?;
    let ausloesung = Utc
        .timestamp_opt(zeitpunkt, 0)
        .single()
        .ok_or_else(|| ProtokollFehler::UngueltigeEingabe("invalid time".into()))?;
    if ausloesung <= Utc::now() {
        return senden(verbindung, 550, "Event is in the past");
    }

    let prioritaet = match PlanPrioritaet::parsen(&argumente[1]) {
        Some(prioritaet) => prioritaet,
        None => return senden(verbindung, 550, "Invalid priority"),
    };

    let aktion = match argumente[2].as_str() {
        "play" => {
            if !verbindung.rechte().hat(Recht::PLAY) {
                return senden(verbindung, 510, "Prohibited");
            }
            let titel = match argumente.get(3) {
                Some(titel) => titel,
                None => return Err(ProtokollFehler::ZuWenigArgumente),
            };
            if !kontext.db.existiert(titel).await? {
                return senden(verbindung, 550, "track is not in database");
            }
            PlanAktion::Play {
                titel: kontext.db.aufloesen(titel).await?,
            }
        }
        "set-global" => {
            if !verbindung.rechte().hat(Recht::GLOBAL_PREFS) {
                return senden(verbindung, 510, "Prohibited");
            }
            let schluessel = match argumente.get(3) {
                Some(schluessel) => schluessel.clone(),
                None => return Err(ProtokollFehler::ZuWenigArgumente),
            };
            PlanAktion::SetGlobal {
                schluessel,
                wert: argumente.get(4).cloned(),
            }
        }
        _ => return senden(verbindung, 550, "Invalid action"),
    };

    let id = Uuid::new_v4().simple().to_string();
    kontext
        .db
        .plan_anlegen(PlanEintrag {
            id: id.clone(),
            absender: wer,
            ausloesung,
            prioritaet,
            aktion,
        })
        .await?;
    kontext
        .log
        .veroeffentlichen(&format!("schedule_added {id}"));
    senden(verbindung, 252, &id)
}

/// `schedule-del <id>`
pub async fn schedule_del<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let eintrag = match kontext.db.plan(&argumente[0]).await? {
        Some(eintrag) => eintrag,
        None => return senden(verbindung, 550, "No such event"),
    };
    // Fremde Ereignisse loescht nur ein Admin
    if eintrag.absender != wer && !verbindung.rechte().hat(Recht::ADMIN) {
        return senden(verbindung, 510, "Not authorized to delete that event");
    }
    kontext.db.plan_loeschen(&argumente[0]).await?;
    kontext
        .log
        .veroeffentlichen(&format!("schedule_removed {}", argumente[0]));
    senden(verbindung, 250, "OK")
}
