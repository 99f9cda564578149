//! Katalogbefehle: Verzeichnisse, Suche, Statistik, Rescan

use musikbox_core::zitieren;
use musikbox_reactor::kind_ueberwachen;
use musikbox_trackdb::{DbFehler, TrackDb};

use super::{koerper_senden, senden};
use crate::fehler::ProtokollFehler;
use crate::kontext::ServerKontext;
use crate::verbindung::Verbindung;

fn verzeichnis_und_muster(argumente: &[String]) -> (&str, Option<&str>) {
    (
        argumente.first().map(|s| s.as_str()).unwrap_or(""),
        argumente.get(1).map(|s| s.as_str()),
    )
}

/// `dirs [verzeichnis [muster]]`
pub async fn dirs<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let (verzeichnis, muster) = verzeichnis_und_muster(argumente);
    let eintraege = kontext.db.verzeichnisse(verzeichnis, muster).await?;
    koerper_senden(
        verbindung,
        "Listing follows",
        eintraege.iter().map(|e| zitieren(e)),
    )
}

/// `files [verzeichnis [muster]]`
pub async fn files<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let (verzeichnis, muster) = verzeichnis_und_muster(argumente);
    let eintraege = kontext.db.dateien(verzeichnis, muster).await?;
    koerper_senden(
        verbindung,
        "Listing follows",
        eintraege.iter().map(|e| zitieren(e)),
    )
}

/// `allfiles [verzeichnis [muster]]`
pub async fn allfiles<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let (verzeichnis, muster) = verzeichnis_und_muster(argumente);
    let eintraege = kontext.db.alle_dateien(verzeichnis, muster).await?;
    koerper_senden(
        verbindung,
        "Listing follows",
        eintraege.iter().map(|e| zitieren(e)),
    )
}

/// `exists <titel>`
pub async fn exists<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let vorhanden = kontext.db.existiert(&argumente[0]).await?;
    senden(verbindung, 252, if vorhanden { "yes" } else { "no" })
}

/// `length <titel>`
pub async fn laenge<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    match kontext.db.laenge(&argumente[0]).await {
        Ok(Some(laenge)) => senden(verbindung, 252, &laenge.to_string()),
        Ok(None) => senden(verbindung, 550, "not found"),
        Err(DbFehler::NichtGefunden(_)) => senden(verbindung, 550, "track is not in database"),
        Err(fehler) => Err(fehler.into()),
    }
}

/// `part <titel> <kontext> <teil>`
pub async fn part<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wert = kontext
        .db
        .teil(&argumente[0], &argumente[1], &argumente[2])
        .await
        .map_err(|_| ProtokollFehler::UngueltigeEingabe("cannot resolve track".into()))?;
    senden(verbindung, 252, &zitieren(&wert))
}

/// `resolve <titel>`
pub async fn resolve<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    match kontext.db.aufloesen(&argumente[0]).await {
        Ok(pfad) => senden(verbindung, 252, &zitieren(&pfad)),
        Err(_) => senden(verbindung, 550, "cannot resolve track"),
    }
}

/// `search <terme>`
pub async fn search<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    // Das eine Argument traegt die Terme, selbst im Split-Format
    let terme = musikbox_core::spalten(&argumente[0], musikbox_core::SpaltOptionen::protokoll())
        .map_err(|fehler| ProtokollFehler::UngueltigeEingabe(fehler.to_string()))?;
    let treffer = kontext.db.suchen(&terme).await?;
    koerper_senden(
        verbindung,
        &format!("{} matches", treffer.len()),
        treffer.iter().map(|t| zitieren(t)),
    )
}

/// `tags`
pub async fn tags<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let tags = kontext.db.tags().await?;
    koerper_senden(verbindung, "Tag list follows", tags.iter().map(|t| zitieren(t)))
}

/// `new [maximal]`
pub async fn new<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let maximal = match argumente.first() {
        Some(wert) => wert
            .parse::<usize>()
            .map_err(|_| ProtokollFehler::UngueltigeEingabe("invalid limit".into()))?
            .min(kontext.konfig.new_max),
        None => kontext.konfig.new_max,
    };
    let titel = kontext.db.neue_titel(maximal).await?;
    koerper_senden(verbindung, "New tracks follow", titel.iter().map(|t| zitieren(t)))
}

/// `stats`
pub async fn stats<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let zeilen = kontext.db.statistik().await?;
    koerper_senden(verbindung, "stats", zeilen)
}

/// `rescan [wait]`
///
/// Laeuft der konfigurierte Rescanner als Kindprozess, wartet die
/// Verbindung inline auf sein Ende; solange dispatcht sie nichts
/// weiter. Mit `wait` kommt die Antwort erst nach Abschluss.
pub async fn rescan<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let mut warten = false;
    for flag in argumente {
        match flag.as_str() {
            "wait" => warten = true,
            _ => return senden(verbindung, 550, "unknown flag"),
        }
    }

    if !warten {
        senden(verbindung, 250, "initiated rescan")?;
    }

    // Rescanner-Kindprozess, sofern konfiguriert
    if !kontext.konfig.rescan_kommando.is_empty() {
        let kommando = &kontext.konfig.rescan_kommando;
        match tokio::process::Command::new(&kommando[0])
            .args(&kommando[1..])
            .spawn()
        {
            Ok(kind) => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                kind_ueberwachen(kind, move |status| {
                    let _ = tx.send(status);
                });
                match rx.await {
                    Ok(Ok(status)) if status.success() => {}
                    Ok(Ok(status)) => {
                        tracing::warn!(status = %status, "Rescanner endete mit Fehler");
                        if warten {
                            return senden(verbindung, 550, "rescan failed");
                        }
                        return Ok(());
                    }
                    _ => {
                        if warten {
                            return senden(verbindung, 550, "rescan failed");
                        }
                        return Ok(());
                    }
                }
            }
            Err(fehler) => {
                tracing::error!(fehler = %fehler, "Rescanner liess sich nicht starten");
                if warten {
                    return senden(verbindung, 550, "rescan failed");
                }
                return Ok(());
            }
        }
    }

    // Katalog mit dem Dateisystem abgleichen
    if let Some(wurzel) = &kontext.konfig.musik_wurzel {
        match kontext.db.abgleichen(wurzel).await {
            Ok(neue) => tracing::info!(neue = neue, "Katalog abgeglichen"),
            Err(fehler) => {
                tracing::error!(fehler = %fehler, "Katalogabgleich fehlgeschlagen");
                if warten {
                    return senden(verbindung, 550, "rescan failed");
                }
                return Ok(());
            }
        }
    }

    if warten {
        senden(verbindung, 250, "rescan completed")?;
    }
    Ok(())
}
