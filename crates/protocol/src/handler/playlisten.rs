//! Playlist-Befehle
//!
//! Playlists mit Punkt im Namen (`alice.urlaub`) gehoeren dem Praefix-
//! Benutzer; Namen ohne Punkt sind global und nur fuer Admins
//! schreibbar. Schreiben verlangt eine zuvor per `playlist-lock`
//! erworbene Sperre; eine Verbindung haelt hoechstens eine.

use chrono::Utc;
use musikbox_auth::Recht;
use musikbox_core::zitieren;
use musikbox_trackdb::models::{Freigabe, PlaylistRecord};
use musikbox_trackdb::TrackDb;

use super::{angemeldet, koerper_senden, senden};
use crate::fehler::ProtokollFehler;
use crate::kontext::{ServerKontext, Sperre};
use crate::verbindung::{KoerperZiel, Verbindung};

/// Besitzer aus dem Namen (Praefix vor dem ersten Punkt)
fn besitzer_aus_name(name: &str) -> Option<&str> {
    name.split_once('.').map(|(besitzer, _)| besitzer)
}

/// Darf `wer` die Playlist lesen?
fn lesbar(record: &PlaylistRecord, wer: &str, admin: bool) -> bool {
    match record.freigabe {
        Freigabe::Public | Freigabe::Shared => true,
        Freigabe::Private => admin || record.besitzer.as_deref() == Some(wer),
    }
}

/// Darf `wer` die Playlist schreiben?
fn schreibbar(name: &str, wer: &str, admin: bool) -> bool {
    match besitzer_aus_name(name) {
        Some(besitzer) => admin || besitzer == wer,
        None => admin,
    }
}

/// `playlists`
pub async fn playlists<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let liste = kontext.db.playlist_liste(Some(&wer)).await?;
    koerper_senden(
        verbindung,
        "Playlist list follows",
        liste.iter().map(|name| zitieren(name)),
    )
}

/// `playlist-get <name>`
pub async fn playlist_get<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let record = match kontext.db.playlist(&argumente[0]).await? {
        Some(record) => record,
        None => return senden(verbindung, 550, "No such playlist"),
    };
    if !lesbar(&record, &wer, verbindung.rechte().hat(Recht::ADMIN)) {
        return senden(verbindung, 510, "Not authorized to read this playlist");
    }
    koerper_senden(
        verbindung,
        "Playlist contents follow",
        record.titel.iter().map(|titel| zitieren(titel)),
    )
}

/// `playlist-set <name>` — sammelt ab hier den Koerper
///
/// Alle Pruefungen passieren erst beim Abschluss: der Client schickt den
/// Koerper ohnehin, und halb gelesene Koerperzeilen duerfen nie als
/// Befehle enden.
pub async fn playlist_set<D: TrackDb>(
    _kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    verbindung.koerper_beginnen(KoerperZiel::PlaylistSetzen {
        name: argumente[0].clone(),
    });
    Ok(())
}

/// Abschluss von `playlist-set` nach der Punktzeile
pub async fn playlist_set_abschliessen<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    name: &str,
    koerper: Vec<String>,
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let admin = verbindung.rechte().hat(Recht::ADMIN);

    if !schreibbar(name, &wer, admin) {
        return senden(verbindung, 510, "Not authorized to modify this playlist");
    }
    // Schreiben verlangt die Sperre auf genau dieser Playlist
    if verbindung.gesperrte_playlist.as_deref() != Some(name) {
        return senden(verbindung, 550, "Playlist is not locked");
    }
    if koerper.len() > kontext.konfig.playlist_max {
        return senden(verbindung, 550, "Playlist is too long");
    }

    let bestehend = kontext.db.playlist(name).await?;
    let existierte = bestehend.is_some();
    let freigabe = bestehend.map(|r| r.freigabe).unwrap_or(Freigabe::Private);
    kontext
        .db
        .playlist_setzen(PlaylistRecord {
            name: name.to_string(),
            besitzer: besitzer_aus_name(name).map(|s| s.to_string()),
            freigabe,
            titel: koerper,
        })
        .await?;

    if existierte {
        kontext
            .log
            .veroeffentlichen(&format!("playlist_modified {}", zitieren(name)));
    } else {
        kontext.log.veroeffentlichen(&format!(
            "playlist_created {} {}",
            zitieren(name),
            freigabe.als_str()
        ));
    }
    senden(verbindung, 250, "OK")
}

/// `playlist-lock <name>`
pub async fn playlist_lock<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let name = &argumente[0];
    if !schreibbar(name, &wer, verbindung.rechte().hat(Recht::ADMIN)) {
        return senden(verbindung, 510, "Not authorized to modify this playlist");
    }
    if verbindung.gesperrte_playlist.is_some() {
        return senden(verbindung, 550, "Already holding a lock");
    }

    let jetzt = Utc::now().timestamp();
    let mut sperren = kontext.sperren.lock().expect("Sperren-Mutex vergiftet");
    if let Some(sperre) = sperren.get(name) {
        let abgestanden = kontext.konfig.playlist_lock_timeout > 0
            && jetzt - sperre.seit > kontext.konfig.playlist_lock_timeout;
        if !abgestanden {
            return senden(verbindung, 550, "Already locked");
        }
        tracing::info!(playlist = %name, "Abgestandene Sperre uebernommen");
    }
    sperren.insert(
        name.clone(),
        Sperre {
            verbindung: verbindung.tag.0,
            seit: jetzt,
        },
    );
    drop(sperren);
    verbindung.gesperrte_playlist = Some(name.clone());
    senden(verbindung, 250, "Acquired lock")
}

/// `playlist-unlock`
pub async fn playlist_unlock<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    match verbindung.gesperrte_playlist.take() {
        Some(name) => {
            kontext
                .sperren
                .lock()
                .expect("Sperren-Mutex vergiftet")
                .remove(&name);
            senden(verbindung, 250, "Released lock")
        }
        None => senden(verbindung, 550, "Not holding a lock"),
    }
}

/// `playlist-delete <name>`
pub async fn playlist_delete<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let name = &argumente[0];
    if !schreibbar(name, &wer, verbindung.rechte().hat(Recht::ADMIN)) {
        return senden(verbindung, 510, "Not authorized to modify this playlist");
    }
    if kontext.db.playlist_loeschen(name).await.is_err() {
        return senden(verbindung, 550, "No such playlist");
    }
    kontext
        .log
        .veroeffentlichen(&format!("playlist_deleted {}", zitieren(name)));
    senden(verbindung, 250, "OK")
}

/// `playlist-get-share <name>`
pub async fn playlist_get_share<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let record = match kontext.db.playlist(&argumente[0]).await? {
        Some(record) => record,
        None => return senden(verbindung, 550, "No such playlist"),
    };
    if !lesbar(&record, &wer, verbindung.rechte().hat(Recht::ADMIN)) {
        return senden(verbindung, 510, "Not authorized to read this playlist");
    }
    senden(verbindung, 252, record.freigabe.als_str())
}

/// `playlist-set-share <name> <freigabe>`
pub async fn playlist_set_share<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let name = &argumente[0];
    if !schreibbar(name, &wer, verbindung.rechte().hat(Recht::ADMIN)) {
        return senden(verbindung, 510, "Not authorized to modify this playlist");
    }
    let freigabe = match Freigabe::parsen(&argumente[1]) {
        Some(freigabe) => freigabe,
        None => return senden(verbindung, 550, "Invalid share type"),
    };
    if kontext
        .db
        .playlist_freigabe_setzen(name, freigabe)
        .await
        .is_err()
    {
        return senden(verbindung, 550, "No such playlist");
    }
    kontext
        .log
        .veroeffentlichen(&format!("playlist_modified {}", zitieren(name)));
    senden(verbindung, 250, "OK")
}
