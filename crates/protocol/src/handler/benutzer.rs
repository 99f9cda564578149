//! Benutzerverwaltung: Konten, Selbstregistrierung, Erinnerungsmails
//!
//! `adduser`/`deluser`/`edituser`/`userinfo` verlangen Admin, mit zwei
//! Ausnahmen: ein Benutzer darf die eigene E-Mail und das eigene
//! Passwort aendern und die eigenen Rechte und die eigene E-Mail
//! abfragen. Ueber TCP ist die Verwaltung zusaetzlich durch
//! `remote_userman` geschuetzt.

use base64::Engine;
use chrono::Utc;
use musikbox_auth::{Recht, Rechte};
use musikbox_core::zitieren;
use musikbox_eventlog::ereignis;
use musikbox_reactor::kind_ueberwachen;
use musikbox_trackdb::models::{BenutzerFeld, BenutzerRecord};
use musikbox_trackdb::TrackDb;
use rand::RngCore;

use super::{angemeldet, koerper_senden, senden, sitzung};
use crate::fehler::ProtokollFehler;
use crate::kontext::ServerKontext;
use crate::verbindung::Verbindung;

/// Benutzerverwaltung ueber nicht-lokale Transporte zulassen?
fn fernverwaltung_erlaubt<D>(kontext: &ServerKontext<D>, verbindung: &Verbindung) -> bool {
    verbindung.rechte().hat(Recht::LOKAL) || kontext.konfig.remote_userman
}

/// `adduser <name> <passwort> [rechte]`
pub async fn adduser<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    if !fernverwaltung_erlaubt(kontext, verbindung) {
        return senden(verbindung, 510, "Remote user management is disabled");
    }
    let rechte = match argumente.get(2) {
        Some(liste) => {
            if Rechte::parsen(liste).is_err() {
                return senden(verbindung, 550, "Invalid rights list");
            }
            liste.clone()
        }
        None => kontext.konfig.default_rights.clone(),
    };

    let record = BenutzerRecord {
        username: argumente[0].clone(),
        passwort: argumente[1].clone(),
        email: None,
        rechte,
        bestaetigung: None,
        angelegt_am: Utc::now(),
    };
    match kontext.db.benutzer_anlegen(record).await {
        Ok(()) => {
            kontext
                .log
                .veroeffentlichen(&ereignis::benutzer_angelegt(&argumente[0]));
            senden(verbindung, 250, "User created")
        }
        Err(_) => senden(verbindung, 550, "Cannot create user"),
    }
}

/// `deluser <name>`
pub async fn deluser<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    if !fernverwaltung_erlaubt(kontext, verbindung) {
        return senden(verbindung, 510, "Remote user management is disabled");
    }
    if kontext.db.benutzer_loeschen(&argumente[0]).await.is_err() {
        return senden(verbindung, 550, "Cannot delete user");
    }

    // Lebende Verbindungen des geloeschten Benutzers verlieren alles
    kontext.rechte_durchsetzen(&argumente[0], Rechte::KEINE);
    kontext
        .log
        .veroeffentlichen(&ereignis::benutzer_geloescht(&argumente[0]));
    senden(verbindung, 250, "User deleted")
}

/// `edituser <name> <feld> <wert>`
pub async fn edituser<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    if !fernverwaltung_erlaubt(kontext, verbindung) {
        return senden(verbindung, 510, "Remote user management is disabled");
    }
    let ziel = &argumente[0];
    let feld = match BenutzerFeld::parsen(&argumente[1]) {
        Some(feld) => feld,
        None => return senden(verbindung, 550, "Unknown user field"),
    };
    let selbst = &wer == ziel;
    let admin = verbindung.rechte().hat(Recht::ADMIN);

    // Selbstbedienung nur fuer E-Mail und Passwort
    let erlaubt = admin || (selbst && matches!(feld, BenutzerFeld::Email | BenutzerFeld::Passwort));
    if !erlaubt {
        return senden(verbindung, 510, "Restricted to administrators");
    }

    let mut record = match kontext.db.benutzer(ziel).await? {
        Some(record) => record,
        None => return senden(verbindung, 550, "No such user"),
    };
    match feld {
        BenutzerFeld::Email => record.email = Some(argumente[2].clone()),
        BenutzerFeld::Passwort => record.passwort = argumente[2].clone(),
        BenutzerFeld::Rechte => {
            let neu = match Rechte::parsen(&argumente[2]) {
                Ok(neu) => neu,
                Err(_) => return senden(verbindung, 550, "Invalid rights list"),
            };
            record.rechte = argumente[2].clone();
            kontext.db.benutzer_aktualisieren(record).await?;
            // Lebende Verbindungen sofort nachziehen
            kontext.rechte_durchsetzen(ziel, neu);
            kontext
                .log
                .veroeffentlichen(&ereignis::benutzer_geaendert(ziel, "rights"));
            return senden(verbindung, 250, "OK");
        }
    }
    kontext.db.benutzer_aktualisieren(record).await?;
    kontext
        .log
        .veroeffentlichen(&ereignis::benutzer_geaendert(ziel, &argumente[1]));
    senden(verbindung, 250, "OK")
}

/// `userinfo <name> <feld>`
pub async fn userinfo<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let wer = angemeldet(verbindung)?;
    let ziel = &argumente[0];
    let feld = &argumente[1];
    let selbst = &wer == ziel;
    let admin = verbindung.rechte().hat(Recht::ADMIN);

    // Eigene Rechte und eigene E-Mail darf jeder abfragen
    let erlaubt = if selbst && matches!(feld.as_str(), "rights" | "email") {
        true
    } else {
        admin && fernverwaltung_erlaubt(kontext, verbindung)
    };
    if !erlaubt {
        return senden(verbindung, 510, "Restricted to administrators");
    }

    let record = match kontext.db.benutzer(ziel).await? {
        Some(record) => record,
        None => return senden(verbindung, 550, "No such user"),
    };
    let wert = match feld.as_str() {
        "rights" => Some(record.rechte),
        "email" => record.email,
        "created" => Some(record.angelegt_am.to_rfc3339()),
        _ => return senden(verbindung, 550, "Unknown user field"),
    };
    match wert {
        Some(wert) => senden(verbindung, 252, &zitieren(&wert)),
        None => Err(ProtokollFehler::NichtGesetzt),
    }
}

/// `users`
pub async fn users<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let liste = kontext.db.benutzer_liste().await?;
    koerper_senden(verbindung, "User list follows", liste.iter().map(|u| zitieren(u)))
}

/// `register <name> <passwort> <email>`
pub async fn register<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let mut token_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut token_bytes);
    let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token_bytes);
    let bestaetigung = format!("{}/{}", argumente[0], token);

    let record = BenutzerRecord {
        username: argumente[0].clone(),
        passwort: argumente[1].clone(),
        email: Some(argumente[2].clone()),
        rechte: kontext.konfig.default_rights.clone(),
        bestaetigung: Some(bestaetigung.clone()),
        angelegt_am: Utc::now(),
    };
    match kontext.db.benutzer_anlegen(record).await {
        Ok(()) => {
            kontext
                .log
                .veroeffentlichen(&ereignis::benutzer_angelegt(&argumente[0]));
            senden(verbindung, 252, &zitieren(&bestaetigung))
        }
        Err(_) => senden(verbindung, 550, "Cannot create user"),
    }
}

/// `confirm <bestaetigungs-string>`
pub async fn confirm<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    if verbindung.benutzer.is_some() {
        return senden(verbindung, 530, "already authenticated");
    }
    let bestaetigung = &argumente[0];
    let name = match bestaetigung.split_once('/') {
        Some((name, _)) => name.to_string(),
        None => return senden(verbindung, 550, "Malformed confirmation string"),
    };

    let mut record = match kontext.db.benutzer(&name).await? {
        Some(record) => record,
        None => return senden(verbindung, 550, "No such user"),
    };
    if record.bestaetigung.as_deref() != Some(bestaetigung.as_str()) {
        return senden(verbindung, 550, "Incorrect confirmation string");
    }
    record.bestaetigung = None;
    let rechte = Rechte::parsen(&record.rechte).unwrap_or(Rechte::KEINE);
    kontext.db.benutzer_aktualisieren(record).await?;

    kontext
        .log
        .veroeffentlichen(&ereignis::benutzer_bestaetigt(&name));
    // Die Bestaetigung meldet gleich an
    sitzung::anmelden(kontext, verbindung, &name, rechte);
    senden(verbindung, 232, &zitieren(&name))
}

/// `reminder <name>` — verschickt die Zugangsdaten per Mail
///
/// Nur lokal erlaubt (das Web-Frontend sitzt auf dem Unix-Socket). Die
/// Verbindung wartet inline auf den Mailversand-Kindprozess.
pub async fn reminder<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    if kontext.konfig.mail_kommando.is_empty() {
        return senden(verbindung, 550, "Cannot send a reminder email");
    }
    let record = match kontext.db.benutzer(&argumente[0]).await? {
        Some(record) => record,
        None => return senden(verbindung, 550, "Cannot send a reminder email"),
    };
    let email = match &record.email {
        Some(email) => email.clone(),
        None => return senden(verbindung, 550, "Cannot send a reminder email"),
    };
    if record.passwort.is_empty() || record.bestaetigung.is_some() {
        return senden(verbindung, 550, "Cannot send a reminder email");
    }

    // Hoechstens eine Erinnerung pro Intervall und Benutzer
    let jetzt = Utc::now().timestamp();
    {
        let mut erinnerungen = kontext
            .erinnerungen
            .lock()
            .expect("Erinnerungs-Mutex vergiftet");
        if let Some(zuletzt) = erinnerungen.get(&record.username) {
            if jetzt - zuletzt < kontext.konfig.reminder_interval {
                tracing::info!(benutzer = %record.username, "Erinnerung unterdrueckt (Intervall)");
                return senden(verbindung, 550, "Cannot send a reminder email");
            }
        }
        erinnerungen.insert(record.username.clone(), jetzt);
    }

    let argumente_ersetzt: Vec<String> = kontext
        .konfig
        .mail_kommando
        .iter()
        .map(|arg| match arg.as_str() {
            "{email}" => email.clone(),
            "{user}" => record.username.clone(),
            "{password}" => record.passwort.clone(),
            _ => arg.clone(),
        })
        .collect();

    match tokio::process::Command::new(&argumente_ersetzt[0])
        .args(&argumente_ersetzt[1..])
        .spawn()
    {
        Ok(kind) => {
            let (tx, rx) = tokio::sync::oneshot::channel();
            kind_ueberwachen(kind, move |status| {
                let _ = tx.send(status);
            });
            match rx.await {
                Ok(Ok(status)) if status.success() => senden(verbindung, 250, "OK"),
                _ => senden(verbindung, 550, "Cannot send a reminder email"),
            }
        }
        Err(fehler) => {
            tracing::error!(fehler = %fehler, "Mailversand liess sich nicht starten");
            senden(verbindung, 550, "Cannot send a reminder email")
        }
    }
}
