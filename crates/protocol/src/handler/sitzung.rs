//! Sitzungsbefehle: Anmeldung, Cookies, Ereignisprotokoll, Verwaltung

use std::sync::{Arc, Mutex};

use musikbox_auth::{antwort_hash, Recht, Rechte};
use musikbox_core::zitieren;
use musikbox_trackdb::TrackDb;

use super::{angemeldet, senden};
use crate::fehler::ProtokollFehler;
use crate::kontext::{ServerKontext, SitzungsEintrag};
use crate::verbindung::Verbindung;

/// Traegt eine erfolgreich angemeldete Verbindung ueberall ein
pub(crate) fn anmelden<D>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    benutzer: &str,
    mut rechte: Rechte,
) {
    if verbindung.lokal {
        rechte.gewaehren(Recht::LOKAL);
    }
    verbindung.benutzer = Some(benutzer.to_string());
    *verbindung.rechte.lock().expect("Rechte-Mutex vergiftet") = rechte;
    kontext.sitzungen.insert(
        verbindung.tag.0,
        Arc::new(SitzungsEintrag {
            benutzer: benutzer.to_string(),
            rechte: Arc::clone(&verbindung.rechte),
            lokal: verbindung.lokal,
            abo: Mutex::new(None),
        }),
    );
    if verbindung.lokal {
        tracing::debug!(verbindung = %verbindung.tag, benutzer = benutzer, "Lokal angemeldet");
    } else {
        tracing::info!(verbindung = %verbindung.tag, benutzer = benutzer, "Angemeldet");
    }
}

/// `user <name> <hex(H(nonce||passwort))>`
pub async fn user<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    if verbindung.benutzer.is_some() {
        return senden(verbindung, 530, "already authenticated");
    }
    let name = &argumente[0];
    let antwort = argumente[1].to_ascii_lowercase();

    let record = match kontext.db.benutzer(name).await? {
        Some(record) => record,
        None => {
            tracing::info!(verbindung = %verbindung.tag, benutzer = %name, "Unbekannter Benutzer");
            return senden(verbindung, 530, "authentication failed");
        }
    };
    if record.bestaetigung.is_some() {
        tracing::info!(verbindung = %verbindung.tag, benutzer = %name, "Unbestaetigter Benutzer");
        return senden(verbindung, 530, "authentication failed");
    }
    let rechte = match Rechte::parsen(&record.rechte) {
        Ok(rechte) => rechte,
        Err(fehler) => {
            tracing::error!(benutzer = %name, fehler = %fehler, "Rechteliste unlesbar");
            return senden(verbindung, 530, "authentication failed");
        }
    };

    let erwartet = antwort_hash(kontext.konfig.algorithmus, &verbindung.nonce, &record.passwort);
    if erwartet != antwort {
        tracing::info!(verbindung = %verbindung.tag, benutzer = %name, "Falsche Challenge-Antwort");
        return senden(verbindung, 530, "authentication failed");
    }

    anmelden(kontext, verbindung, name, rechte);
    senden(verbindung, 230, "OK")
}

/// `cookie <token>`
pub async fn cookie<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    if verbindung.benutzer.is_some() {
        return senden(verbindung, 530, "already authenticated");
    }
    let inhalt = match kontext.cookies.verifizieren(&argumente[0]) {
        Ok(inhalt) => inhalt,
        Err(fehler) => {
            tracing::info!(verbindung = %verbindung.tag, fehler = %fehler, "Cookie abgelehnt");
            return senden(verbindung, 530, "authentication failure");
        }
    };
    // Geloeschte Konten bleiben draussen, Cookie hin oder her
    if kontext.db.benutzer(&inhalt.username).await?.is_none() {
        return senden(verbindung, 530, "authentication failure");
    }

    verbindung.cookie = Some(argumente[0].clone());
    anmelden(kontext, verbindung, &inhalt.username, inhalt.rechte);
    // Antwort nennt den Benutzer, damit der Client weiss als wen er agiert
    senden(verbindung, 232, &zitieren(&inhalt.username))
}

/// `make-cookie`
pub async fn make_cookie<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let benutzer = angemeldet(verbindung)?;
    // Der Schnappschuss im Cookie traegt nie das Verbindungsbit
    let rechte = Rechte(verbindung.rechte().0 & !Recht::LOKAL);
    let cookie = kontext.cookies.ausstellen(&benutzer, rechte);
    senden(verbindung, 252, &zitieren(&cookie))
}

/// `revoke`
pub async fn revoke<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    match &verbindung.cookie {
        Some(cookie) => {
            kontext.cookies.widerrufen(cookie);
            senden(verbindung, 250, "OK")
        }
        None => senden(verbindung, 510, "Did not log in with cookie"),
    }
}

/// `nop`
pub fn nop(verbindung: &Verbindung) -> Result<(), ProtokollFehler> {
    senden(verbindung, 250, "OK")
}

/// `version`
pub fn version(verbindung: &Verbindung) -> Result<(), ProtokollFehler> {
    senden(
        verbindung,
        251,
        concat!("musikbox ", env!("CARGO_PKG_VERSION")),
    )
}

/// `log` — abonniert das Ereignisprotokoll
pub async fn log<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    senden(verbindung, 254, "OK")?;

    // Anfangszustand ausgeben bevor der Strom beginnt
    let jetzt = chrono::Utc::now().timestamp().max(0) as u64;
    {
        let w = kontext.warteschlange.read().await;
        let zustand = |was: &str| format!("{jetzt:x} state {was}");
        let _ = verbindung.schreiber.zeile(&zustand(if w.abspielen_aktiv() {
            "enable_play"
        } else {
            "disable_play"
        }));
        let _ = verbindung.schreiber.zeile(&zustand(if w.zufall_aktiv() {
            "enable_random"
        } else {
            "disable_random"
        }));
        let _ = verbindung
            .schreiber
            .zeile(&zustand(if w.ist_pausiert() { "pause" } else { "resume" }));
        if w.spielend().is_some() {
            let _ = verbindung.schreiber.zeile(&zustand("playing"));
        }
    }
    let (links, rechts) = kontext.mixer.lock().await.lautstaerke();
    let _ = verbindung
        .schreiber
        .zeile(&format!("{jetzt:x} volume {links} {rechts}"));

    let rechte = verbindung.rechte();
    let darf_user = rechte.hat(Recht::ADMIN) && (verbindung.lokal || kontext.konfig.remote_userman);
    let schreiber = verbindung.schreiber.clone();
    let abo = kontext.log.abonnieren(
        darf_user,
        Box::new(move |zeile| schreiber.zeile(zeile).is_ok()),
    );

    if let Some(sitzung) = kontext.sitzungen.get(&verbindung.tag.0) {
        *sitzung.abo.lock().expect("Abo-Mutex vergiftet") = Some(abo.clone());
    }
    verbindung.log_abo = Some(abo);
    verbindung.log_modus = true;
    Ok(())
}

/// `shutdown`
pub async fn shutdown<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let benutzer = angemeldet(verbindung)?;
    tracing::info!(verbindung = %verbindung.tag, benutzer = %benutzer, "Shutdown angefordert");
    senden(verbindung, 250, "shutting down")?;
    let _ = verbindung.schreiber.leeren().await;
    let _ = kontext.shutdown.send(true);
    Ok(())
}

/// `reconfigure`
pub async fn reconfigure<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    if kontext.reconfigure.send(tx).await.is_err() {
        return senden(verbindung, 550, "error reading new config");
    }
    match rx.await {
        Ok(true) => senden(verbindung, 250, "installed new config"),
        _ => senden(verbindung, 550, "error reading new config"),
    }
}

/// `volume [links [rechts]]`
pub async fn volume<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    if argumente.is_empty() {
        let (links, rechts) = kontext.mixer.lock().await.lautstaerke();
        return senden(verbindung, 252, &format!("{links} {rechts}"));
    }

    // Lesen darf jeder mit read; setzen nur mit volume-Recht
    if !verbindung.rechte().hat(Recht::VOLUME) {
        return senden(verbindung, 510, "Prohibited");
    }
    let links: u32 = argumente[0]
        .parse()
        .map_err(|_| ProtokollFehler::UngueltigeEingabe("invalid volume".into()))?;
    let rechts: u32 = match argumente.get(1) {
        Some(wert) => wert
            .parse()
            .map_err(|_| ProtokollFehler::UngueltigeEingabe("invalid volume".into()))?,
        None => links,
    };
    if links > 100 || rechts > 100 {
        return Err(ProtokollFehler::UngueltigeEingabe("invalid volume".into()));
    }
    let mut mixer = kontext.mixer.lock().await;
    mixer.lautstaerke_setzen(links, rechts);
    let (links, rechts) = mixer.lautstaerke();
    senden(verbindung, 252, &format!("{links} {rechts}"))
}

/// `rtp-address`
pub fn rtp_address<D>(
    kontext: &ServerKontext<D>,
    verbindung: &Verbindung,
) -> Result<(), ProtokollFehler> {
    match kontext.konfig.rtp_adresse {
        Some(adresse) => senden(
            verbindung,
            252,
            &format!(
                "{} {}",
                zitieren(&adresse.ip().to_string()),
                adresse.port()
            ),
        ),
        None => senden(verbindung, 550, "No RTP"),
    }
}

/// `rtp-request <adresse> <port>`
pub fn rtp_request<D>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    let ip: std::net::IpAddr = argumente[0]
        .parse()
        .map_err(|_| ProtokollFehler::UngueltigeEingabe("Invalid address".into()))?;
    let port: u16 = argumente[1]
        .parse()
        .map_err(|_| ProtokollFehler::UngueltigeEingabe("Invalid address".into()))?;
    let ziel = std::net::SocketAddr::new(ip, port);

    // Ein neues Ziel ersetzt das alte derselben Verbindung
    if let Some(bisher) = verbindung.rtp_ziel.take() {
        kontext.rtp_empfaenger.entfernen(&bisher);
    }
    kontext.rtp_empfaenger.hinzufuegen(ziel);
    verbindung.rtp_ziel = Some(ziel);
    tracing::info!(
        verbindung = %verbindung.tag,
        benutzer = verbindung.benutzer.as_deref().unwrap_or("-"),
        ziel = %ziel,
        "RTP-Strom angefordert"
    );
    senden(verbindung, 250, "Initiated RTP stream")
}

/// `rtp-cancel`
pub fn rtp_cancel<D>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
) -> Result<(), ProtokollFehler> {
    match verbindung.rtp_ziel.take() {
        Some(ziel) => {
            kontext.rtp_empfaenger.entfernen(&ziel);
            senden(verbindung, 250, "Cancelled RTP stream")
        }
        None => senden(verbindung, 550, "No active RTP stream"),
    }
}
