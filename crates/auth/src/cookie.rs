//! Signierte Anmelde-Cookies
//!
//! Ein Cookie bindet Benutzername und Rechte-Schnappschuss zeitbegrenzt
//! an eine Signatur, unabhaengig von der TCP-Verbindung. Bei der
//! Schluesselrotation bleibt der Vorgaengerschluessel gueltig, damit
//! laufende Sitzungen nicht zwangsweise neu anmelden muessen; ein Cookie
//! verifiziert bis zu seinem eigenen Ablauf gegen einen der beiden
//! Schluessel.

use std::collections::HashSet;
use std::sync::Mutex;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::fehler::AuthFehler;
use crate::rechte::Rechte;

/// Laenge eines Signierschluessels in Bytes
const SCHLUESSEL_LAENGE: usize = 32;

/// Inhalt eines verifizierten Cookies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieInhalt {
    pub username: String,
    pub rechte: Rechte,
    pub laeuft_ab: DateTime<Utc>,
}

struct Schluessel {
    aktuell: [u8; SCHLUESSEL_LAENGE],
    vorher: Option<[u8; SCHLUESSEL_LAENGE]>,
}

/// Stellt Cookies aus, verifiziert und widerruft sie
pub struct CookieFabrik {
    schluessel: Mutex<Schluessel>,
    widerrufen: Mutex<HashSet<String>>,
    login_lebensdauer: Duration,
}

impl CookieFabrik {
    /// Erstellt eine Fabrik mit frischem Signierschluessel
    pub fn neu(login_lebensdauer_sekunden: i64) -> Self {
        Self {
            schluessel: Mutex::new(Schluessel {
                aktuell: schluessel_erzeugen(),
                vorher: None,
            }),
            widerrufen: Mutex::new(HashSet::new()),
            login_lebensdauer: Duration::seconds(login_lebensdauer_sekunden),
        }
    }

    /// Rotiert den Signierschluessel
    ///
    /// Der bisherige Schluessel bleibt als Vorgaenger gueltig; der davor
    /// faellt weg.
    pub fn rotieren(&self) {
        let mut s = self.schluessel.lock().expect("Schluessel-Mutex vergiftet");
        s.vorher = Some(s.aktuell);
        s.aktuell = schluessel_erzeugen();
        tracing::info!("Cookie-Signierschluessel rotiert");
    }

    /// Stellt ein Cookie fuer einen Benutzer aus
    pub fn ausstellen(&self, username: &str, rechte: Rechte) -> String {
        let laeuft_ab = Utc::now() + self.login_lebensdauer;
        let nutzlast = format!("{:x} {} {:x}", laeuft_ab.timestamp(), username, rechte.0);
        let kodiert = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&nutzlast);
        let signatur = {
            let s = self.schluessel.lock().expect("Schluessel-Mutex vergiftet");
            signieren(&s.aktuell, &nutzlast)
        };
        format!("{kodiert}.{signatur}")
    }

    /// Verifiziert ein Cookie und gibt seinen Inhalt zurueck
    pub fn verifizieren(&self, cookie: &str) -> Result<CookieInhalt, AuthFehler> {
        if self
            .widerrufen
            .lock()
            .expect("Widerruf-Mutex vergiftet")
            .contains(cookie)
        {
            return Err(AuthFehler::CookieWiderrufen);
        }

        let (kodiert, signatur) = cookie.split_once('.').ok_or(AuthFehler::CookieUngueltig)?;
        let nutzlast_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(kodiert)
            .map_err(|_| AuthFehler::CookieUngueltig)?;
        let nutzlast = String::from_utf8(nutzlast_bytes).map_err(|_| AuthFehler::CookieUngueltig)?;

        let passt = {
            let s = self.schluessel.lock().expect("Schluessel-Mutex vergiftet");
            signieren(&s.aktuell, &nutzlast) == signatur
                || s.vorher
                    .map(|v| signieren(&v, &nutzlast) == signatur)
                    .unwrap_or(false)
        };
        if !passt {
            return Err(AuthFehler::CookieUngueltig);
        }

        let mut teile = nutzlast.splitn(3, ' ');
        let ablauf = teile
            .next()
            .and_then(|t| i64::from_str_radix(t, 16).ok())
            .ok_or(AuthFehler::CookieUngueltig)?;
        let username = teile.next().ok_or(AuthFehler::CookieUngueltig)?.to_string();
        let rechte_bits = teile
            .next()
            .and_then(|t| u32::from_str_radix(t, 16).ok())
            .ok_or(AuthFehler::CookieUngueltig)?;

        let laeuft_ab = DateTime::<Utc>::from_timestamp(ablauf, 0).ok_or(AuthFehler::CookieUngueltig)?;
        if laeuft_ab <= Utc::now() {
            return Err(AuthFehler::CookieAbgelaufen);
        }

        Ok(CookieInhalt {
            username,
            rechte: Rechte(rechte_bits),
            laeuft_ab,
        })
    }

    /// Widerruft ein konkretes Cookie
    pub fn widerrufen(&self, cookie: &str) {
        self.widerrufen
            .lock()
            .expect("Widerruf-Mutex vergiftet")
            .insert(cookie.to_string());
    }
}

fn schluessel_erzeugen() -> [u8; SCHLUESSEL_LAENGE] {
    let mut schluessel = [0u8; SCHLUESSEL_LAENGE];
    rand::thread_rng().fill_bytes(&mut schluessel);
    schluessel
}

fn signieren(schluessel: &[u8; SCHLUESSEL_LAENGE], nutzlast: &str) -> String {
    let mut h = Sha256::new();
    h.update(schluessel);
    h.update(nutzlast.as_bytes());
    hex::encode(h.finalize())
}
