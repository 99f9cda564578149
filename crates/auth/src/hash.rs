//! Challenge-Response-Hash der Anmeldung
//!
//! Der Server schickt pro Verbindung eine frische 16-Byte-Nonce; der
//! Client antwortet mit `hex(H(nonce || passwort))` im konfigurierten
//! Algorithmus.

use rand::RngCore;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::fehler::AuthFehler;

/// Laenge der Anmelde-Nonce in Bytes
pub const NONCE_LAENGE: usize = 16;

/// Unterstuetzte Hash-Algorithmen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithmus {
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithmus {
    pub fn parsen(s: &str) -> Result<Self, AuthFehler> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            anderes => Err(AuthFehler::UnbekannterAlgorithmus(anderes.to_string())),
        }
    }

    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for HashAlgorithmus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

/// Erzeugt eine frische Anmelde-Nonce
pub fn nonce_erzeugen() -> [u8; NONCE_LAENGE] {
    let mut nonce = [0u8; NONCE_LAENGE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Berechnet die erwartete Antwort `hex(H(nonce || passwort))`
pub fn antwort_hash(algorithmus: HashAlgorithmus, nonce: &[u8], passwort: &str) -> String {
    match algorithmus {
        HashAlgorithmus::Sha1 => {
            let mut h = Sha1::new();
            h.update(nonce);
            h.update(passwort.as_bytes());
            hex::encode(h.finalize())
        }
        HashAlgorithmus::Sha256 => {
            let mut h = Sha256::new();
            h.update(nonce);
            h.update(passwort.as_bytes());
            hex::encode(h.finalize())
        }
        HashAlgorithmus::Sha384 => {
            let mut h = Sha384::new();
            h.update(nonce);
            h.update(passwort.as_bytes());
            hex::encode(h.finalize())
        }
        HashAlgorithmus::Sha512 => {
            let mut h = Sha512::new();
            h.update(nonce);
            h.update(passwort.as_bytes());
            hex::encode(h.finalize())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_ist_zufaellig() {
        assert_ne!(nonce_erzeugen(), nonce_erzeugen());
    }

    #[test]
    fn antwort_ist_deterministisch() {
        let nonce = [7u8; NONCE_LAENGE];
        let a = antwort_hash(HashAlgorithmus::Sha256, &nonce, "geheim");
        let b = antwort_hash(HashAlgorithmus::Sha256, &nonce, "geheim");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64, "SHA-256 ergibt 32 Bytes = 64 Hex-Zeichen");
    }

    #[test]
    fn algorithmen_unterscheiden_sich() {
        let nonce = [7u8; NONCE_LAENGE];
        let laengen = [
            (HashAlgorithmus::Sha1, 40),
            (HashAlgorithmus::Sha256, 64),
            (HashAlgorithmus::Sha384, 96),
            (HashAlgorithmus::Sha512, 128),
        ];
        for (alg, erwartet) in laengen {
            assert_eq!(antwort_hash(alg, &nonce, "pw").len(), erwartet);
        }
    }

    #[test]
    fn bekannter_sha256_vektor() {
        // H("" || "abc") = SHA-256("abc")
        let hash = antwort_hash(HashAlgorithmus::Sha256, &[], "abc");
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn algorithmus_parsen() {
        assert_eq!(
            HashAlgorithmus::parsen("SHA256").unwrap(),
            HashAlgorithmus::Sha256
        );
        assert!(HashAlgorithmus::parsen("md5").is_err());
    }
}
