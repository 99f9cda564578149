//! Identifikationstypen fuer Musikbox
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutiges Kennzeichen einer Client-Verbindung (fuer Logzeilen)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerbindungsTag(pub Uuid);

impl VerbindungsTag {
    /// Erstellt ein neues zufaelliges Verbindungs-Kennzeichen
    pub fn neu() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VerbindungsTag {
    fn default() -> Self {
        Self::neu()
    }
}

impl std::fmt::Display for VerbindungsTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Nur die ersten 8 Hex-Zeichen, Logzeilen bleiben lesbar
        let s = self.0.simple().to_string();
        write!(f, "V{}", &s[..8])
    }
}

/// Eindeutige ID eines Warteschlangen-Eintrags
///
/// Textuell, damit sie unveraendert durch das Zeilenprotokoll und die
/// Persistenzdatei laufen kann. Innerhalb einer Prozesslebensdauer
/// kollidieren IDs nie (siehe [`IdQuelle`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EintragsId(String);

impl EintragsId {
    /// Uebernimmt eine bereits bestehende ID (z.B. aus der Persistenzdatei)
    pub fn aus_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EintragsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quelle fuer Eintrags-IDs
///
/// Kombiniert die Startzeit des Prozesses mit einem monotonen Zaehler:
/// `<startzeit-hex>_<zaehler-hex>`. Zwei Eintraege desselben Prozesses
/// unterscheiden sich im Zaehler, Eintraege verschiedener Prozesse in der
/// Startzeit.
#[derive(Debug)]
pub struct IdQuelle {
    startzeit: u64,
    zaehler: AtomicU64,
}

impl IdQuelle {
    pub fn neu(startzeit_sekunden: u64) -> Self {
        Self {
            startzeit: startzeit_sekunden,
            zaehler: AtomicU64::new(0),
        }
    }

    /// Erzeugt die naechste eindeutige ID
    pub fn naechste(&self) -> EintragsId {
        let n = self.zaehler.fetch_add(1, Ordering::Relaxed);
        EintragsId(format!("{:x}_{:x}", self.startzeit, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eintrags_ids_kollidieren_nie() {
        let quelle = IdQuelle::neu(0x1234);
        let a = quelle.naechste();
        let b = quelle.naechste();
        assert_ne!(a, b, "Zwei IDs derselben Quelle muessen verschieden sein");
    }

    #[test]
    fn eintrags_id_format() {
        let quelle = IdQuelle::neu(0xcafe);
        let id = quelle.naechste();
        assert_eq!(id.as_str(), "cafe_0");
    }

    #[test]
    fn verbindungs_tag_display_ist_kurz() {
        let tag = VerbindungsTag::neu();
        let s = tag.to_string();
        assert!(s.starts_with('V'));
        assert_eq!(s.len(), 9);
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let id = EintragsId::aus_string("abc_1");
        let json = serde_json::to_string(&id).unwrap();
        let id2: EintragsId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }
}
