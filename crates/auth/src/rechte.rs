//! Rechte-Bitmaske
//!
//! Jede privilegierte Operation prueft gegen diese Maske. `_local` ist
//! intern und wird ausschliesslich auf Unix-Socket-Verbindungen vergeben;
//! es taucht in Rechtelisten von Benutzerkonten nie auf.

use serde::{Deserialize, Serialize};

use crate::fehler::AuthFehler;

/// Bit-Konstanten der einzelnen Rechte
pub struct Recht;

impl Recht {
    pub const READ: u32 = 0x0000_0001;
    pub const PLAY: u32 = 0x0000_0002;
    pub const MOVE_OWN: u32 = 0x0000_0004;
    pub const MOVE_RANDOM: u32 = 0x0000_0008;
    pub const MOVE_ANY: u32 = 0x0000_0010;
    pub const REMOVE_OWN: u32 = 0x0000_0020;
    pub const REMOVE_RANDOM: u32 = 0x0000_0040;
    pub const REMOVE_ANY: u32 = 0x0000_0080;
    pub const SCRATCH_OWN: u32 = 0x0000_0100;
    pub const SCRATCH_RANDOM: u32 = 0x0000_0200;
    pub const SCRATCH_ANY: u32 = 0x0000_0400;
    pub const PAUSE: u32 = 0x0000_0800;
    pub const REGISTER: u32 = 0x0000_1000;
    pub const ADMIN: u32 = 0x0000_2000;
    pub const PREFS: u32 = 0x0000_4000;
    pub const GLOBAL_PREFS: u32 = 0x0000_8000;
    pub const USERINFO: u32 = 0x0001_0000;
    pub const VOLUME: u32 = 0x0002_0000;
    pub const RESCAN: u32 = 0x0004_0000;
    /// Nur intern, nie aus einer Rechteliste parsbar
    pub const LOKAL: u32 = 0x0008_0000;

    /// Sammelmaske: irgendein Move-Recht
    pub const MOVE_MASKE: u32 = Self::MOVE_OWN | Self::MOVE_RANDOM | Self::MOVE_ANY;
    /// Sammelmaske: irgendein Remove-Recht
    pub const REMOVE_MASKE: u32 = Self::REMOVE_OWN | Self::REMOVE_RANDOM | Self::REMOVE_ANY;
    /// Sammelmaske: irgendein Scratch-Recht
    pub const SCRATCH_MASKE: u32 = Self::SCRATCH_OWN | Self::SCRATCH_RANDOM | Self::SCRATCH_ANY;
}

/// Name <-> Bit, in Listenreihenfolge der Formatierung
const NAMEN: &[(&str, u32)] = &[
    ("read", Recht::READ),
    ("play", Recht::PLAY),
    ("move-own", Recht::MOVE_OWN),
    ("move-random", Recht::MOVE_RANDOM),
    ("move-any", Recht::MOVE_ANY),
    ("remove-own", Recht::REMOVE_OWN),
    ("remove-random", Recht::REMOVE_RANDOM),
    ("remove-any", Recht::REMOVE_ANY),
    ("scratch-own", Recht::SCRATCH_OWN),
    ("scratch-random", Recht::SCRATCH_RANDOM),
    ("scratch-any", Recht::SCRATCH_ANY),
    ("pause", Recht::PAUSE),
    ("register", Recht::REGISTER),
    ("admin", Recht::ADMIN),
    ("prefs", Recht::PREFS),
    ("global-prefs", Recht::GLOBAL_PREFS),
    ("userinfo", Recht::USERINFO),
    ("volume", Recht::VOLUME),
    ("rescan", Recht::RESCAN),
];

/// Zielklasse einer Warteschlangen-Aktion, aus Sicht des Aufrufers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AktionsZiel {
    /// Der Aufrufer hat den Eintrag selbst eingereiht
    Eigen,
    /// Der Eintrag stammt vom Zufallswaehler
    Zufall,
    /// Der Eintrag stammt von jemand anderem
    Fremd,
}

/// Rechte-Bitmaske einer Verbindung oder eines Benutzerkontos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rechte(pub u32);

impl Rechte {
    /// Keine Rechte (Zustand vor der Anmeldung)
    pub const KEINE: Rechte = Rechte(0);

    /// Prueft ob irgendeines der Bits in `maske` gesetzt ist
    pub fn hat(&self, maske: u32) -> bool {
        self.0 & maske != 0
    }

    /// Prueft ob alle Bits in `maske` gesetzt sind
    pub fn hat_alle(&self, maske: u32) -> bool {
        self.0 & maske == maske
    }

    /// Vergibt zusaetzliche Rechte
    pub fn gewaehren(&mut self, maske: u32) {
        self.0 |= maske;
    }

    /// Parst eine kommaseparierte Rechteliste
    ///
    /// `all` steht fuer alle benannten Rechte. `_local` ist nicht parsbar.
    pub fn parsen(liste: &str) -> Result<Rechte, AuthFehler> {
        let mut bits = 0u32;
        for name in liste
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            if name == "all" {
                for (_, bit) in NAMEN {
                    bits |= bit;
                }
                continue;
            }
            match NAMEN.iter().find(|(n, _)| *n == name) {
                Some((_, bit)) => bits |= bit,
                None => return Err(AuthFehler::UnbekanntesRecht(name.to_string())),
            }
        }
        Ok(Rechte(bits))
    }

    /// Formatiert die Maske als kommaseparierte Liste
    ///
    /// `_local` wird nicht mit ausgegeben; es gehoert der Verbindung, nicht
    /// dem Konto.
    pub fn formatieren(&self) -> String {
        NAMEN
            .iter()
            .filter(|(_, bit)| self.hat(*bit))
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Darf der Inhaber einen Eintrag der Zielklasse verschieben?
    pub fn darf_bewegen(&self, ziel: AktionsZiel) -> bool {
        match ziel {
            AktionsZiel::Eigen => self.hat(Recht::MOVE_OWN | Recht::MOVE_ANY),
            AktionsZiel::Zufall => self.hat(Recht::MOVE_RANDOM | Recht::MOVE_ANY),
            AktionsZiel::Fremd => self.hat(Recht::MOVE_ANY),
        }
    }

    /// Darf der Inhaber einen Eintrag der Zielklasse entfernen?
    pub fn darf_entfernen(&self, ziel: AktionsZiel) -> bool {
        match ziel {
            AktionsZiel::Eigen => self.hat(Recht::REMOVE_OWN | Recht::REMOVE_ANY),
            AktionsZiel::Zufall => self.hat(Recht::REMOVE_RANDOM | Recht::REMOVE_ANY),
            AktionsZiel::Fremd => self.hat(Recht::REMOVE_ANY),
        }
    }

    /// Darf der Inhaber einen Eintrag der Zielklasse scratchen?
    pub fn darf_kratzen(&self, ziel: AktionsZiel) -> bool {
        match ziel {
            AktionsZiel::Eigen => self.hat(Recht::SCRATCH_OWN | Recht::SCRATCH_ANY),
            AktionsZiel::Zufall => self.hat(Recht::SCRATCH_RANDOM | Recht::SCRATCH_ANY),
            AktionsZiel::Fremd => self.hat(Recht::SCRATCH_ANY),
        }
    }
}

impl std::fmt::Display for Rechte {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.formatieren())
    }
}
