//! Antwortformatierung
//!
//! Drei ASCII-Ziffern, Leerzeichen, Text. `253`-Antworten tragen einen
//! mehrzeiligen Koerper der mit einer einzelnen Punktzeile endet;
//! Datenzeilen die selbst mit `.` beginnen werden durch Verdoppelung
//! geschuetzt.

/// Formatiert eine einzelne Antwortzeile
pub fn zeile(code: u16, text: &str) -> String {
    format!("{code} {text}")
}

/// Schuetzt eine Koerperzeile (fuehrenden Punkt verdoppeln)
pub fn koerper_zeile(daten: &str) -> String {
    if let Some(rest) = daten.strip_prefix('.') {
        format!("..{rest}")
    } else {
        daten.to_string()
    }
}

/// Abschlusszeile eines Koerpers
pub fn koerper_ende() -> &'static str {
    "."
}

/// Entfernt den Verdoppelungsschutz einer empfangenen Koerperzeile
///
/// `None` bedeutet: das war der Terminator.
pub fn koerper_zeile_entgegennehmen(zeile: &str) -> Option<String> {
    match zeile.strip_prefix('.') {
        Some("") => None,
        Some(rest) => Some(format!(".{}", rest.strip_prefix('.').unwrap_or(rest))),
        None => Some(zeile.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn antwortzeile_format() {
        assert_eq!(zeile(250, "OK"), "250 OK");
        assert_eq!(zeile(550, "no such track"), "550 no such track");
    }

    #[test]
    fn punktzeilen_werden_verdoppelt() {
        assert_eq!(koerper_zeile("normal"), "normal");
        assert_eq!(koerper_zeile(".versteckt"), "..versteckt");
        assert_eq!(koerper_zeile("."), "..");
    }

    #[test]
    fn verdoppelung_wird_beim_empfang_entfernt() {
        assert_eq!(koerper_zeile_entgegennehmen("normal").as_deref(), Some("normal"));
        assert_eq!(
            koerper_zeile_entgegennehmen("..versteckt").as_deref(),
            Some(".versteckt")
        );
        assert_eq!(koerper_zeile_entgegennehmen(".").is_none(), true);
    }

    #[test]
    fn sende_empfangs_roundtrip() {
        for original in ["schlicht", ".mit punkt", "..zwei punkte", "."] {
            let gesendet = koerper_zeile(original);
            let empfangen = koerper_zeile_entgegennehmen(&gesendet)
                .expect("geschuetzte Zeile ist nie der Terminator");
            assert_eq!(empfangen, original);
        }
    }
}
