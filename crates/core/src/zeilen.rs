//! Zeilenzerlegung mit Shell-artiger Grammatik
//!
//! Wird vom Protokoll, vom Konfigurationslader und von der
//! Ereignisformatierung gemeinsam verwendet. Ungequotete Tokens enden am
//! Whitespace; doppelt gequotete Tokens erlauben `\"` und `\\`;
//! `#` beginnt ausserhalb von Quotes einen Kommentar, sofern der
//! Aufrufkontext das freigeschaltet hat.

use thiserror::Error;

/// Optionen der Zerlegung
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaltOptionen {
    /// `#` ausserhalb von Quotes beginnt einen Kommentar
    pub kommentare: bool,
}

impl SpaltOptionen {
    /// Protokollzeilen: Quotes ja, Kommentare nein
    pub fn protokoll() -> Self {
        Self { kommentare: false }
    }

    /// Konfigurationszeilen: Quotes und Kommentare
    pub fn konfiguration() -> Self {
        Self { kommentare: true }
    }
}

/// Fehler der Zeilenzerlegung
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpaltFehler {
    #[error("unbeendetes Quote")]
    UnbeendetesQuote,

    #[error("ungueltige Escape-Sequenz '\\{0}'")]
    UngueltigesEscape(char),

    #[error("Backslash am Zeilenende")]
    BackslashAmEnde,
}

/// Zerlegt eine Zeile in Tokens
pub fn spalten(zeile: &str, optionen: SpaltOptionen) -> Result<Vec<String>, SpaltFehler> {
    let mut tokens = Vec::new();
    let mut aktuell = String::new();
    let mut im_token = false;
    let mut zeichen = zeile.chars().peekable();

    while let Some(c) = zeichen.next() {
        match c {
            c if c.is_whitespace() => {
                if im_token {
                    tokens.push(std::mem::take(&mut aktuell));
                    im_token = false;
                }
            }
            '#' if optionen.kommentare && !im_token => break,
            '"' => {
                // Gequoteter Abschnitt; darf mitten im Token beginnen
                im_token = true;
                loop {
                    match zeichen.next() {
                        None => return Err(SpaltFehler::UnbeendetesQuote),
                        Some('"') => break,
                        Some('\\') => match zeichen.next() {
                            None => return Err(SpaltFehler::BackslashAmEnde),
                            Some('"') => aktuell.push('"'),
                            Some('\\') => aktuell.push('\\'),
                            Some('n') => aktuell.push('\n'),
                            Some(anderes) => {
                                return Err(SpaltFehler::UngueltigesEscape(anderes))
                            }
                        },
                        Some(anderes) => aktuell.push(anderes),
                    }
                }
            }
            '\\' => {
                im_token = true;
                match zeichen.next() {
                    None => return Err(SpaltFehler::BackslashAmEnde),
                    Some(anderes) => aktuell.push(anderes),
                }
            }
            anderes => {
                im_token = true;
                aktuell.push(anderes);
            }
        }
    }
    if im_token {
        tokens.push(aktuell);
    }
    Ok(tokens)
}

/// Prueft ob ein Token ohne Quotes auskommt
fn braucht_quotes(s: &str) -> bool {
    s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\' || c == '#' || c == '\'')
}

/// Quotet ein Token fuer die Ausgabe, falls noetig
pub fn zitieren(s: &str) -> String {
    if !braucht_quotes(s) {
        return s.to_string();
    }
    let mut ergebnis = String::with_capacity(s.len() + 2);
    ergebnis.push('"');
    for c in s.chars() {
        match c {
            '"' => ergebnis.push_str("\\\""),
            '\\' => ergebnis.push_str("\\\\"),
            '\n' => ergebnis.push_str("\\n"),
            anderes => ergebnis.push(anderes),
        }
    }
    ergebnis.push('"');
    ergebnis
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn einfache_tokens() {
        let tokens = spalten("play tracks/lied.ogg", SpaltOptionen::protokoll()).unwrap();
        assert_eq!(tokens, vec!["play", "tracks/lied.ogg"]);
    }

    #[test]
    fn gequotete_tokens_mit_escapes() {
        let tokens = spalten(
            r#"set "ein titel" "wert mit \"quotes\" und \\backslash""#,
            SpaltOptionen::protokoll(),
        )
        .unwrap();
        assert_eq!(
            tokens,
            vec!["set", "ein titel", "wert mit \"quotes\" und \\backslash"]
        );
    }

    #[test]
    fn quote_mitten_im_token() {
        let tokens = spalten(r#"pre"mit blank"post"#, SpaltOptionen::protokoll()).unwrap();
        assert_eq!(tokens, vec!["premit blankpost"]);
    }

    #[test]
    fn kommentare_nur_wenn_freigeschaltet() {
        let tokens = spalten("play lied # nur ein test", SpaltOptionen::konfiguration()).unwrap();
        assert_eq!(tokens, vec!["play", "lied"]);

        let tokens = spalten("play lied#x", SpaltOptionen::konfiguration()).unwrap();
        assert_eq!(tokens, vec!["play", "lied#x"], "# mitten im Token zaehlt nicht");

        let tokens = spalten("play # kein kommentar", SpaltOptionen::protokoll()).unwrap();
        assert_eq!(tokens, vec!["play", "#", "kein", "kommentar"]);
    }

    #[test]
    fn unbeendetes_quote_ist_fehler() {
        assert_eq!(
            spalten(r#"play "halb"#, SpaltOptionen::protokoll()),
            Err(SpaltFehler::UnbeendetesQuote)
        );
    }

    #[test]
    fn ungueltiges_escape_ist_fehler() {
        assert_eq!(
            spalten(r#"play "a\qb""#, SpaltOptionen::protokoll()),
            Err(SpaltFehler::UngueltigesEscape('q'))
        );
    }

    #[test]
    fn leere_zeile_gibt_keine_tokens() {
        assert!(spalten("   ", SpaltOptionen::protokoll()).unwrap().is_empty());
    }

    #[test]
    fn zitieren_roundtrip() {
        for original in ["schlicht", "mit blank", "mit \"quote\"", "back\\slash", ""] {
            let zitiert = zitieren(original);
            let zurueck = spalten(&zitiert, SpaltOptionen::protokoll()).unwrap();
            if original.is_empty() {
                assert_eq!(zurueck, vec![""]);
            } else {
                assert_eq!(zurueck, vec![original]);
            }
        }
    }
}
