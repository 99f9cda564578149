//! Dekoder-Kindprozesse
//!
//! Pro Format wandelt ein konfiguriertes Kommando die Titeldatei in einen
//! rohen PCM-Strom auf stdout (16 Bit, native Byte-Reihenfolge). Der
//! Platzhalter `{}` in der Kommandovorlage wird durch den Titelpfad
//! ersetzt.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::fehler::MixerFehler;

/// Zuordnung Dateiendung -> Dekoder-Kommando
#[derive(Debug, Clone, Default)]
pub struct DekoderTabelle {
    /// (Endung in Kleinbuchstaben, Kommandovorlage)
    eintraege: Vec<(String, Vec<String>)>,
}

impl DekoderTabelle {
    pub fn neu(eintraege: Vec<(String, Vec<String>)>) -> Self {
        Self {
            eintraege: eintraege
                .into_iter()
                .map(|(endung, kommando)| (endung.to_ascii_lowercase(), kommando))
                .collect(),
        }
    }

    /// Sucht die Kommandovorlage fuer einen Titelpfad
    pub fn vorlage(&self, titel: &str) -> Option<&[String]> {
        let endung = std::path::Path::new(titel)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        self.eintraege
            .iter()
            .find(|(e, _)| *e == endung)
            .map(|(_, kommando)| kommando.as_slice())
    }

    /// Startet den Dekoder fuer einen Titel
    pub fn starten(&self, titel: &str) -> Result<Dekoder, MixerFehler> {
        let vorlage = self
            .vorlage(titel)
            .ok_or_else(|| MixerFehler::KeinDekoder(titel.to_string()))?;
        if vorlage.is_empty() {
            return Err(MixerFehler::KeinDekoder(titel.to_string()));
        }

        let argumente: Vec<String> = vorlage
            .iter()
            .map(|arg| if arg == "{}" { titel.to_string() } else { arg.clone() })
            .collect();

        let mut kind = Command::new(&argumente[0])
            .args(&argumente[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdout = kind
            .stdout
            .take()
            .ok_or_else(|| MixerFehler::Backend("Dekoder ohne stdout".into()))?;

        tracing::info!(titel = titel, kommando = %argumente.join(" "), "Dekoder gestartet");
        Ok(Dekoder {
            kind: Some(kind),
            stdout,
        })
    }
}

/// Ein laufender Dekoder-Kindprozess
pub struct Dekoder {
    kind: Option<Child>,
    stdout: ChildStdout,
}

impl Dekoder {
    /// Liest dekodiertes PCM; `Ok(0)` bedeutet EOF
    pub async fn lesen(&mut self, puffer: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(puffer).await
    }

    /// Nimmt den Kindprozess zur Ueberwachung heraus
    pub fn kind_entnehmen(&mut self) -> Option<Child> {
        self.kind.take()
    }

    /// Bricht den Dekoder ab (Scratch, Entfernen des Kopfes)
    pub async fn abbrechen(&mut self) {
        if let Some(kind) = &mut self.kind {
            if let Err(fehler) = kind.start_kill() {
                tracing::debug!(fehler = %fehler, "Dekoder liess sich nicht abbrechen");
            }
            let _ = kind.wait().await;
        }
        self.kind = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tabelle() -> DekoderTabelle {
        DekoderTabelle::neu(vec![
            (
                "ogg".into(),
                vec!["printf".into(), "%s".into(), "OGGDATEN".into()],
            ),
            ("raw".into(), vec!["cat".into(), "{}".into()]),
        ])
    }

    #[test]
    fn vorlage_nach_endung() {
        let t = tabelle();
        assert!(t.vorlage("tracks/lied.ogg").is_some());
        assert!(t.vorlage("tracks/lied.OGG").is_some(), "Endung ist case-insensitiv");
        assert!(t.vorlage("tracks/lied.wma").is_none());
        assert!(t.vorlage("ohne-endung").is_none());
    }

    #[tokio::test]
    async fn dekoder_liefert_pcm_und_eof() {
        let t = tabelle();
        let mut dekoder = t.starten("tracks/lied.ogg").expect("printf muss starten");

        let mut gesamt = Vec::new();
        let mut puffer = [0u8; 64];
        loop {
            let n = dekoder.lesen(&mut puffer).await.unwrap();
            if n == 0 {
                break;
            }
            gesamt.extend_from_slice(&puffer[..n]);
        }
        assert_eq!(gesamt, b"OGGDATEN");

        let kind = dekoder.kind_entnehmen().expect("Kind ist vorhanden");
        drop(kind);
    }

    #[tokio::test]
    async fn platzhalter_wird_ersetzt() {
        let verzeichnis = std::env::temp_dir().join(format!("musikbox-dek-{}", std::process::id()));
        std::fs::create_dir_all(&verzeichnis).unwrap();
        let pfad = verzeichnis.join("t.raw");
        std::fs::write(&pfad, b"PCMPCM").unwrap();

        let t = tabelle();
        let mut dekoder = t
            .starten(pfad.to_str().unwrap())
            .expect("cat muss starten");
        let mut puffer = [0u8; 16];
        let n = dekoder.lesen(&mut puffer).await.unwrap();
        assert_eq!(&puffer[..n], b"PCMPCM");
        let _ = std::fs::remove_file(&pfad);
    }

    #[tokio::test]
    async fn unbekanntes_format_ist_fehler() {
        let t = tabelle();
        assert!(matches!(
            t.starten("lied.wma"),
            Err(MixerFehler::KeinDekoder(_))
        ));
    }
}
