//! Ueberwachung von Kindprozessen
//!
//! Dekoder, Rescanner, Statistik-Sammler und Mail-Versand laufen als
//! Kindprozesse. Pro Kind wartet eine Task auf das Prozessende und ruft
//! den Callback mit dem Exit-Status auf; das entspricht dem
//! SIGCHLD-Reaping des klassischen Servers, nur ohne Signalkontext.

use std::process::ExitStatus;

use tokio::process::Child;

/// Handle auf ein ueberwachtes Kind
pub struct KindHandle {
    abbruch: tokio::sync::oneshot::Sender<()>,
}

impl KindHandle {
    /// Bricht das Kind ab (SIGKILL) ohne auf den Callback zu warten
    pub fn abbrechen(self) {
        let _ = self.abbruch.send(());
    }
}

/// Ueberwacht ein bereits gestartetes Kind
///
/// Der Callback wird genau einmal mit dem Exit-Status aufgerufen, auch
/// wenn das Kind abgebrochen wurde. Das Rueckgabe-Handle erlaubt den
/// vorzeitigen Abbruch.
pub fn kind_ueberwachen(
    mut kind: Child,
    callback: impl FnOnce(std::io::Result<ExitStatus>) + Send + 'static,
) -> KindHandle {
    let (abbruch_tx, mut abbruch_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let status = tokio::select! {
            status = kind.wait() => status,
            _ = &mut abbruch_rx => {
                if let Err(e) = kind.start_kill() {
                    tracing::debug!(fehler = %e, "Kind liess sich nicht abbrechen");
                }
                kind.wait().await
            }
        };
        match &status {
            Ok(s) => tracing::debug!(status = %s, "Kind beendet"),
            Err(e) => tracing::warn!(fehler = %e, "Warten auf Kind fehlgeschlagen"),
        }
        callback(status);
    });

    KindHandle { abbruch: abbruch_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn erfolgreiches_kind_meldet_status_null() {
        let kind = Command::new("true").spawn().expect("true muss starten");
        let (tx, mut rx) = mpsc::unbounded_channel();
        kind_ueberwachen(kind, move |status| {
            let _ = tx.send(status);
        });
        let status = rx.recv().await.unwrap().expect("wait muss klappen");
        assert!(status.success());
    }

    #[tokio::test]
    async fn fehlschlagendes_kind_meldet_status() {
        let kind = Command::new("false").spawn().expect("false muss starten");
        let (tx, mut rx) = mpsc::unbounded_channel();
        kind_ueberwachen(kind, move |status| {
            let _ = tx.send(status);
        });
        let status = rx.recv().await.unwrap().expect("wait muss klappen");
        assert!(!status.success());
    }

    #[tokio::test]
    async fn abbruch_beendet_langlaeufer() {
        let kind = Command::new("sleep")
            .arg("600")
            .spawn()
            .expect("sleep muss starten");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = kind_ueberwachen(kind, move |status| {
            let _ = tx.send(status);
        });
        handle.abbrechen();
        let status = rx.recv().await.unwrap().expect("wait muss klappen");
        assert!(!status.success(), "abgebrochenes Kind endet nicht mit 0");
    }
}
