//! Signal-Zustellung
//!
//! Das historische Selbstpipe-Muster steckt heute in der Runtime: pro
//! registriertem Signal laeuft eine Task ueber dem Signal-Strom und ruft
//! den Callback in gewoehnlichem Task-Kontext auf, nie im Signalkontext.

use tokio::signal::unix::{signal, SignalKind};

/// Registrierung von Signal-Callbacks
pub struct Signale;

impl Signale {
    /// Registriert einen Callback fuer ein Signal
    ///
    /// Der Callback wird bei jeder Zustellung des Signals aufgerufen.
    /// Fehler bei der Handler-Installation (etwa in Umgebungen ohne
    /// Signal-Unterstuetzung) werden zurueckgegeben.
    pub fn registrieren(
        art: SignalKind,
        callback: impl Fn() + Send + 'static,
    ) -> std::io::Result<()> {
        let mut strom = signal(art)?;
        tokio::spawn(async move {
            while strom.recv().await.is_some() {
                callback();
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn sighup_wird_zugestellt() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        Signale::registrieren(SignalKind::hangup(), move || {
            let _ = tx.send(());
        })
        .expect("Handler-Installation muss klappen");

        // Signal an den eigenen Prozess schicken
        nix::sys::signal::kill(nix::unistd::Pid::this(), nix::sys::signal::Signal::SIGHUP)
            .expect("kill muss klappen");
        rx.recv().await.expect("Signal muss ankommen");
    }
}
