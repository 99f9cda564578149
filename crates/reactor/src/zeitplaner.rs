//! Timeout-Planung
//!
//! Timeouts werden mit absoluter Frist registriert und in einem Min-Heap
//! gehalten. `None` als Frist bedeutet "naechster Durchlauf". Eine Absage
//! markiert den Eintrag nur als inaktiv; abgelaufene-aber-abgesagte
//! Eintraege werden beim Herausnehmen stillschweigend verworfen. Dadurch
//! ist die Absage idempotent und auch aus dem eigenen Callback heraus
//! gefahrlos.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

/// Callback eines Timeouts
pub type ZeitplanCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle auf einen registrierten Timeout
#[derive(Debug, Clone)]
pub struct ZeitplanHandle {
    aktiv: Arc<AtomicBool>,
}

impl ZeitplanHandle {
    /// Sagt den Timeout ab. Idempotent; ein bereits gefeuerter oder
    /// abgesagter Timeout bleibt abgesagt.
    pub fn absagen(&self) {
        self.aktiv.store(false, Ordering::SeqCst);
    }

    /// Gibt `true` zurueck solange der Timeout weder gefeuert noch
    /// abgesagt wurde.
    pub fn ist_aktiv(&self) -> bool {
        self.aktiv.load(Ordering::SeqCst)
    }
}

struct Eintrag {
    frist: Instant,
    folge: u64,
    aktiv: Arc<AtomicBool>,
    callback: ZeitplanCallback,
}

impl PartialEq for Eintrag {
    fn eq(&self, other: &Self) -> bool {
        self.frist == other.frist && self.folge == other.folge
    }
}
impl Eq for Eintrag {}
impl PartialOrd for Eintrag {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Eintrag {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Gleiche Frist: Registrierungsreihenfolge entscheidet
        self.frist
            .cmp(&other.frist)
            .then(self.folge.cmp(&other.folge))
    }
}

/// Timeout-Planer
///
/// Eine Antriebs-Task haelt den Heap und feuert faellige Callbacks in
/// Fristordnung. Registrierung ist von ueberall aus moeglich, auch aus
/// einem gerade laufenden Callback.
#[derive(Clone)]
pub struct Zeitplaner {
    tx: mpsc::UnboundedSender<Eintrag>,
}

impl Zeitplaner {
    /// Startet den Planer samt Antriebs-Task
    pub fn starten() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(antrieb(rx));
        Self { tx }
    }

    /// Registriert einen Timeout
    ///
    /// `frist = None` bedeutet sofortige Ausloesung beim naechsten
    /// Durchlauf der Antriebs-Task.
    pub fn registrieren(
        &self,
        frist: Option<Instant>,
        callback: impl FnOnce() + Send + 'static,
    ) -> ZeitplanHandle {
        static FOLGE: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let aktiv = Arc::new(AtomicBool::new(true));
        let eintrag = Eintrag {
            frist: frist.unwrap_or_else(Instant::now),
            folge: FOLGE.fetch_add(1, Ordering::Relaxed),
            aktiv: Arc::clone(&aktiv),
            callback: Box::new(callback),
        };
        if self.tx.send(eintrag).is_err() {
            // Planer bereits beendet; der Handle bleibt wirkungslos
            aktiv.store(false, Ordering::SeqCst);
        }
        ZeitplanHandle { aktiv }
    }

    /// Bequemlichkeit: Timeout relativ zu jetzt
    pub fn nach(
        &self,
        dauer: std::time::Duration,
        callback: impl FnOnce() + Send + 'static,
    ) -> ZeitplanHandle {
        self.registrieren(Some(Instant::now() + dauer), callback)
    }
}

async fn antrieb(mut rx: mpsc::UnboundedReceiver<Eintrag>) {
    let mut heap: BinaryHeap<Reverse<Eintrag>> = BinaryHeap::new();

    loop {
        // Faellige Eintraege feuern, abgesagte still verwerfen
        let jetzt = Instant::now();
        while heap
            .peek()
            .map(|Reverse(kopf)| kopf.frist <= jetzt)
            .unwrap_or(false)
        {
            let Reverse(eintrag) = heap.pop().expect("peek lieferte einen Eintrag");
            if eintrag.aktiv.swap(false, Ordering::SeqCst) {
                (eintrag.callback)();
            }
        }

        let naechste_frist = heap.peek().map(|Reverse(kopf)| kopf.frist);
        match naechste_frist {
            Some(frist) => {
                tokio::select! {
                    neu = rx.recv() => match neu {
                        Some(e) => heap.push(Reverse(e)),
                        None => break,
                    },
                    _ = tokio::time::sleep_until(frist) => {}
                }
            }
            None => match rx.recv().await {
                Some(e) => heap.push(Reverse(e)),
                None => break,
            },
        }
    }
    tracing::debug!("Zeitplaner beendet");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc as tmpsc;

    #[tokio::test(start_paused = true)]
    async fn timeouts_feuern_in_fristordnung() {
        let planer = Zeitplaner::starten();
        let (tx, mut rx) = tmpsc::unbounded_channel();

        let tx1 = tx.clone();
        planer.nach(Duration::from_secs(2), move || {
            tx1.send(2u32).unwrap();
        });
        let tx2 = tx.clone();
        planer.nach(Duration::from_secs(1), move || {
            tx2.send(1u32).unwrap();
        });

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn absage_verhindert_ausloesung() {
        let planer = Zeitplaner::starten();
        let gefeuert = Arc::new(AtomicUsize::new(0));

        let g = Arc::clone(&gefeuert);
        let handle = planer.nach(Duration::from_millis(50), move || {
            g.fetch_add(1, Ordering::SeqCst);
        });
        handle.absagen();
        handle.absagen(); // Absage ist idempotent

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(gefeuert.load(Ordering::SeqCst), 0);
        assert!(!handle.ist_aktiv());
    }

    #[tokio::test(start_paused = true)]
    async fn keine_frist_heisst_sofort() {
        let planer = Zeitplaner::starten();
        let (tx, mut rx) = tmpsc::unbounded_channel();

        planer.registrieren(None, move || {
            tx.send(()).unwrap();
        });
        assert_eq!(rx.recv().await, Some(()));
    }

    #[tokio::test(start_paused = true)]
    async fn registrierung_aus_callback_heraus() {
        let planer = Zeitplaner::starten();
        let (tx, mut rx) = tmpsc::unbounded_channel();

        let planer2 = planer.clone();
        planer.nach(Duration::from_millis(10), move || {
            planer2.registrieren(None, move || {
                tx.send(()).unwrap();
            });
        });
        assert_eq!(rx.recv().await, Some(()));
    }
}
