//! Reaktor-Bausteine fuer Musikbox
//!
//! Der Server ist logisch kooperativ: jede geteilte Ressource hat genau
//! einen Schreiber. Dieses Crate stellt die Bausteine bereit, auf denen
//! der Rest des Systems aufsetzt:
//!
//! - [`Zeitplaner`]: Timeouts mit absoluter Frist, Min-Heap-Ordnung und
//!   absagefester Ausloesung
//! - [`Signale`]: Signal-Zustellung ausserhalb des Signalkontexts
//! - [`kinder`]: Ueberwachung von Kindprozessen (Dekoder, Rescanner, ...)
//! - [`Lauscher`]: Accept-Schleifen die transiente Fehler ueberleben
//! - [`Leser`] / [`Schreiber`]: gepufferte Lese-/Schreibseiten einer
//!   Verbindung mit Zeit- und Platzschranken

pub mod kinder;
pub mod lauscher;
pub mod puffer;
pub mod signale;
pub mod zeitplaner;

pub use kinder::kind_ueberwachen;
pub use lauscher::Lauscher;
pub use puffer::{Leser, Schreiber, SchreiberFehler, SchreiberGrenzen};
pub use signale::Signale;
pub use zeitplaner::{ZeitplanHandle, Zeitplaner};
