//! TrackDB-Schnittstelle fuer Musikbox
//!
//! Die persistente Titeldatenbank ist ein externer Mitspieler; der Kern
//! konsumiert sie ausschliesslich ueber die Repository-Traits in
//! [`repository`]. [`speicher`] liefert die In-Memory-Referenz, die der
//! Server standardmaessig einsetzt und gegen die alle Tests laufen.

pub mod fehler;
pub mod models;
pub mod repository;
pub mod speicher;

pub use fehler::{DbFehler, DbResult};
pub use repository::TrackDb;
pub use speicher::MemorySpeicher;
