//! Gemeinsame Basistypen fuer Musikbox
//!
//! Enthaelt die ID-Typen und den gemeinsamen Fehlertyp, die von allen
//! anderen Crates verwendet werden.

pub mod error;
pub mod types;
pub mod zeilen;

pub use error::{KernFehler, Result};
pub use types::{EintragsId, IdQuelle, VerbindungsTag};
pub use zeilen::{spalten, zitieren, SpaltFehler, SpaltOptionen};
