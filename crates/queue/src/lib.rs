//! Warteschlangen-Engine fuer Musikbox
//!
//! Haelt die Liste der anstehenden Titel, den gerade spielenden Eintrag
//! und die begrenzte Liste kuerzlich beendeter Eintraege. Die Engine ist
//! der einzige Mutator dieses Zustands; der Server haelt sie hinter
//! genau einem Kontext.

pub mod eintrag;
pub mod engine;
pub mod fehler;
pub mod zufall;

pub use eintrag::{AbspielStatus, Herkunft, QueueEintrag};
pub use engine::{EinreihPosition, PausenErgebnis, Warteschlange, WarteschlangenKonfig};
pub use fehler::QueueFehler;
pub use zufall::{GewichteteWahl, ZufallsWaehler};
