//! Mixer-Treiber fuer Musikbox
//!
//! Zieht PCM aus dem Dekoder des spielenden Eintrags, wendet die
//! Lautstaerke an und reicht ganze Frames an ein Backend weiter. Backends
//! implementieren die Faehigkeitsmenge
//! `{init, aktivieren, spielen, deaktivieren, vor_poll, bereit}`;
//! ausgeliefert werden der RTP-Sender und die Kommando-Senke, die
//! Plattform-Sinks (ALSA/OSS/CoreAudio) sind externe Mitspieler hinter
//! derselben Schnittstelle.

pub mod backend;
pub mod dekoder;
pub mod fehler;
pub mod treiber;

pub use backend::{AudioBackend, Backend, KommandoBackend, RtpAudioBackend};
pub use dekoder::{Dekoder, DekoderTabelle};
pub use fehler::MixerFehler;
pub use treiber::{GeraeteZustand, MixerTreiber};
