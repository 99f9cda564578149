//! Audio-Backends
//!
//! Jedes Backend implementiert [`Backend`]; [`AudioBackend`] buendelt die
//! ausgelieferten Varianten als getaggte Aufzaehlung, sodass der Treiber
//! ohne dynamische Dispatch-Objekte auskommt.

use std::process::Stdio;
use std::time::Duration;

use musikbox_rtp::RtpSender;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use crate::fehler::MixerFehler;

/// Die Faehigkeitsmenge eines Audio-Sinks
#[allow(async_fn_in_trait)]
pub trait Backend: Send {
    fn name(&self) -> &'static str;

    /// Einmalige Initialisierung (Socket/Prozess oeffnen)
    async fn init(&mut self) -> Result<(), MixerFehler>;

    /// Abspielen beginnt oder wird fortgesetzt
    async fn aktivieren(&mut self) -> Result<(), MixerFehler>;

    /// Gibt ganze Frames aus; Rueckgabe ist die Anzahl tatsaechlich
    /// gespielter Frames
    async fn spielen(&mut self, samples: &[i16]) -> Result<usize, MixerFehler>;

    /// Abspielen endet oder pausiert
    async fn deaktivieren(&mut self) -> Result<(), MixerFehler>;

    /// Darf das Poll-Timeout der Schleife verkuerzen
    fn vor_poll(&self, timeout: &mut Option<Duration>);

    /// Kann das Backend gerade Nachschub aufnehmen?
    fn bereit(&self) -> bool;

    /// Kanalanzahl des Backends
    fn kanaele(&self) -> u32;
}

// ---------------------------------------------------------------------------
// RTP-Backend
// ---------------------------------------------------------------------------

/// Netzwerk-Sink: paketiert PCM als RTP
pub struct RtpAudioBackend {
    sender: RtpSender,
    kanaele: u32,
}

impl RtpAudioBackend {
    pub fn neu(sender: RtpSender, kanaele: u32) -> Self {
        Self { sender, kanaele }
    }

    /// Zugriff auf den Sender (Empfaengerliste, Adresse)
    pub fn sender(&self) -> &RtpSender {
        &self.sender
    }
}

impl Backend for RtpAudioBackend {
    fn name(&self) -> &'static str {
        "rtp"
    }

    async fn init(&mut self) -> Result<(), MixerFehler> {
        Ok(())
    }

    async fn aktivieren(&mut self) -> Result<(), MixerFehler> {
        // Erstes Paket nach Start/Fortsetzung traegt das M-Bit
        self.sender.markieren();
        Ok(())
    }

    async fn spielen(&mut self, samples: &[i16]) -> Result<usize, MixerFehler> {
        self.sender.takt_abwarten().await;
        let gesendet = self.sender.senden(samples).await?;
        Ok(gesendet / self.kanaele as usize)
    }

    async fn deaktivieren(&mut self) -> Result<(), MixerFehler> {
        Ok(())
    }

    fn vor_poll(&self, timeout: &mut Option<Duration>) {
        // Hinter der Voraus-Schwelle will der Sender sofort wieder dran
        if self.sender.bereit() {
            *timeout = Some(Duration::ZERO);
        }
    }

    fn bereit(&self) -> bool {
        self.sender.bereit()
    }

    fn kanaele(&self) -> u32 {
        self.kanaele
    }
}

// ---------------------------------------------------------------------------
// Kommando-Backend
// ---------------------------------------------------------------------------

/// Portabler Sink: rohe Samples auf stdin eines Kommandos
pub struct KommandoBackend {
    kommando: Vec<String>,
    kanaele: u32,
    kind: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl KommandoBackend {
    pub fn neu(kommando: Vec<String>, kanaele: u32) -> Self {
        Self {
            kommando,
            kanaele,
            kind: None,
            stdin: None,
        }
    }
}

impl Backend for KommandoBackend {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn init(&mut self) -> Result<(), MixerFehler> {
        if self.kind.is_some() {
            return Ok(());
        }
        if self.kommando.is_empty() {
            return Err(MixerFehler::Backend("leeres Sink-Kommando".into()));
        }
        let mut kind = Command::new(&self.kommando[0])
            .args(&self.kommando[1..])
            .stdin(Stdio::piped())
            .spawn()?;
        self.stdin = kind.stdin.take();
        self.kind = Some(kind);
        tracing::info!(kommando = %self.kommando.join(" "), "Kommando-Sink gestartet");
        Ok(())
    }

    async fn aktivieren(&mut self) -> Result<(), MixerFehler> {
        if self.kind.is_none() {
            self.init().await?;
        }
        Ok(())
    }

    async fn spielen(&mut self, samples: &[i16]) -> Result<usize, MixerFehler> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MixerFehler::Backend("Sink-Kommando ohne stdin".into()))?;
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_ne_bytes());
        }
        stdin.write_all(&bytes).await?;
        Ok(samples.len() / self.kanaele as usize)
    }

    async fn deaktivieren(&mut self) -> Result<(), MixerFehler> {
        Ok(())
    }

    fn vor_poll(&self, _timeout: &mut Option<Duration>) {}

    fn bereit(&self) -> bool {
        self.stdin.is_some()
    }

    fn kanaele(&self) -> u32 {
        self.kanaele
    }
}

// ---------------------------------------------------------------------------
// Getaggte Backend-Auswahl
// ---------------------------------------------------------------------------

/// Alle ausgelieferten Backends als eine Aufzaehlung
pub enum AudioBackend {
    Rtp(RtpAudioBackend),
    Kommando(KommandoBackend),
}

impl Backend for AudioBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Rtp(b) => b.name(),
            Self::Kommando(b) => b.name(),
        }
    }

    async fn init(&mut self) -> Result<(), MixerFehler> {
        match self {
            Self::Rtp(b) => b.init().await,
            Self::Kommando(b) => b.init().await,
        }
    }

    async fn aktivieren(&mut self) -> Result<(), MixerFehler> {
        match self {
            Self::Rtp(b) => b.aktivieren().await,
            Self::Kommando(b) => b.aktivieren().await,
        }
    }

    async fn spielen(&mut self, samples: &[i16]) -> Result<usize, MixerFehler> {
        match self {
            Self::Rtp(b) => b.spielen(samples).await,
            Self::Kommando(b) => b.spielen(samples).await,
        }
    }

    async fn deaktivieren(&mut self) -> Result<(), MixerFehler> {
        match self {
            Self::Rtp(b) => b.deaktivieren().await,
            Self::Kommando(b) => b.deaktivieren().await,
        }
    }

    fn vor_poll(&self, timeout: &mut Option<Duration>) {
        match self {
            Self::Rtp(b) => b.vor_poll(timeout),
            Self::Kommando(b) => b.vor_poll(timeout),
        }
    }

    fn bereit(&self) -> bool {
        match self {
            Self::Rtp(b) => b.bereit(),
            Self::Kommando(b) => b.bereit(),
        }
    }

    fn kanaele(&self) -> u32 {
        match self {
            Self::Rtp(b) => b.kanaele(),
            Self::Kommando(b) => b.kanaele(),
        }
    }
}
