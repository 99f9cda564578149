//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Listener
    pub netzwerk: NetzwerkEinstellungen,
    /// Warteschlange und Zufallswahl
    pub warteschlange: WarteschlangenEinstellungen,
    /// RTP-Versand
    pub rtp: RtpEinstellungen,
    /// Audio-Backend und Dekoder
    pub audio: AudioEinstellungen,
    /// Anmeldung, Cookies, Benutzerverwaltung
    pub auth: AuthEinstellungen,
    /// Playlists
    pub playlists: PlaylistEinstellungen,
    /// Hilfsprozesse (Rescanner, Mailversand)
    pub helfer: HelferEinstellungen,
    /// Logging
    pub logging: LoggingEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// TCP-Listener (leer = kein TCP)
    pub tcp_listener: Vec<SocketAddr>,
    /// Pfad des Unix-Sockets (vergibt das interne `_local`-Recht)
    pub unix_socket: Option<PathBuf>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            tcp_listener: vec!["127.0.0.1:9600".parse().expect("gueltige Adresse")],
            unix_socket: Some(PathBuf::from("musikbox.sock")),
        }
    }
}

/// Warteschlangen-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarteschlangenEinstellungen {
    /// Zielbestand an anstehenden Titeln
    pub queue_pad: usize,
    /// Obergrenze der Kuerzlich-Liste
    pub history: usize,
    /// Mindestabstand in Sekunden bevor ein Titel erneut zufaellig faellt
    pub replay_min: i64,
    /// Obergrenze der `new`-Liste
    pub new_max: usize,
    /// Alter in Sekunden bis zu dem ein Titel als "neu" gewichtet wird
    pub new_bias_age: i64,
    /// Gewicht neuer Titel in der Zufallswahl
    pub new_bias: u64,
    /// Scratch-Jingles
    pub scratch: Vec<String>,
    /// Persistenzdatei der Warteschlange
    pub statusdatei: Option<PathBuf>,
    /// Wurzel der Musiksammlung
    pub musik_wurzel: Option<PathBuf>,
}

impl Default for WarteschlangenEinstellungen {
    fn default() -> Self {
        Self {
            queue_pad: 10,
            history: 60,
            replay_min: 8 * 3600,
            new_max: 100,
            new_bias_age: 7 * 24 * 3600,
            new_bias: 450,
            scratch: Vec::new(),
            statusdatei: Some(PathBuf::from("queue")),
            musik_wurzel: None,
        }
    }
}

/// RTP-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpEinstellungen {
    /// Zieladresse (Unicast, Broadcast oder Multicast-Gruppe)
    pub ziel: Option<SocketAddr>,
    /// Optionale Quelladresse
    pub quelle: Option<SocketAddr>,
    pub multicast_ttl: u32,
    pub multicast_loop: bool,
    /// Maximale Nutzlast pro Paket in Bytes
    pub rtp_max_payload: usize,
}

impl Default for RtpEinstellungen {
    fn default() -> Self {
        Self {
            ziel: None,
            quelle: None,
            multicast_ttl: 1,
            multicast_loop: true,
            rtp_max_payload: 1444,
        }
    }
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Backend: "rtp" oder "command"
    pub backend: String,
    /// Sink-Kommando fuer das command-Backend
    pub sink_kommando: Vec<String>,
    /// Kanalanzahl (1 oder 2)
    pub kanaele: u32,
    /// Dekoder je Dateiendung: Endung -> Kommandovorlage mit `{}`
    pub dekoder: Vec<DekoderEintrag>,
}

/// Ein Dekoder-Tabelleneintrag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DekoderEintrag {
    pub endung: String,
    pub kommando: Vec<String>,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            backend: "rtp".into(),
            sink_kommando: Vec::new(),
            kanaele: 2,
            dekoder: vec![
                DekoderEintrag {
                    endung: "ogg".into(),
                    kommando: vec!["sox".into(), "{}".into(), "-t".into(), "raw".into(),
                        "-r".into(), "44100".into(), "-c".into(), "2".into(),
                        "-b".into(), "16".into(), "-e".into(), "signed".into(), "-".into()],
                },
                DekoderEintrag {
                    endung: "mp3".into(),
                    kommando: vec!["sox".into(), "{}".into(), "-t".into(), "raw".into(),
                        "-r".into(), "44100".into(), "-c".into(), "2".into(),
                        "-b".into(), "16".into(), "-e".into(), "signed".into(), "-".into()],
                },
                DekoderEintrag {
                    endung: "flac".into(),
                    kommando: vec!["sox".into(), "{}".into(), "-t".into(), "raw".into(),
                        "-r".into(), "44100".into(), "-c".into(), "2".into(),
                        "-b".into(), "16".into(), "-e".into(), "signed".into(), "-".into()],
                },
                DekoderEintrag {
                    endung: "wav".into(),
                    kommando: vec!["sox".into(), "{}".into(), "-t".into(), "raw".into(),
                        "-r".into(), "44100".into(), "-c".into(), "2".into(),
                        "-b".into(), "16".into(), "-e".into(), "signed".into(), "-".into()],
                },
            ],
        }
    }
}

/// Auth-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEinstellungen {
    /// Challenge-Algorithmus: sha1, sha256, sha384, sha512
    pub authorization_algorithm: String,
    /// Rechte neu angelegter Benutzer
    pub default_rights: String,
    /// Lebensdauer eines Anmelde-Cookies in Sekunden
    pub cookie_login_lifetime: i64,
    /// Rotationsintervall des Cookie-Signierschluessels in Sekunden
    pub cookie_key_lifetime: i64,
    /// Benutzerverwaltung ueber TCP zulassen
    pub remote_userman: bool,
    /// Mindestabstand zwischen Erinnerungsmails pro Benutzer
    pub reminder_interval: i64,
}

impl Default for AuthEinstellungen {
    fn default() -> Self {
        Self {
            authorization_algorithm: "sha256".into(),
            default_rights: "read,play,scratch-own,remove-own,move-own,pause,prefs,volume".into(),
            cookie_login_lifetime: 24 * 3600,
            cookie_key_lifetime: 7 * 24 * 3600,
            remote_userman: false,
            reminder_interval: 600,
        }
    }
}

/// Playlist-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistEinstellungen {
    /// Maximale Titelzahl pro Playlist
    pub playlist_max: usize,
    /// Sekunden nach denen eine fremde Sperre verfaellt (0 = nie)
    pub playlist_lock_timeout: i64,
}

impl Default for PlaylistEinstellungen {
    fn default() -> Self {
        Self {
            playlist_max: 500,
            playlist_lock_timeout: 600,
        }
    }
}

/// Hilfsprozess-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HelferEinstellungen {
    /// Rescanner-Kommando (leer = nur Katalogabgleich im Prozess)
    pub rescan_kommando: Vec<String>,
    /// Mailversand-Kommando; `{user}`, `{email}`, `{password}` werden
    /// ersetzt
    pub mail_kommando: Vec<String>,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.warteschlange.queue_pad, 10);
        assert_eq!(cfg.rtp.rtp_max_payload, 1444);
        assert_eq!(cfg.auth.authorization_algorithm, "sha256");
        assert!(!cfg.auth.remote_userman);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            tcp_listener = ["0.0.0.0:9601"]

            [warteschlange]
            queue_pad = 5
            replay_min = 3600

            [auth]
            authorization_algorithm = "sha512"
            remote_userman = true
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.netzwerk.tcp_listener[0].port(), 9601);
        assert_eq!(cfg.warteschlange.queue_pad, 5);
        assert_eq!(cfg.auth.authorization_algorithm, "sha512");
        assert!(cfg.auth.remote_userman);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.playlists.playlist_max, 500);
    }

    #[test]
    fn dekoder_tabelle_hat_gaengige_formate() {
        let cfg = ServerConfig::default();
        let endungen: Vec<&str> = cfg.audio.dekoder.iter().map(|d| d.endung.as_str()).collect();
        for endung in ["ogg", "mp3", "flac"] {
            assert!(endungen.contains(&endung), "{endung} fehlt");
        }
    }
}
