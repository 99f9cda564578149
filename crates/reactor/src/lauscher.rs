//! Accept-Schleifen fuer TCP- und Unix-Socket-Listener
//!
//! Transiente Accept-Fehler (abgebrochene Verbindungsaufbauten,
//! Unterbrechungen, Protokollfehler der Gegenseite) duerfen die Schleife
//! nicht beenden; nur echte Socketfehler sind fatal.

use std::io;

use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

/// Accept-Schleifen die transiente Fehler ueberleben
pub struct Lauscher;

fn ist_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    ) || e.raw_os_error() == Some(nix_eproto())
}

// EPROTO taucht in io::ErrorKind nicht auf
const fn nix_eproto() -> i32 {
    71
}

impl Lauscher {
    /// Nimmt TCP-Verbindungen an bis der Listener stirbt
    pub async fn tcp(
        listener: TcpListener,
        mut handler: impl FnMut(TcpStream, std::net::SocketAddr),
    ) -> io::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => handler(stream, addr),
                Err(e) if ist_transient(&e) => {
                    tracing::debug!(fehler = %e, "Transienter Accept-Fehler, weiter");
                }
                Err(e) => {
                    tracing::error!(fehler = %e, "Accept-Schleife beendet");
                    return Err(e);
                }
            }
        }
    }

    /// Nimmt Unix-Socket-Verbindungen an bis der Listener stirbt
    pub async fn unix(
        listener: UnixListener,
        mut handler: impl FnMut(UnixStream),
    ) -> io::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => handler(stream),
                Err(e) if ist_transient(&e) => {
                    tracing::debug!(fehler = %e, "Transienter Accept-Fehler, weiter");
                }
                Err(e) => {
                    tracing::error!(fehler = %e, "Accept-Schleife beendet");
                    return Err(e);
                }
            }
        }
    }
}
