//! Ende-zu-Ende-Tests des Befehlsprotokolls
//!
//! Faehrt echte Verbindungen ueber ein Duplex-Paar gegen den
//! In-Memory-Katalog: Begruessung, Challenge-Anmeldung, Rechte,
//! Warteschlange, Vorlieben, Cookies, Playlists, Ereignisprotokoll.

use std::sync::Arc;

use musikbox_auth::{antwort_hash, CookieFabrik, HashAlgorithmus};
use musikbox_eventlog::EventLog;
use musikbox_mixer::{AudioBackend, DekoderTabelle, KommandoBackend, MixerTreiber};
use musikbox_protocol::{verbindung_behandeln, ProtokollKonfig, ServerKontext};
use musikbox_queue::{Warteschlange, WarteschlangenKonfig};
use musikbox_rtp::sender::EmpfaengerListe;
use musikbox_trackdb::models::BenutzerRecord;
use musikbox_trackdb::repository::{BenutzerRepository, PlaylistRepository};
use musikbox_trackdb::MemorySpeicher;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch, Notify, RwLock};

// ---------------------------------------------------------------------------
// Testaufbau
// ---------------------------------------------------------------------------

async fn test_kontext() -> ServerKontext<MemorySpeicher> {
    let db = Arc::new(MemorySpeicher::neu());
    db.titel_aufnehmen("tracks/abba/arrival/dancing-queen.ogg", Some(231))
        .await;
    db.titel_aufnehmen("tracks/opeth/damnation/windowpane.ogg", Some(465))
        .await;
    db.benutzer_anlegen(BenutzerRecord {
        username: "alice".into(),
        passwort: "wonderland".into(),
        email: Some("alice@example.org".into()),
        rechte: "all".into(),
        bestaetigung: None,
        angelegt_am: chrono::Utc::now(),
    })
    .await
    .unwrap();
    db.benutzer_anlegen(BenutzerRecord {
        username: "bob".into(),
        passwort: "baumeister".into(),
        email: None,
        rechte: "read,play,scratch-own,remove-own,move-own,pause".into(),
        bestaetigung: None,
        angelegt_am: chrono::Utc::now(),
    })
    .await
    .unwrap();

    let log = EventLog::neu();
    let warteschlange = Arc::new(RwLock::new(Warteschlange::neu(
        WarteschlangenKonfig {
            queue_pad: 3,
            ..WarteschlangenKonfig::default()
        },
        log.clone(),
    )));
    let mixer = MixerTreiber::neu(
        AudioBackend::Kommando(KommandoBackend::neu(
            vec!["sh".into(), "-c".into(), "cat > /dev/null".into()],
            2,
        )),
        log.clone(),
    );
    let (shutdown_tx, _shutdown_rx) = watch::channel(false);
    let (reconfigure_tx, _reconfigure_rx) = mpsc::channel::<oneshot::Sender<bool>>(4);

    ServerKontext {
        db,
        log,
        warteschlange,
        mixer: Arc::new(tokio::sync::Mutex::new(mixer)),
        dekoder: Arc::new(DekoderTabelle::default()),
        cookies: Arc::new(CookieFabrik::neu(3600)),
        konfig: Arc::new(ProtokollKonfig::default()),
        rtp_empfaenger: EmpfaengerListe::default(),
        sitzungen: Arc::new(dashmap::DashMap::new()),
        sperren: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        erinnerungen: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        anstoss: Arc::new(Notify::new()),
        shutdown: shutdown_tx,
        reconfigure: reconfigure_tx,
    }
}

struct TestClient {
    leser: BufReader<ReadHalf<DuplexStream>>,
    schreiber: WriteHalf<DuplexStream>,
    nonce: Vec<u8>,
}

impl TestClient {
    /// Verbindet einen Client und liest die Begruessung
    async fn verbinden(kontext: &ServerKontext<MemorySpeicher>, lokal: bool) -> Self {
        let (client_ende, server_ende) = tokio::io::duplex(64 * 1024);
        let kontext = kontext.clone();
        tokio::spawn(async move {
            verbindung_behandeln(kontext, server_ende, lokal).await;
        });

        let (lese, schreib) = tokio::io::split(client_ende);
        let mut client = Self {
            leser: BufReader::new(lese),
            schreiber: schreib,
            nonce: Vec::new(),
        };

        let begruessung = client.zeile().await;
        let teile: Vec<&str> = begruessung.split(' ').collect();
        assert_eq!(teile[0], "231", "Begruessung: {begruessung}");
        assert_eq!(teile[1], "2");
        assert_eq!(teile[2], "sha256");
        client.nonce = hex::decode(teile[3]).expect("Nonce muss Hex sein");
        client
    }

    async fn zeile(&mut self) -> String {
        let mut zeile = String::new();
        self.leser.read_line(&mut zeile).await.expect("Lesen muss klappen");
        zeile.trim_end_matches('\n').to_string()
    }

    async fn befehl(&mut self, zeile: &str) -> String {
        self.roh(zeile).await;
        self.zeile().await
    }

    async fn roh(&mut self, zeile: &str) {
        self.schreiber
            .write_all(format!("{zeile}\n").as_bytes())
            .await
            .expect("Schreiben muss klappen");
    }

    /// Liest einen 253-Koerper bis zur Punktzeile
    async fn koerper(&mut self) -> Vec<String> {
        let mut zeilen = Vec::new();
        loop {
            let zeile = self.zeile().await;
            if zeile == "." {
                return zeilen;
            }
            zeilen.push(zeile);
        }
    }

    async fn anmelden(&mut self, benutzer: &str, passwort: &str) -> String {
        let antwort = antwort_hash(HashAlgorithmus::Sha256, &self.nonce, passwort);
        self.befehl(&format!("user {benutzer} {antwort}")).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anmeldung_mit_korrekter_antwort() {
    let kontext = test_kontext().await;
    let mut client = TestClient::verbinden(&kontext, false).await;
    assert_eq!(client.anmelden("alice", "wonderland").await, "230 OK");
}

#[tokio::test]
async fn anmeldung_mit_falschem_passwort() {
    let kontext = test_kontext().await;
    let mut client = TestClient::verbinden(&kontext, false).await;
    assert_eq!(
        client.anmelden("alice", "falsch").await,
        "530 authentication failed"
    );
    // Die Verbindung laeuft weiter und darf es erneut versuchen
    assert_eq!(client.anmelden("alice", "wonderland").await, "230 OK");
}

#[tokio::test]
async fn unbekannter_befehl_und_aritaet() {
    let kontext = test_kontext().await;
    let mut client = TestClient::verbinden(&kontext, false).await;
    client.anmelden("alice", "wonderland").await;

    assert_eq!(client.befehl("tanzen").await, "500 unknown command");
    assert_eq!(client.befehl("play").await, "500 missing argument(s)");
    assert_eq!(client.befehl("pause zu viel").await, "500 too many arguments");
}

#[tokio::test]
async fn unangemeldete_befehle_sind_verboten() {
    let kontext = test_kontext().await;
    let mut client = TestClient::verbinden(&kontext, false).await;
    assert_eq!(
        client.befehl("play tracks/abba/arrival/dancing-queen.ogg").await,
        "510 Prohibited"
    );
    assert_eq!(client.befehl("nop").await, "250 OK", "nop geht immer");
}

#[tokio::test]
async fn play_reiht_ein_und_queue_listet() {
    let kontext = test_kontext().await;
    let mut client = TestClient::verbinden(&kontext, false).await;
    client.anmelden("alice", "wonderland").await;

    let antwort = client
        .befehl("play tracks/abba/arrival/dancing-queen.ogg")
        .await;
    let (code, id) = antwort.split_once(' ').unwrap();
    assert_eq!(code, "252");

    let kopf = client.befehl("queue").await;
    assert!(kopf.starts_with("253"), "queue beginnt einen Koerper: {kopf}");
    let zeilen = client.koerper().await;
    assert_eq!(zeilen.len(), 1);
    assert!(zeilen[0].contains(&format!("id {id}")));
    assert!(zeilen[0].contains("submitter alice"));

    let antwort = client.befehl("play unbekannter-titel").await;
    assert_eq!(antwort, "550 track is not in database");
}

#[tokio::test]
async fn unautorisiertes_verschieben_laesst_queue_unveraendert() {
    let kontext = test_kontext().await;
    let mut alice = TestClient::verbinden(&kontext, false).await;
    alice.anmelden("alice", "wonderland").await;
    let antwort = alice
        .befehl("play tracks/abba/arrival/dancing-queen.ogg")
        .await;
    let id = antwort.split_once(' ').unwrap().1.to_string();
    alice
        .befehl("play tracks/opeth/damnation/windowpane.ogg")
        .await;

    // bob hat nur move-own und fasst fremde Eintraege nicht an
    let mut bob = TestClient::verbinden(&kontext, false).await;
    bob.anmelden("bob", "baumeister").await;
    assert_eq!(
        bob.befehl(&format!("move {id} 1")).await,
        "510 Not authorized to move that track"
    );

    let vorher: Vec<String> = {
        let w = kontext.warteschlange.read().await;
        w.anstehende().map(|e| e.id.to_string()).collect()
    };
    assert_eq!(vorher[0], id, "Queue ist unveraendert");
}

#[tokio::test]
async fn vorlieben_roundtrip_mit_555() {
    let kontext = test_kontext().await;
    let mut client = TestClient::verbinden(&kontext, false).await;
    client.anmelden("alice", "wonderland").await;

    let titel = "tracks/abba/arrival/dancing-queen.ogg";
    assert_eq!(
        client.befehl(&format!("get {titel} weight")).await,
        "555 not set"
    );
    assert_eq!(client.befehl(&format!("set {titel} weight 90000")).await, "250 OK");
    assert_eq!(client.befehl(&format!("get {titel} weight")).await, "252 90000");
    assert_eq!(client.befehl(&format!("unset {titel} weight")).await, "250 OK");
    assert_eq!(
        client.befehl(&format!("get {titel} weight")).await,
        "555 not set"
    );
}

#[tokio::test]
async fn cookie_roundtrip_und_widerruf() {
    let kontext = test_kontext().await;
    let mut erste = TestClient::verbinden(&kontext, false).await;
    erste.anmelden("alice", "wonderland").await;

    let antwort = erste.befehl("make-cookie").await;
    let (code, cookie) = antwort.split_once(' ').unwrap();
    assert_eq!(code, "252");
    let cookie = cookie.to_string();

    // Frische Verbindung meldet sich per Cookie an
    let mut zweite = TestClient::verbinden(&kontext, false).await;
    assert_eq!(
        zweite.befehl(&format!("cookie {cookie}")).await,
        "232 alice",
        "Antwort nennt den gebundenen Benutzer"
    );
    assert_eq!(zweite.befehl("revoke").await, "250 OK");

    // Nach dem Widerruf ist das Cookie wertlos
    let mut dritte = TestClient::verbinden(&kontext, false).await;
    assert_eq!(
        dritte.befehl(&format!("cookie {cookie}")).await,
        "530 authentication failure"
    );
}

#[tokio::test]
async fn playlist_koerper_mit_punktzeilen() {
    let kontext = test_kontext().await;
    let mut client = TestClient::verbinden(&kontext, false).await;
    client.anmelden("alice", "wonderland").await;

    assert_eq!(
        client.befehl("playlist-lock alice.test").await,
        "250 Acquired lock"
    );

    client.roh("playlist-set alice.test").await;
    client.roh("tracks/eins.ogg").await;
    client.roh("...mit-punkt.ogg").await; // Draht: verdoppelter Punkt
    client.roh(".").await;
    assert_eq!(client.zeile().await, "250 OK");

    let kopf = client.befehl("playlist-get alice.test").await;
    assert!(kopf.starts_with("253"));
    let zeilen = client.koerper().await;
    assert_eq!(zeilen[0], "tracks/eins.ogg");
    assert_eq!(
        zeilen[1], "...mit-punkt.ogg",
        "Gespeichert ist ..mit-punkt.ogg, auf dem Draht wieder verdoppelt"
    );

    // Gespeichert wurde die entdoppelte Fassung
    let gespeichert = kontext.db.playlist("alice.test").await.unwrap().unwrap();
    assert_eq!(gespeichert.titel[1], "..mit-punkt.ogg");
}

#[tokio::test]
async fn playlist_sperren_kollidieren() {
    let kontext = test_kontext().await;
    let mut erste = TestClient::verbinden(&kontext, false).await;
    erste.anmelden("alice", "wonderland").await;
    assert_eq!(
        erste.befehl("playlist-lock alice.party").await,
        "250 Acquired lock"
    );
    assert_eq!(
        erste.befehl("playlist-lock alice.zweite").await,
        "550 Already holding a lock",
        "Hoechstens eine Sperre pro Verbindung"
    );

    // Admin-Verbindung desselben Benutzers will dieselbe Playlist
    let mut zweite = TestClient::verbinden(&kontext, false).await;
    zweite.anmelden("alice", "wonderland").await;
    assert_eq!(
        zweite.befehl("playlist-lock alice.party").await,
        "550 Already locked"
    );

    // Trennung gibt die Sperre frei
    drop(erste);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(
        zweite.befehl("playlist-lock alice.party").await,
        "250 Acquired lock"
    );
}

#[tokio::test]
async fn log_liefert_vorspann_und_ereignisse() {
    let kontext = test_kontext().await;
    let mut beobachter = TestClient::verbinden(&kontext, false).await;
    beobachter.anmelden("alice", "wonderland").await;
    assert_eq!(beobachter.befehl("log").await, "254 OK");

    // Vorspann: Abspiel-, Zufalls- und Pausenzustand plus Lautstaerke
    let mut vorspann = Vec::new();
    for _ in 0..4 {
        vorspann.push(beobachter.zeile().await);
    }
    assert!(vorspann[0].ends_with("state enable_play"));
    assert!(vorspann[1].ends_with("state enable_random"));
    assert!(vorspann[2].ends_with("state resume"));
    assert!(vorspann[3].ends_with("volume 100 100"));

    // Eine zweite Verbindung reiht ein; der Beobachter sieht das Ereignis
    let mut taeter = TestClient::verbinden(&kontext, false).await;
    taeter.anmelden("alice", "wonderland").await;
    taeter
        .befehl("play tracks/abba/arrival/dancing-queen.ogg")
        .await;

    let ereignis = beobachter.zeile().await;
    let (zeit, rest) = ereignis.split_once(' ').unwrap();
    assert!(u64::from_str_radix(zeit, 16).is_ok(), "Hex-Zeitstempel: {ereignis}");
    assert!(rest.starts_with("queue "), "Queue-Ereignis: {rest}");
}

#[tokio::test]
async fn volume_setzen_verlangt_recht() {
    let kontext = test_kontext().await;
    let mut bob = TestClient::verbinden(&kontext, false).await;
    bob.anmelden("bob", "baumeister").await;

    assert_eq!(bob.befehl("volume").await, "252 100 100", "Lesen darf bob");
    assert_eq!(bob.befehl("volume 50").await, "510 Prohibited");

    let mut alice = TestClient::verbinden(&kontext, false).await;
    alice.anmelden("alice", "wonderland").await;
    assert_eq!(alice.befehl("volume 50 60").await, "252 50 60");
    assert_eq!(bob.befehl("volume").await, "252 50 60");
}

#[tokio::test]
async fn benutzerverwaltung_remote_gesperrt() {
    let kontext = test_kontext().await;
    let mut alice = TestClient::verbinden(&kontext, false).await;
    alice.anmelden("alice", "wonderland").await;

    // remote_userman ist standardmaessig aus; alice ist Admin, aber remote
    assert_eq!(
        alice.befehl("adduser carol geheim").await,
        "510 Remote user management is disabled"
    );

    // Ueber den lokalen Transport geht es
    let mut lokal = TestClient::verbinden(&kontext, true).await;
    lokal.anmelden("alice", "wonderland").await;
    assert_eq!(lokal.befehl("adduser carol geheim").await, "250 User created");
    assert!(kontext.db.benutzer("carol").await.unwrap().is_some());
}

#[tokio::test]
async fn rechteaenderung_greift_in_lebende_verbindung() {
    let kontext = test_kontext().await;
    let mut admin = TestClient::verbinden(&kontext, true).await;
    admin.anmelden("alice", "wonderland").await;

    let mut bob = TestClient::verbinden(&kontext, false).await;
    bob.anmelden("bob", "baumeister").await;
    assert_eq!(bob.befehl("volume 10").await, "510 Prohibited");

    assert_eq!(
        admin.befehl("edituser bob rights read,volume").await,
        "250 OK"
    );
    assert_eq!(bob.befehl("volume 10").await, "252 10 10");
}

#[tokio::test]
async fn pause_auf_pausiertem_ist_harmlos() {
    let kontext = test_kontext().await;
    {
        let mut w = kontext.warteschlange.write().await;
        let id = w
            .einreihen(
                "tracks/abba/arrival/dancing-queen.ogg",
                Some("alice"),
                musikbox_queue::EinreihPosition::VorZufall,
                musikbox_queue::Herkunft::Picked,
            )
            .unwrap();
        w.als_vorbereitet_markieren(&id);
        w.naechsten_starten().unwrap();
    }

    let mut client = TestClient::verbinden(&kontext, false).await;
    client.anmelden("alice", "wonderland").await;
    assert_eq!(client.befehl("pause").await, "250 paused");
    assert_eq!(client.befehl("pause").await, "250 already paused");
    assert_eq!(client.befehl("resume").await, "250 resumed");
    assert_eq!(client.befehl("resume").await, "250 not paused");
}

#[tokio::test]
async fn playing_und_scratch() {
    let kontext = test_kontext().await;
    let mut client = TestClient::verbinden(&kontext, false).await;
    client.anmelden("alice", "wonderland").await;

    assert_eq!(client.befehl("playing").await, "259 nothing playing");

    let id = {
        let mut w = kontext.warteschlange.write().await;
        let id = w
            .einreihen(
                "tracks/abba/arrival/dancing-queen.ogg",
                Some("alice"),
                musikbox_queue::EinreihPosition::VorZufall,
                musikbox_queue::Herkunft::Picked,
            )
            .unwrap();
        w.als_vorbereitet_markieren(&id);
        w.naechsten_starten().unwrap();
        id
    };

    let antwort = client.befehl("playing").await;
    assert!(antwort.starts_with("252 "));
    assert!(antwort.contains("state started"));
    assert!(antwort.contains(&format!("id {id}")));

    assert_eq!(client.befehl("scratch").await, "250 scratched");
    let w = kontext.warteschlange.read().await;
    assert!(w.spielend().is_none());
    let letzter = w.kuerzliche().last().unwrap();
    assert_eq!(letzter.id, id);
    assert_eq!(letzter.gekratzt_von.as_deref(), Some("alice"));
}
