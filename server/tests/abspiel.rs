//! Integrationstests der Abspielschleife
//!
//! Faehrt die echte Pipeline mit Kommando-Sink und `cat`-Dekoder ueber
//! echten Dateien: Start, Durchlauf bis EOF, Kuerzlich-Liste,
//! Zufalls-Nachschub und Persistenz.

use std::path::PathBuf;
use std::sync::Arc;

use musikbox_auth::CookieFabrik;
use musikbox_eventlog::EventLog;
use musikbox_mixer::{AudioBackend, DekoderTabelle, KommandoBackend, MixerTreiber};
use musikbox_protocol::{ProtokollKonfig, ServerKontext};
use musikbox_queue::{
    AbspielStatus, EinreihPosition, GewichteteWahl, Herkunft, Warteschlange, WarteschlangenKonfig,
};
use musikbox_rtp::sender::EmpfaengerListe;
use musikbox_server::pipeline;
use musikbox_trackdb::MemorySpeicher;
use tokio::sync::{mpsc, oneshot, watch, Notify, RwLock};
use tokio::time::{sleep, timeout, Duration};

fn testverzeichnis(name: &str) -> PathBuf {
    let verzeichnis = std::env::temp_dir().join(format!(
        "musikbox-abspiel-{}-{}",
        name,
        std::process::id()
    ));
    std::fs::create_dir_all(&verzeichnis).expect("Testverzeichnis muss anlegbar sein");
    verzeichnis
}

/// Baut einen Kontext mit Kommando-Sink und `cat`-Dekoder fuer `.raw`
async fn kontext_bauen(
    verzeichnis: &std::path::Path,
    queue_pad: usize,
) -> (ServerKontext<MemorySpeicher>, watch::Sender<bool>) {
    let db = Arc::new(MemorySpeicher::neu());
    let log = EventLog::neu();
    let warteschlange = Arc::new(RwLock::new(Warteschlange::neu(
        WarteschlangenKonfig {
            queue_pad,
            historie: 16,
            replay_min: 0,
            scratch_jingles: Vec::new(),
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
    // `.raw` spielt die Datei; `.slowraw` haelt den Dekoder danach offen,
    // damit Scratch-Tests einen sicher noch laufenden Titel vorfinden
    let dekoder = DekoderTabelle::neu(vec![
        ("raw".into(), vec!["cat".into(), "{}".into()]),
        (
            "slowraw".into(),
            vec![
                "sh".into(),
                "-c".into(),
                "cat \"$1\"; sleep 600".into(),
                "sh".into(),
                "{}".into(),
            ],
        ),
    ]);

    let (shutdown_tx, _shutdown_rx) = watch::channel(false);
    let (reconfigure_tx, _reconfigure_rx) = mpsc::channel::<oneshot::Sender<bool>>(4);

    let kontext = ServerKontext {
        db,
        log,
        warteschlange,
        mixer: Arc::new(tokio::sync::Mutex::new(mixer)),
        dekoder: Arc::new(dekoder),
        cookies: Arc::new(CookieFabrik::neu(3600)),
        konfig: Arc::new(ProtokollKonfig {
            statusdatei: Some(verzeichnis.join("queue")),
            ..ProtokollKonfig::default()
        }),
        rtp_empfaenger: EmpfaengerListe::default(),
        sitzungen: Arc::new(dashmap::DashMap::new()),
        sperren: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        erinnerungen: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        anstoss: Arc::new(Notify::new()),
        shutdown: shutdown_tx.clone(),
        reconfigure: reconfigure_tx,
    };
    (kontext, shutdown_tx)
}

fn pipeline_starten(kontext: &ServerKontext<MemorySpeicher>) {
    let wahl = GewichteteWahl::neu(Arc::clone(&kontext.db), 0, 1);
    let shutdown_rx = kontext.shutdown.subscribe();
    let kontext = kontext.clone();
    tokio::spawn(pipeline::abspielschleife(kontext, wahl, shutdown_rx));
}

#[tokio::test]
async fn titel_laeuft_bis_zum_ende_durch() {
    let verzeichnis = testverzeichnis("durchlauf");
    // 1024 Frames stereo, 16 Bit: 4096 Bytes
    let pfad = verzeichnis.join("titel.raw");
    std::fs::write(&pfad, vec![0u8; 4096]).unwrap();
    let titel = pfad.to_str().unwrap().to_string();

    let (kontext, shutdown) = kontext_bauen(&verzeichnis, 0).await;
    kontext.db.titel_aufnehmen(&titel, None).await;

    let id = {
        let mut w = kontext.warteschlange.write().await;
        w.einreihen(&titel, Some("alice"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap()
    };
    pipeline_starten(&kontext);
    kontext.abspiel_anstossen();

    // Bis der Eintrag fertig in der Kuerzlich-Liste liegt
    timeout(Duration::from_secs(10), async {
        loop {
            {
                let w = kontext.warteschlange.read().await;
                let gefunden = w.kuerzliche().find(|e| e.id == id).map(|eintrag| {
                    (eintrag.status, eintrag.frames_bisher)
                });
                if let Some((status, frames_bisher)) = gefunden {
                    assert_eq!(status, AbspielStatus::Ok);
                    assert_eq!(frames_bisher, 1024, "4096 Bytes = 1024 Frames");
                    break;
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Titel muss binnen 10 s durchlaufen");

    let _ = shutdown.send(true);
    let _ = std::fs::remove_dir_all(&verzeichnis);
}

#[tokio::test]
async fn zufall_fuellt_bis_queue_pad_auf() {
    let verzeichnis = testverzeichnis("nachschub");
    for n in 0..5 {
        std::fs::write(verzeichnis.join(format!("t{n}.raw")), vec![0u8; 256]).unwrap();
    }

    let (kontext, shutdown) = kontext_bauen(&verzeichnis, 3).await;
    for n in 0..5 {
        kontext
            .db
            .titel_aufnehmen(verzeichnis.join(format!("t{n}.raw")).to_str().unwrap(), None)
            .await;
    }
    // Abspielen aus, damit der Bestand messbar stehen bleibt
    kontext.warteschlange.write().await.abspielen_schalten(false);

    pipeline_starten(&kontext);
    kontext.abspiel_anstossen();

    timeout(Duration::from_secs(10), async {
        loop {
            {
                let w = kontext.warteschlange.read().await;
                let anzahl = w.anstehende().count();
                if anzahl == 3 {
                    assert!(w
                        .anstehende()
                        .all(|e| e.herkunft == Herkunft::Random || e.herkunft == Herkunft::Picked));
                    break;
                }
                assert!(anzahl <= 3, "Nachschub ueberfuellt nie");
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Nachschub muss queue_pad erreichen");

    let _ = shutdown.send(true);
    let _ = std::fs::remove_dir_all(&verzeichnis);
}

#[tokio::test]
async fn persistenzdatei_wird_geschrieben() {
    let verzeichnis = testverzeichnis("persistenz");
    std::fs::write(verzeichnis.join("t.raw"), vec![0u8; 256]).unwrap();
    let titel = verzeichnis.join("t.raw").to_str().unwrap().to_string();

    let (kontext, _shutdown) = kontext_bauen(&verzeichnis, 0).await;
    kontext.db.titel_aufnehmen(&titel, None).await;
    kontext.warteschlange.write().await.abspielen_schalten(false);

    {
        let mut w = kontext.warteschlange.write().await;
        w.einreihen(&titel, Some("alice"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap();
    }
    kontext.warteschlange_sichern().await;

    let inhalt = std::fs::read_to_string(verzeichnis.join("queue"))
        .expect("Persistenzdatei muss existieren");
    assert!(inhalt.contains("submitter alice"));
    assert!(inhalt.contains(&titel));

    // Eine frische Engine stellt daraus denselben Bestand her
    let mut neu = Warteschlange::neu(WarteschlangenKonfig::default(), EventLog::neu());
    neu.wiederherstellen(inhalt.lines().map(|z| z.to_string()));
    assert_eq!(neu.anstehende().count(), 1);

    let _ = std::fs::remove_dir_all(&verzeichnis);
}

#[tokio::test]
async fn scratch_beendet_den_dekoder() {
    let verzeichnis = testverzeichnis("scratch");
    std::fs::write(verzeichnis.join("lang.slowraw"), vec![0u8; 4096]).unwrap();
    let titel = verzeichnis.join("lang.slowraw").to_str().unwrap().to_string();

    let (kontext, shutdown) = kontext_bauen(&verzeichnis, 0).await;
    kontext.db.titel_aufnehmen(&titel, None).await;

    let id = {
        let mut w = kontext.warteschlange.write().await;
        w.einreihen(&titel, Some("alice"), EinreihPosition::VorZufall, Herkunft::Picked)
            .unwrap()
    };
    pipeline_starten(&kontext);
    kontext.abspiel_anstossen();

    // Warten bis er laeuft
    timeout(Duration::from_secs(10), async {
        loop {
            if kontext
                .warteschlange
                .read()
                .await
                .spielend()
                .map(|e| e.id == id)
                .unwrap_or(false)
            {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Titel muss anlaufen");

    kontext.warteschlange.write().await.kratzen("bob");
    kontext.abspiel_anstossen();

    timeout(Duration::from_secs(10), async {
        loop {
            {
                let w = kontext.warteschlange.read().await;
                if w.spielend().is_none() {
                    let eintrag = w.kuerzliche().find(|e| e.id == id).expect("in kuerzlich");
                    assert_eq!(eintrag.status, AbspielStatus::Scratched);
                    assert_eq!(eintrag.gekratzt_von.as_deref(), Some("bob"));
                    break;
                }
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Scratch muss den Eintrag abschliessen");

    let _ = shutdown.send(true);
    let _ = std::fs::remove_dir_all(&verzeichnis);
}
