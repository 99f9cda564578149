//! Befehls-Dispatch
//!
//! Die Tabelle traegt pro Befehl Name, Aritaet, Rechtemaske und die
//! Dispatch-Variante; die eigentlichen Handler liegen nach Kategorie in
//! den Untermodulen. Die Rechtemaske prueft "irgendeines dieser Bits";
//! feinere Urteile (eigen/zufall/fremd, Selbstbedienung bei `edituser`)
//! faellt der jeweilige Handler.

pub mod abspiel;
pub mod benutzer;
pub mod katalog;
pub mod plan;
pub mod playlisten;
pub mod sitzung;
pub mod vorlieben;

use musikbox_auth::Recht;
use musikbox_trackdb::TrackDb;

use crate::antwort;
use crate::fehler::ProtokollFehler;
use crate::kontext::ServerKontext;
use crate::verbindung::{KoerperZiel, Verbindung};

/// Dispatch-Variante eines Befehls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BefehlsArt {
    Adduser,
    Adopt,
    Allfiles,
    Confirm,
    Cookie,
    Deluser,
    Dirs,
    Disable,
    Edituser,
    Enable,
    Enabled,
    Exists,
    Files,
    Get,
    GetGlobal,
    Laenge,
    Log,
    MakeCookie,
    Move,
    Moveafter,
    New,
    Nop,
    Part,
    Pause,
    Play,
    Playafter,
    Playing,
    PlaylistDelete,
    PlaylistGet,
    PlaylistGetShare,
    PlaylistLock,
    PlaylistSet,
    PlaylistSetShare,
    PlaylistUnlock,
    Playlists,
    Prefs,
    Queue,
    RandomDisable,
    RandomEnable,
    RandomEnabled,
    Recent,
    Reconfigure,
    Register,
    Reminder,
    Remove,
    Rescan,
    Resolve,
    Resume,
    Revoke,
    RtpAddress,
    RtpCancel,
    RtpRequest,
    ScheduleAdd,
    ScheduleDel,
    ScheduleGet,
    ScheduleList,
    Scratch,
    Search,
    Set,
    SetGlobal,
    Shutdown,
    Stats,
    Tags,
    Unset,
    UnsetGlobal,
    User,
    Userinfo,
    Users,
    Version,
    Volume,
}

/// Ein Tabelleneintrag
pub struct Befehl {
    pub name: &'static str,
    pub min: usize,
    pub max: usize,
    pub rechte: u32,
    pub art: BefehlsArt,
}

const MAX: usize = usize::MAX;

/// Die Befehls-Tabelle, alphabetisch
pub fn tabelle() -> &'static [Befehl] {
    use BefehlsArt as A;
    static TABELLE: &[Befehl] = &[
        Befehl { name: "adduser", min: 2, max: 3, rechte: Recht::ADMIN, art: A::Adduser },
        Befehl { name: "adopt", min: 1, max: 1, rechte: Recht::PLAY, art: A::Adopt },
        Befehl { name: "allfiles", min: 0, max: 2, rechte: Recht::READ, art: A::Allfiles },
        Befehl { name: "confirm", min: 1, max: 1, rechte: 0, art: A::Confirm },
        Befehl { name: "cookie", min: 1, max: 1, rechte: 0, art: A::Cookie },
        Befehl { name: "deluser", min: 1, max: 1, rechte: Recht::ADMIN, art: A::Deluser },
        Befehl { name: "dirs", min: 0, max: 2, rechte: Recht::READ, art: A::Dirs },
        Befehl { name: "disable", min: 0, max: 1, rechte: Recht::GLOBAL_PREFS, art: A::Disable },
        Befehl { name: "edituser", min: 3, max: 3, rechte: Recht::ADMIN | Recht::USERINFO, art: A::Edituser },
        Befehl { name: "enable", min: 0, max: 0, rechte: Recht::GLOBAL_PREFS, art: A::Enable },
        Befehl { name: "enabled", min: 0, max: 0, rechte: Recht::READ, art: A::Enabled },
        Befehl { name: "exists", min: 1, max: 1, rechte: Recht::READ, art: A::Exists },
        Befehl { name: "files", min: 0, max: 2, rechte: Recht::READ, art: A::Files },
        Befehl { name: "get", min: 2, max: 2, rechte: Recht::READ, art: A::Get },
        Befehl { name: "get-global", min: 1, max: 1, rechte: Recht::READ, art: A::GetGlobal },
        Befehl { name: "length", min: 1, max: 1, rechte: Recht::READ, art: A::Laenge },
        Befehl { name: "log", min: 0, max: 0, rechte: Recht::READ, art: A::Log },
        Befehl { name: "make-cookie", min: 0, max: 0, rechte: Recht::READ, art: A::MakeCookie },
        Befehl { name: "move", min: 2, max: 2, rechte: Recht::MOVE_MASKE, art: A::Move },
        Befehl { name: "moveafter", min: 1, max: MAX, rechte: Recht::MOVE_MASKE, art: A::Moveafter },
        Befehl { name: "new", min: 0, max: 1, rechte: Recht::READ, art: A::New },
        Befehl { name: "nop", min: 0, max: 0, rechte: 0, art: A::Nop },
        Befehl { name: "part", min: 3, max: 3, rechte: Recht::READ, art: A::Part },
        Befehl { name: "pause", min: 0, max: 0, rechte: Recht::PAUSE, art: A::Pause },
        Befehl { name: "play", min: 1, max: 1, rechte: Recht::PLAY, art: A::Play },
        Befehl { name: "playafter", min: 2, max: MAX, rechte: Recht::PLAY, art: A::Playafter },
        Befehl { name: "playing", min: 0, max: 0, rechte: Recht::READ, art: A::Playing },
        Befehl { name: "playlist-delete", min: 1, max: 1, rechte: Recht::PLAY, art: A::PlaylistDelete },
        Befehl { name: "playlist-get", min: 1, max: 1, rechte: Recht::READ, art: A::PlaylistGet },
        Befehl { name: "playlist-get-share", min: 1, max: 1, rechte: Recht::READ, art: A::PlaylistGetShare },
        Befehl { name: "playlist-lock", min: 1, max: 1, rechte: Recht::PLAY, art: A::PlaylistLock },
        Befehl { name: "playlist-set", min: 1, max: 1, rechte: Recht::PLAY, art: A::PlaylistSet },
        Befehl { name: "playlist-set-share", min: 2, max: 2, rechte: Recht::PLAY, art: A::PlaylistSetShare },
        Befehl { name: "playlist-unlock", min: 0, max: 0, rechte: Recht::PLAY, art: A::PlaylistUnlock },
        Befehl { name: "playlists", min: 0, max: 0, rechte: Recht::READ, art: A::Playlists },
        Befehl { name: "prefs", min: 1, max: 1, rechte: Recht::READ, art: A::Prefs },
        Befehl { name: "queue", min: 0, max: 0, rechte: Recht::READ, art: A::Queue },
        Befehl { name: "random-disable", min: 0, max: 0, rechte: Recht::GLOBAL_PREFS, art: A::RandomDisable },
        Befehl { name: "random-enable", min: 0, max: 0, rechte: Recht::GLOBAL_PREFS, art: A::RandomEnable },
        Befehl { name: "random-enabled", min: 0, max: 0, rechte: Recht::READ, art: A::RandomEnabled },
        Befehl { name: "recent", min: 0, max: 0, rechte: Recht::READ, art: A::Recent },
        Befehl { name: "reconfigure", min: 0, max: 0, rechte: Recht::ADMIN, art: A::Reconfigure },
        Befehl { name: "register", min: 3, max: 3, rechte: Recht::REGISTER, art: A::Register },
        Befehl { name: "reminder", min: 1, max: 1, rechte: Recht::LOKAL, art: A::Reminder },
        Befehl { name: "remove", min: 1, max: 1, rechte: Recht::REMOVE_MASKE, art: A::Remove },
        Befehl { name: "rescan", min: 0, max: MAX, rechte: Recht::RESCAN, art: A::Rescan },
        Befehl { name: "resolve", min: 1, max: 1, rechte: Recht::READ, art: A::Resolve },
        Befehl { name: "resume", min: 0, max: 0, rechte: Recht::PAUSE, art: A::Resume },
        Befehl { name: "revoke", min: 0, max: 0, rechte: Recht::READ, art: A::Revoke },
        Befehl { name: "rtp-address", min: 0, max: 0, rechte: 0, art: A::RtpAddress },
        Befehl { name: "rtp-cancel", min: 0, max: 0, rechte: 0, art: A::RtpCancel },
        Befehl { name: "rtp-request", min: 2, max: 2, rechte: Recht::READ, art: A::RtpRequest },
        Befehl { name: "schedule-add", min: 3, max: MAX, rechte: Recht::READ, art: A::ScheduleAdd },
        Befehl { name: "schedule-del", min: 1, max: 1, rechte: Recht::READ, art: A::ScheduleDel },
        Befehl { name: "schedule-get", min: 1, max: 1, rechte: Recht::READ, art: A::ScheduleGet },
        Befehl { name: "schedule-list", min: 0, max: 0, rechte: Recht::READ, art: A::ScheduleList },
        Befehl { name: "scratch", min: 0, max: 1, rechte: Recht::SCRATCH_MASKE, art: A::Scratch },
        Befehl { name: "search", min: 1, max: 1, rechte: Recht::READ, art: A::Search },
        Befehl { name: "set", min: 3, max: 3, rechte: Recht::PREFS, art: A::Set },
        Befehl { name: "set-global", min: 2, max: 2, rechte: Recht::GLOBAL_PREFS, art: A::SetGlobal },
        Befehl { name: "shutdown", min: 0, max: 0, rechte: Recht::ADMIN, art: A::Shutdown },
        Befehl { name: "stats", min: 0, max: 0, rechte: Recht::READ, art: A::Stats },
        Befehl { name: "tags", min: 0, max: 0, rechte: Recht::READ, art: A::Tags },
        Befehl { name: "unset", min: 2, max: 2, rechte: Recht::PREFS, art: A::Unset },
        Befehl { name: "unset-global", min: 1, max: 1, rechte: Recht::GLOBAL_PREFS, art: A::UnsetGlobal },
        Befehl { name: "user", min: 2, max: 2, rechte: 0, art: A::User },
        Befehl { name: "userinfo", min: 2, max: 2, rechte: Recht::READ, art: A::Userinfo },
        Befehl { name: "users", min: 0, max: 0, rechte: Recht::READ, art: A::Users },
        Befehl { name: "version", min: 0, max: 0, rechte: Recht::READ, art: A::Version },
        Befehl { name: "volume", min: 0, max: 2, rechte: Recht::READ | Recht::VOLUME, art: A::Volume },
    ];
    TABELLE
}

/// Fuehrt einen Befehl aus (Aritaet und Tabellenrechte sind geprueft)
pub async fn ausfuehren<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    art: BefehlsArt,
    argumente: &[String],
) -> Result<(), ProtokollFehler> {
    use BefehlsArt as A;
    match art {
        // Sitzung
        A::User => sitzung::user(kontext, verbindung, argumente).await,
        A::Cookie => sitzung::cookie(kontext, verbindung, argumente).await,
        A::MakeCookie => sitzung::make_cookie(kontext, verbindung).await,
        A::Revoke => sitzung::revoke(kontext, verbindung).await,
        A::Nop => sitzung::nop(verbindung),
        A::Version => sitzung::version(verbindung),
        A::Log => sitzung::log(kontext, verbindung).await,
        A::Shutdown => sitzung::shutdown(kontext, verbindung).await,
        A::Reconfigure => sitzung::reconfigure(kontext, verbindung).await,
        A::Volume => sitzung::volume(kontext, verbindung, argumente).await,
        A::RtpAddress => sitzung::rtp_address(kontext, verbindung),
        A::RtpRequest => sitzung::rtp_request(kontext, verbindung, argumente),
        A::RtpCancel => sitzung::rtp_cancel(kontext, verbindung),

        // Abspielen
        A::Play => abspiel::play(kontext, verbindung, argumente).await,
        A::Playafter => abspiel::playafter(kontext, verbindung, argumente).await,
        A::Pause => abspiel::pause(kontext, verbindung).await,
        A::Resume => abspiel::resume(kontext, verbindung).await,
        A::Scratch => abspiel::scratch(kontext, verbindung, argumente).await,
        A::Remove => abspiel::remove(kontext, verbindung, argumente).await,
        A::Move => abspiel::moven(kontext, verbindung, argumente).await,
        A::Moveafter => abspiel::moveafter(kontext, verbindung, argumente).await,
        A::Adopt => abspiel::adopt(kontext, verbindung, argumente).await,
        A::Playing => abspiel::playing(kontext, verbindung).await,
        A::Queue => abspiel::queue(kontext, verbindung).await,
        A::Recent => abspiel::recent(kontext, verbindung).await,
        A::Enable => abspiel::enable(kontext, verbindung).await,
        A::Disable => abspiel::disable(kontext, verbindung, argumente).await,
        A::Enabled => abspiel::enabled(kontext, verbindung).await,
        A::RandomEnable => abspiel::random_schalten(kontext, verbindung, true).await,
        A::RandomDisable => abspiel::random_schalten(kontext, verbindung, false).await,
        A::RandomEnabled => abspiel::random_enabled(kontext, verbindung).await,

        // Katalog
        A::Dirs => katalog::dirs(kontext, verbindung, argumente).await,
        A::Files => katalog::files(kontext, verbindung, argumente).await,
        A::Allfiles => katalog::allfiles(kontext, verbindung, argumente).await,
        A::Exists => katalog::exists(kontext, verbindung, argumente).await,
        A::Laenge => katalog::laenge(kontext, verbindung, argumente).await,
        A::Part => katalog::part(kontext, verbindung, argumente).await,
        A::Resolve => katalog::resolve(kontext, verbindung, argumente).await,
        A::Search => katalog::search(kontext, verbindung, argumente).await,
        A::Tags => katalog::tags(kontext, verbindung).await,
        A::New => katalog::new(kontext, verbindung, argumente).await,
        A::Stats => katalog::stats(kontext, verbindung).await,
        A::Rescan => katalog::rescan(kontext, verbindung, argumente).await,

        // Vorlieben
        A::Get => vorlieben::get(kontext, verbindung, argumente).await,
        A::Set => vorlieben::set(kontext, verbindung, argumente).await,
        A::Unset => vorlieben::unset(kontext, verbindung, argumente).await,
        A::Prefs => vorlieben::prefs(kontext, verbindung, argumente).await,
        A::GetGlobal => vorlieben::get_global(kontext, verbindung, argumente).await,
        A::SetGlobal => vorlieben::set_global(kontext, verbindung, argumente).await,
        A::UnsetGlobal => vorlieben::unset_global(kontext, verbindung, argumente).await,

        // Benutzer
        A::Adduser => benutzer::adduser(kontext, verbindung, argumente).await,
        A::Deluser => benutzer::deluser(kontext, verbindung, argumente).await,
        A::Edituser => benutzer::edituser(kontext, verbindung, argumente).await,
        A::Userinfo => benutzer::userinfo(kontext, verbindung, argumente).await,
        A::Users => benutzer::users(kontext, verbindung).await,
        A::Register => benutzer::register(kontext, verbindung, argumente).await,
        A::Confirm => benutzer::confirm(kontext, verbindung, argumente).await,
        A::Reminder => benutzer::reminder(kontext, verbindung, argumente).await,

        // Playlists
        A::Playlists => playlisten::playlists(kontext, verbindung).await,
        A::PlaylistGet => playlisten::playlist_get(kontext, verbindung, argumente).await,
        A::PlaylistSet => playlisten::playlist_set(kontext, verbindung, argumente).await,
        A::PlaylistLock => playlisten::playlist_lock(kontext, verbindung, argumente).await,
        A::PlaylistUnlock => playlisten::playlist_unlock(kontext, verbindung).await,
        A::PlaylistDelete => playlisten::playlist_delete(kontext, verbindung, argumente).await,
        A::PlaylistGetShare => {
            playlisten::playlist_get_share(kontext, verbindung, argumente).await
        }
        A::PlaylistSetShare => {
            playlisten::playlist_set_share(kontext, verbindung, argumente).await
        }

        // Geplante Ereignisse
        A::ScheduleList => plan::schedule_list(kontext, verbindung).await,
        A::ScheduleGet => plan::schedule_get(kontext, verbindung, argumente).await,
        A::ScheduleAdd => plan::schedule_add(kontext, verbindung, argumente).await,
        A::ScheduleDel => plan::schedule_del(kontext, verbindung, argumente).await,
    }
}

/// Schliesst eine Koerpersammlung ab
pub async fn koerper_abschliessen<D: TrackDb>(
    kontext: &ServerKontext<D>,
    verbindung: &mut Verbindung,
    ziel: KoerperZiel,
    koerper: Vec<String>,
) {
    let ergebnis = match ziel {
        KoerperZiel::PlaylistSetzen { name } => {
            playlisten::playlist_set_abschliessen(kontext, verbindung, &name, koerper).await
        }
    };
    if let Err(fehler) = ergebnis {
        let _ = verbindung
            .schreiber
            .zeile(&format!("{} {}", fehler.protokoll_code(), fehler));
    }
}

// ---------------------------------------------------------------------------
// Gemeinsame Helfer
// ---------------------------------------------------------------------------

/// Schreibt eine einfache Antwortzeile
pub(crate) fn senden(
    verbindung: &Verbindung,
    code: u16,
    text: &str,
) -> Result<(), ProtokollFehler> {
    let _ = verbindung.schreiber.zeile(&antwort::zeile(code, text));
    Ok(())
}

/// Schreibt eine 253-Antwort mit Koerper
pub(crate) fn koerper_senden<I, S>(
    verbindung: &Verbindung,
    kopfzeile: &str,
    zeilen: I,
) -> Result<(), ProtokollFehler>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let _ = verbindung
        .schreiber
        .zeile(&antwort::zeile(253, kopfzeile));
    for zeile in zeilen {
        let _ = verbindung
            .schreiber
            .zeile(&antwort::koerper_zeile(zeile.as_ref()));
    }
    let _ = verbindung.schreiber.zeile(antwort::koerper_ende());
    Ok(())
}

/// Angemeldeter Benutzername oder 530
pub(crate) fn angemeldet(verbindung: &Verbindung) -> Result<String, ProtokollFehler> {
    verbindung
        .benutzer
        .clone()
        .ok_or(ProtokollFehler::AuthFehlgeschlagen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tabelle_ist_alphabetisch_und_eindeutig() {
        let tabelle = tabelle();
        for fenster in tabelle.windows(2) {
            assert!(
                fenster[0].name < fenster[1].name,
                "Tabelle muss alphabetisch sein: {} vor {}",
                fenster[0].name,
                fenster[1].name
            );
        }
    }

    #[test]
    fn aritaeten_sind_konsistent() {
        for befehl in tabelle() {
            assert!(befehl.min <= befehl.max, "{}: min > max", befehl.name);
        }
    }

    #[test]
    fn auth_befehle_brauchen_keine_rechte() {
        for name in ["user", "cookie", "confirm", "nop", "rtp-address", "rtp-cancel"] {
            let eintrag = tabelle().iter().find(|b| b.name == name).unwrap();
            assert_eq!(eintrag.rechte, 0, "{name} muss ohne Anmeldung laufen");
        }
    }
}
