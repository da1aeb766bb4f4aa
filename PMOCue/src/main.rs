mod logs;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, Sender};
use pmoconfig::{Config, get_config};
use pmocue::{
    ActiveMarks, Catalog, CueConfigExt, CueSession, MediaPlayer, NotificationSource,
    NowPlayingUpdate, NowPlayingView, OsaScriptPlayer, PlayState, PlayerInfoWatcher,
    PlayerNotification, ShortcutAction, SimulatedNotifications, SimulatedPlayer, UiPublisher,
};
use tracing::{info, warn};

struct AppOptions {
    config_dir: String,
    catalog: Option<PathBuf>,
    simulate: bool,
}

fn print_usage() {
    println!("Usage: PMOCue [--config-dir <dir>] [--catalog <file.json>] [--simulate]");
    println!();
    println!("  --config-dir  configuration directory (default: $PMOCUE_CONFIG, ./.pmocue, ~/.pmocue)");
    println!("  --catalog     catalog file, remembered for the next start");
    println!("  --simulate    drive an in-memory player instead of the Music app");
}

fn resolve_options() -> Result<AppOptions> {
    let mut args = env::args().skip(1);
    let mut options = AppOptions {
        config_dir: String::new(),
        catalog: None,
        simulate: false,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config-dir" => {
                options.config_dir = args
                    .next()
                    .ok_or_else(|| anyhow!("--config-dir requires a value"))?;
            }
            "--catalog" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("--catalog requires a value"))?;
                options.catalog = Some(PathBuf::from(value));
            }
            "--simulate" => options.simulate = true,
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => bail!("Unknown argument: {other}. Use --help for usage."),
        }
    }
    Ok(options)
}

fn main() -> Result<()> {
    let options = resolve_options()?;
    let config = if options.config_dir.is_empty() {
        get_config()
    } else {
        Arc::new(Config::load_config(&options.config_dir)?)
    };
    logs::init_logging(&config);
    info!(
        config_dir = config.get_config_dir(),
        config_file = %config.get_config_file().display(),
        "Configuration loaded"
    );

    let catalog = load_startup_catalog(&config, options.catalog)?;

    // In simulation the console plays the part of the player's notifications.
    let mut simulated_events: Option<Sender<PlayerNotification>> = None;
    let (player, notifications): (Box<dyn MediaPlayer>, Arc<dyn NotificationSource>) =
        if options.simulate {
            info!("🧪 Using the simulated player");
            let (events, source) = SimulatedNotifications::channel();
            simulated_events = Some(events);
            let player: Box<dyn MediaPlayer> = Box::new(SimulatedPlayer::from_catalog(&catalog));
            let source: Arc<dyn NotificationSource> = Arc::new(source);
            (player, source)
        } else {
            let application = config.get_cue_player_application()?;
            info!(application = %application, "🎵 Driving player through osascript");
            let player: Box<dyn MediaPlayer> = Box::new(
                OsaScriptPlayer::new(&application, &config.get_cue_main_window_title()?)
                    .with_script_timeout(config.get_cue_call_timeout()?),
            );
            let source: Arc<dyn NotificationSource> =
                Arc::new(PlayerInfoWatcher::new(&application));
            (player, source)
        };

    let (publisher, updates) = UiPublisher::channel();
    let session = CueSession::new(
        player,
        catalog,
        config.get_cue_session_options()?,
        publisher,
    )?;
    session.watch_notifications(notifications)?;
    let ui = spawn_ui(updates)?;

    println!("PMOCue ready. Type 'help' for commands.");
    let result = run_console(&session, &config, simulated_events.as_ref());

    session.shutdown();
    // The reconciler owned the last publisher: the UI thread ends now.
    drop(session);
    let _ = ui.join();
    result
}

fn load_startup_catalog(config: &Config, cli_path: Option<PathBuf>) -> Result<Catalog> {
    let from_cli = cli_path.is_some();
    let Some(path) = cli_path.or(config.get_cue_catalog_path()?) else {
        info!("No catalog configured, starting empty");
        return Ok(Catalog::empty());
    };

    match Catalog::load(&path) {
        Ok(catalog) => {
            if from_cli {
                config.set_cue_catalog_path(&path)?;
            }
            Ok(catalog)
        }
        Err(err) => {
            eprintln!("Cannot load catalog {}: {err}", path.display());
            warn!(path = %path.display(), error = %err, "Starting with an empty catalog");
            Ok(Catalog::empty())
        }
    }
}

fn spawn_ui(updates: Receiver<NowPlayingUpdate>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new().name("cue-ui".into()).spawn(move || {
        let mut marks = ActiveMarks::new();
        for update in updates {
            marks.apply(&update);
            render(&update.view, &marks);
        }
    })
}

fn render(view: &NowPlayingView, marks: &ActiveMarks) {
    let ordinal = marks
        .active_item()
        .map(|c| format!(" #{}", c.ordinal))
        .unwrap_or_default();
    println!(
        "♫ {} / {} / {}{}",
        view.collection, view.sub_collection, view.item, ordinal
    );
    println!("  [{}]  [{}]  [{}]", view.previous, view.replay, view.next);
}

#[derive(Debug, PartialEq)]
enum ConsoleCommand {
    Open,
    Close,
    Step(ShortcutAction),
    Play {
        collection: String,
        sub_collection: String,
        offset: f64,
    },
    Fit,
    Resume,
    ToggleFit,
    ToggleResume,
    Load(PathBuf),
    Key(u16),
    Notify(PlayerNotification),
    Help,
    Quit,
}

/// Splits on whitespace, keeping "double quoted" words together.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_command(line: &str) -> Result<ConsoleCommand> {
    let tokens = tokenize(line);
    let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        ["open"] => ConsoleCommand::Open,
        ["close"] => ConsoleCommand::Close,
        ["prev"] => ConsoleCommand::Step(ShortcutAction::Previous),
        ["next"] => ConsoleCommand::Step(ShortcutAction::Next),
        ["replay"] => ConsoleCommand::Step(ShortcutAction::Replay),
        ["play", collection, sub_collection, secs] => ConsoleCommand::Play {
            collection: collection.to_string(),
            sub_collection: sub_collection.to_string(),
            offset: secs
                .parse()
                .with_context(|| format!("invalid offset: {secs}"))?,
        },
        ["fit"] => ConsoleCommand::Fit,
        ["resume"] => ConsoleCommand::Resume,
        ["toggle", "fit"] => ConsoleCommand::ToggleFit,
        ["toggle", "resume"] => ConsoleCommand::ToggleResume,
        ["load", path] => ConsoleCommand::Load(PathBuf::from(*path)),
        ["notify", state] => ConsoleCommand::Notify(parse_notification(state, None)?),
        ["notify", state, name] => {
            ConsoleCommand::Notify(parse_notification(state, Some(*name))?)
        }
        ["key", code] => {
            ConsoleCommand::Key(code.parse().with_context(|| format!("invalid key code: {code}"))?)
        }
        ["help"] => ConsoleCommand::Help,
        ["quit"] | ["exit"] => ConsoleCommand::Quit,
        _ => bail!("unknown command: {line}"),
    };
    Ok(command)
}

fn parse_notification(state: &str, name: Option<&str>) -> Result<PlayerNotification> {
    let state = PlayState::from_name(state);
    if state == PlayState::Unknown {
        bail!("unknown play state, expected playing, paused or stopped");
    }
    Ok(PlayerNotification::new(state, name))
}

fn print_commands() {
    println!("open | close                     show / hide the now-playing surface (polling)");
    println!("prev | next | replay             move relative to the current item");
    println!("play <collection> <sub> <secs>   play from an offset (quote names with spaces)");
    println!("fit                              fit the video window now");
    println!("resume                           restart the current video in place");
    println!("toggle fit | toggle resume       flip a feature switch");
    println!("load <file.json>                 load another catalog");
    println!("key <code>                       simulate a shortcut key");
    println!("notify <state> [name]            deliver a player notification");
    println!("quit");
}

fn run_console(
    session: &CueSession,
    config: &Config,
    simulated_events: Option<&Sender<PlayerNotification>>,
) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match parse_command(line) {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            return Ok(());
        }
        if let Err(err) = execute(session, config, simulated_events, command) {
            println!("⚠️ {err}");
        }
    }
}

fn execute(
    session: &CueSession,
    config: &Config,
    simulated_events: Option<&Sender<PlayerNotification>>,
    command: ConsoleCommand,
) -> Result<()> {
    match command {
        ConsoleCommand::Open => session.surface_opened()?,
        ConsoleCommand::Close => session.surface_closed(),
        ConsoleCommand::Step(action) => {
            if session.handle_action(action)?.is_none() {
                println!("Nothing known is playing");
            }
        }
        ConsoleCommand::Play {
            collection,
            sub_collection,
            offset,
        } => {
            session.play_item(&collection, &sub_collection, offset)?;
        }
        ConsoleCommand::Fit => match session.fit_window() {
            Some(outcome) => println!("{outcome:?}"),
            None => println!("Window fit failed"),
        },
        ConsoleCommand::Resume => println!("{:?}", session.resume_video()?),
        ConsoleCommand::ToggleFit => {
            let enabled = session.features().toggle_auto_fit();
            config.set_cue_auto_fit(enabled)?;
            println!("auto-fit: {enabled}");
        }
        ConsoleCommand::ToggleResume => {
            let enabled = session.features().toggle_resume_stuck_video();
            config.set_cue_resume_stuck_video(enabled)?;
            println!("resume stuck video: {enabled}");
        }
        ConsoleCommand::Load(path) => {
            session.load_catalog(&path)?;
            config.set_cue_catalog_path(&path)?;
            println!("Catalog loaded from {}", path.display());
        }
        ConsoleCommand::Key(code) => {
            if session.key_bindings().action_for(code).is_none() {
                println!("Key {code} is not bound");
            } else {
                session.handle_key(code)?;
            }
        }
        ConsoleCommand::Notify(notification) => match simulated_events {
            Some(events) => events
                .send(notification)
                .map_err(|_| anyhow!("notification watcher stopped"))?,
            None => session.notify(notification),
        },
        ConsoleCommand::Help => print_commands(),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_play_with_quoted_names() {
        let command = parse_command(r#"play "Tour 2021" NightOne 95"#).unwrap();
        assert_eq!(
            command,
            ConsoleCommand::Play {
                collection: "Tour 2021".into(),
                sub_collection: "NightOne".into(),
                offset: 95.0,
            }
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("next").unwrap(), ConsoleCommand::Step(ShortcutAction::Next));
        assert_eq!(parse_command("toggle fit").unwrap(), ConsoleCommand::ToggleFit);
        assert_eq!(parse_command("key 106").unwrap(), ConsoleCommand::Key(106));
        assert!(parse_command("key F16").is_err());
        assert!(parse_command("play Tour NightOne").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn test_parse_notify() {
        assert_eq!(
            parse_command(r#"notify playing "Night One""#).unwrap(),
            ConsoleCommand::Notify(PlayerNotification::new(
                PlayState::Playing,
                Some("Night One")
            ))
        );
        assert_eq!(
            parse_command("notify stopped").unwrap(),
            ConsoleCommand::Notify(PlayerNotification::new(PlayState::Stopped, None))
        );
        assert!(parse_command("notify dancing").is_err());
    }
}
