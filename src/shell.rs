use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::commands;
use crate::events::{AppEvent, NotificationVariant};
use crate::playback::{format_position, PlaybackEngine, PlaybackSession, PlaybackState};
use crate::session::{Artifact, Selection, StorySettings};
use crate::state::AppState;

const HELP: &str = "\
Commands:
  list                                  show stored stories
  refresh                               reload stories from the backend
  generate <short|medium|long> <voice> <context...>
  open <id>                             load a story into the player
  play | pause                          toggle playback
  seek <fraction|percent>               jump, e.g. `seek 0.5` or `seek 40%`
  status                                show player position
  close                                 close the player
  devices                               list audio output devices
  settings                              show current settings
  settings url <base-url>               change the backend address
  settings device <name...>             change the audio output device
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Refresh,
    Generate(StorySettings),
    Open(String),
    Toggle,
    Seek(f64),
    Status,
    Close,
    Devices,
    Settings,
    SetBackendUrl(String),
    SetOutputDevice(Option<String>),
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "list" | "ls" => Command::List,
        "refresh" => Command::Refresh,
        "generate" | "gen" => {
            let length = words.next().unwrap_or_default();
            let voice = words.next().unwrap_or_default();
            let context = words.collect::<Vec<_>>().join(" ");
            Command::Generate(StorySettings::new(context, voice, length))
        }
        "open" => match words.next() {
            Some(id) => Command::Open(id.to_string()),
            None => return Err("usage: open <id>".into()),
        },
        "play" | "pause" | "toggle" => Command::Toggle,
        "seek" => {
            let arg = words.next().ok_or("usage: seek <fraction|percent>")?;
            let fraction = commands::playback::parse_fraction(arg).map_err(|e| e.to_string())?;
            Command::Seek(fraction)
        }
        "status" => Command::Status,
        "close" | "stop" => Command::Close,
        "devices" => Command::Devices,
        "settings" => match words.next() {
            None => Command::Settings,
            Some("url") => match words.next() {
                Some(url) => Command::SetBackendUrl(url.to_string()),
                None => return Err("usage: settings url <base-url>".into()),
            },
            Some("device") => {
                let name = words.collect::<Vec<_>>().join(" ");
                Command::SetOutputDevice((!name.is_empty()).then_some(name))
            }
            Some(other) => return Err(format!("unknown setting '{}'", other)),
        },
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{}', try `help`", other)),
    };
    Ok(Some(command))
}

/// Read commands from stdin until `quit` or end of input
pub async fn run(
    state: AppState,
    mut engine: PlaybackEngine,
    mut events: UnboundedReceiver<AppEvent>,
    settings_path: PathBuf,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_playback = PlaybackState::Empty;

    println!("Story Narrator v{}", commands::settings::get_app_version());
    println!("{}", HELP);
    print_stories(&commands::stories::list_stories(&state));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => execute(&state, &mut engine, &settings_path, command).await,
                    Ok(None) => {}
                    Err(msg) => println!("{}", msg),
                }
            }
            Some(event) = events.recv() => render_event(&event, &mut last_playback),
        }
    }

    engine.detach();
    Ok(())
}

async fn execute(
    state: &AppState,
    engine: &mut PlaybackEngine,
    settings_path: &Path,
    command: Command,
) {
    match command {
        Command::List => print_stories(&commands::stories::list_stories(state)),
        Command::Refresh => {
            if let Ok(stories) = commands::stories::load_stories(state).await {
                print_stories(&stories);
            }
        }
        Command::Generate(settings) => {
            if let Ok(id) = commands::stories::submit_story(state, settings) {
                println!("Creating your story... ({})", id);
            }
        }
        Command::Open(id) => {
            if let Selection::Open(story) = commands::stories::select_story(state, &id) {
                print_story(&story);
            }
            match commands::playback::open_story(state, engine, &id).await {
                Ok(session) => print_player(&session),
                Err(n) if n.variant == NotificationVariant::Default => {
                    println!("{}: {}", n.title, n.description)
                }
                Err(_) => {}
            }
        }
        Command::Toggle => {
            if let Ok(session) = commands::playback::toggle_playback(state, engine) {
                print_player(&session);
            }
        }
        Command::Seek(fraction) => {
            if let Ok(session) = commands::playback::seek_playback(state, engine, fraction) {
                print_player(&session);
            }
        }
        Command::Status => print_player(&commands::playback::playback_status(engine)),
        Command::Close => print_player(&commands::playback::close_player(engine)),
        Command::Devices => {
            for name in commands::settings::list_output_devices() {
                println!("  {}", name);
            }
        }
        Command::Settings => {
            let settings = commands::settings::get_settings(state);
            match serde_json::to_string_pretty(&settings) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::error!("Failed to render settings: {}", e),
            }
        }
        Command::SetBackendUrl(url) => {
            let mut settings = commands::settings::get_settings(state);
            settings.backend.base_url = url;
            if commands::settings::update_settings(state, settings_path, settings).is_ok() {
                println!("Backend address saved. Restart to apply.");
            }
        }
        Command::SetOutputDevice(device) => {
            let mut settings = commands::settings::get_settings(state);
            settings.playback.output_device = device;
            if commands::settings::update_settings(state, settings_path, settings).is_ok() {
                println!("Output device saved. Restart to apply.");
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

fn render_event(event: &AppEvent, last_playback: &mut PlaybackState) {
    match event {
        AppEvent::Notification { notification } => {
            println!("[{}] {}", notification.title, notification.description);
        }
        AppEvent::GenerationStatus { in_flight: Some(id) } => {
            tracing::debug!("Generation in flight: {}", id);
        }
        AppEvent::GenerationStatus { in_flight: None } => {}
        AppEvent::StoriesChanged { stories } => {
            tracing::debug!("Story list changed ({} stories)", stories.len());
        }
        AppEvent::PlaybackStatus { snapshot } => {
            // Position ticks are frequent; only transitions are printed
            if snapshot.state != *last_playback {
                *last_playback = snapshot.state;
                print_player(snapshot);
            }
        }
    }
}

fn print_stories(stories: &[Artifact]) {
    if stories.is_empty() {
        println!("No stories created yet. Create your first story!");
        return;
    }
    let now = Utc::now();
    for story in stories {
        let length = if story.is_pending() {
            "generating".to_string()
        } else {
            format_position(story.audio_duration)
        };
        println!(
            "  {:<20} {:<40} {:>10}  {}",
            story.id,
            story.title,
            length,
            format_age(story.created_at, now)
        );
    }
}

/// Coarse distance from `created_at` to `now`, e.g. "3 minutes ago"
pub fn format_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - created_at).num_seconds();
    let minutes = (seconds.unsigned_abs() as f64 / 60.0).round() as u64;
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };

    let distance = match minutes {
        0 => "less than a minute".to_string(),
        1..=44 => plural(minutes, "minute"),
        45..=89 => "about 1 hour".to_string(),
        90..=1439 => format!("about {}", plural((minutes + 30) / 60, "hour")),
        1440..=2519 => "1 day".to_string(),
        2520..=43_199 => plural((minutes + 720) / 1440, "day"),
        43_200..=86_399 => format!("about {}", plural((minutes + 21_600) / 43_200, "month")),
        86_400..=525_599 => plural((minutes + 21_600) / 43_200, "month"),
        _ => format!("about {}", plural(minutes / 525_600, "year")),
    };

    if seconds < 0 {
        format!("in {}", distance)
    } else {
        format!("{} ago", distance)
    }
}

fn print_story(story: &Artifact) {
    println!("\n{}\n", story.title);
    for paragraph in story.paragraphs() {
        println!("{}\n", paragraph);
    }
}

fn print_player(session: &PlaybackSession) {
    const BAR_WIDTH: usize = 30;
    let filled = (session.progress() * BAR_WIDTH as f64).round() as usize;
    println!(
        "{:?} [{}{}] {} / {}",
        session.state,
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        format_position(session.position_seconds),
        format_position(session.duration_seconds),
    );
}
