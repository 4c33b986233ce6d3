use std::{
    error::Error,
    fs,
    path::PathBuf,
    sync::mpsc::Sender,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::Value;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use typerace::{
    config::{ConfigStore, FileConfigStore},
    content::{ContentProvider, Difficulty, FallbackCorpus, WithFallback},
    error::ContentFetchError,
    runtime::{ChannelEventSource, FixedTicker, RaceEvent, Runner},
    session::Status,
    sync::{Switchboard, SyncChannel},
    GameSession, Lobby, SessionEvent,
};

const POLL_RATE_MS: u64 = 20;
const PEER_SETUP_LIMIT: Duration = Duration::from_secs(5);
const TOP_ERRORS: usize = 5;

/// headless typing race between simulated typists
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Runs a timed typing race with simulated typists and prints the post-race analysis as JSON. In duel mode a host and a client race each other over an in-process peer link."
)]
pub struct Cli {
    /// race alone or against a peer
    #[clap(short = 'm', long, value_enum, default_value_t = RaceMode::Solo)]
    mode: RaceMode,

    /// sentence difficulty (defaults to the config file's choice)
    #[clap(short = 'd', long, value_enum)]
    difficulty: Option<Difficulty>,

    /// race length in seconds
    #[clap(short = 's', long)]
    secs: Option<u64>,

    /// typing speed of the first player
    #[clap(long, default_value_t = 60)]
    wpm: u32,

    /// typing speed of the opponent in duel mode
    #[clap(long, default_value_t = 45)]
    opponent_wpm: u32,

    /// percentage of keystrokes typed correctly on the first try
    #[clap(long, default_value_t = 95, value_parser = clap::value_parser!(u32).range(0..=100))]
    accuracy: u32,

    /// JSON array of sentences to race on instead of the built-in corpus
    #[clap(short = 'p', long)]
    sentences: Option<PathBuf>,

    /// config file to use instead of the per-user one
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// write the effective settings back to the config file
    #[clap(long)]
    save_config: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RaceMode {
    Solo,
    Duel,
}

/// Content from a user-supplied file; any problem falls through to the corpus.
fn sentence_file(path: Option<PathBuf>) -> impl ContentProvider {
    move |_: Difficulty| -> Result<Vec<String>, ContentFetchError> {
        let Some(path) = &path else {
            return Err(ContentFetchError::Unavailable(
                "no sentence file given".into(),
            ));
        };
        let bytes = fs::read(path)
            .map_err(|e| ContentFetchError::Unavailable(format!("{}: {}", path.display(), e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ContentFetchError::Unavailable(format!("{}: {}", path.display(), e)))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };
    let mut config = store.load();
    if let Some(secs) = cli.secs {
        config.race.duration = Duration::from_secs(secs);
    }
    if let Some(difficulty) = cli.difficulty {
        config.difficulty = difficulty;
    }
    if cli.save_config {
        match store.save(&config) {
            Ok(()) => info!("saved settings to {}", store.path().display()),
            Err(e) => warn!("could not save settings: {}", e),
        }
    }

    let mut provider = WithFallback::with_corpus(
        sentence_file(cli.sentences.clone()),
        FallbackCorpus::new(config.shuffle_fallback),
    );

    let board = Switchboard::new();
    let mut games = vec![GameSession::new(config.race)];
    let mut speeds = vec![cli.wpm];

    if cli.mode == RaceMode::Duel {
        let host_id = games[0].host(SyncChannel::new(board.transport()))?;
        if let Some(host_id) = host_id {
            let mut client = GameSession::new(config.race);
            if client.join(SyncChannel::new(board.transport()), &host_id, Instant::now())? {
                games.push(client);
                speeds.push(cli.opponent_wpm);
            }
        }
        if games.len() == 2 {
            wait_for_peer(&mut games)?;
        } else {
            warn!("no opponent available, racing solo");
            games[0].reset();
        }
    }

    let now = Instant::now();
    games[0].start_session(config.difficulty)?;
    games[0].load(&mut provider, now)?;

    let (tx, source) = ChannelEventSource::pair();
    let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(POLL_RATE_MS)));
    let mut rng = StdRng::from_entropy();

    while !games.iter().all(|g| g.status() == Status::Finished) {
        match runner.step() {
            RaceEvent::Input { player, text } => {
                if let Some(game) = games.get_mut(player) {
                    game.handle_keystroke(&text);
                }
            }
            RaceEvent::Quit => break,
            RaceEvent::Tick => {}
        }

        let now = Instant::now();
        for (player, game) in games.iter_mut().enumerate() {
            game.advance(now);
            if let Some(waited) = game.waiting_for(now) {
                if waited > PEER_SETUP_LIMIT {
                    return Err("host never sent race content".into());
                }
            }
            for event in game.drain_events() {
                debug!("player {}: {:?}", player, event);
                if let SessionEvent::Started { .. } = event {
                    spawn_typist(
                        Typist {
                            player,
                            wpm: speeds[player],
                            accuracy: cli.accuracy,
                            seed: rng.gen(),
                        },
                        game.session().sentences.clone(),
                        tx.clone(),
                    );
                }
            }
        }
    }
    // typists stop on their next send once the receiver is gone
    drop(runner);
    drop(tx);

    // let the FINISH frames land before reporting
    let now = Instant::now();
    for game in games.iter_mut() {
        game.advance(now);
    }

    let report = match games.as_slice() {
        [solo] => player_report(solo)?,
        [host, client] => serde_json::json!({
            "host": player_report(host)?,
            "client": player_report(client)?,
        }),
        _ => Value::Null,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    for game in games.iter_mut() {
        game.reset();
    }
    Ok(())
}

/// The analysis plus the most-missed keys and chart extents.
fn player_report(game: &GameSession) -> Result<Value, serde_json::Error> {
    let Some(analysis) = game.analysis() else {
        return Ok(Value::Null);
    };
    let mut report = serde_json::to_value(analysis)?;
    if let Value::Object(fields) = &mut report {
        let (x_max, y_max) = analysis.chart_bounds();
        fields.insert(
            "top_errors".into(),
            serde_json::to_value(analysis.top_errors(TOP_ERRORS))?,
        );
        fields.insert(
            "chart_bounds".into(),
            serde_json::json!({ "seconds": x_max, "wpm": y_max }),
        );
    }
    Ok(report)
}

/// Pumps both ends until the host sees its peer.
fn wait_for_peer(games: &mut [GameSession]) -> Result<(), Box<dyn Error>> {
    let started = Instant::now();
    loop {
        let now = Instant::now();
        for game in games.iter_mut() {
            game.advance(now);
        }
        match games[0].lobby() {
            Some(Lobby::WaitingForPeer) => {}
            _ => return Ok(()),
        }
        if now.duration_since(started) > PEER_SETUP_LIMIT {
            return Err("no peer connected".into());
        }
        thread::sleep(Duration::from_millis(POLL_RATE_MS));
    }
}

struct Typist {
    player: usize,
    wpm: u32,
    accuracy: u32,
    seed: u64,
}

/// Feeds input-field contents for `player` at roughly `wpm`, fumbling and
/// correcting a key now and then. Stops once the receiver is gone.
fn spawn_typist(
    typist: Typist,
    sentences: Vec<String>,
    tx: Sender<RaceEvent>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut rng = StdRng::seed_from_u64(typist.seed);
        let per_char = Duration::from_secs_f64(60.0 / (typist.wpm.max(1) as f64 * 5.0));
        let send = |text: &str| {
            tx.send(RaceEvent::Input {
                player: typist.player,
                text: text.to_string(),
            })
            .is_ok()
        };

        for sentence in sentences.iter().cycle() {
            let mut buffer = String::new();
            for c in sentence.chars() {
                thread::sleep(per_char);
                if rng.gen_range(0..100) >= typist.accuracy {
                    let wrong = rng.gen_range(b'a'..=b'z') as char;
                    let wrong = if wrong == c { '#' } else { wrong };
                    if !send(&format!("{buffer}{wrong}")) {
                        return;
                    }
                    thread::sleep(per_char);
                    if !send(&buffer) {
                        return;
                    }
                }
                buffer.push(c);
                if !send(&buffer) {
                    return;
                }
            }
        }
    })
}
