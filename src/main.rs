use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use crossterm::event::{self, Event, KeyEventKind};
use games::yahtzee::{self, Category, Outcome};
use games::{GameState, Validate};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use storage::{FileStorage, MemoryStorage, SaveStore, Storage};
use tui::InteractiveApp;

mod games;
mod storage;
mod tui;
mod view;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(ClapArgs)]
struct StoreArgs {
    /// Directory holding saved games
    #[arg(long, env = "ROLLSCORE_DIR", default_value = ".rollscore")]
    store_dir: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a game in the terminal
    Play {
        #[command(flatten)]
        store: StoreArgs,
        /// Keep saved games in memory only, for this session
        #[arg(long)]
        ephemeral: bool,
        /// Player names in seating order (1 to 6)
        names: Vec<String>,
    },
    /// Inspect saved games
    Saves {
        #[command(flatten)]
        store: StoreArgs,
        #[command(subcommand)]
        action: SavesCommand,
    },
    /// Let greedy players play against each other
    Simulate {
        #[arg(short)]
        log_file: PathBuf,
        #[arg(long, default_value_t = 2)]
        players: usize,
        #[arg(long, default_value_t = 100)]
        games: usize,
    },
}

#[derive(Subcommand)]
enum SavesCommand {
    List,
    Delete { index: usize },
}

// One turn in the simulation log, the state is serialized JSON
#[derive(Debug, Clone, serde::Serialize)]
struct PlayLogTurn {
    game_id: usize,
    turn_id: usize,
    player_id: usize,
    dice: Vec<u8>,
    category: Category,
    score: u32,
    state: String,
}

type PlayLog = Vec<PlayLogTurn>;

fn write_play_log(play_log: &PlayLog, file: &PathBuf) -> Result<()> {
    let file = File::create(file)?;
    let mut writer = BufWriter::new(file);
    for item in play_log {
        jsonl::write(&mut writer, item).map_err(|e| anyhow!("Could not write play log: {:?}", e))?;
    }
    writer.flush()?;
    Ok(())
}

// Winner index per game, None for tied games
fn report(game_log: &[Option<usize>], n_players: usize) {
    let mut win_counts: HashMap<usize, usize> = HashMap::from_iter((0..n_players).map(|i| (i, 0)));
    let total_games = game_log.len();

    for winner in game_log.iter().flatten() {
        if let Some(count) = win_counts.get_mut(winner) {
            *count += 1;
        }
    }

    for i in 0..n_players {
        println!("Win Count for P{}: {}/{}, ratio: {}", i, win_counts[&i], total_games, (win_counts[&i] as f64 / total_games as f64));
    }
    println!("Ties: {}", game_log.iter().filter(|w| w.is_none()).count());
}

fn simulate(log_file: &PathBuf, n_players: usize, n_sims: usize) -> Result<()> {
    let names: Vec<String> = (0..n_players).map(|i| format!("P{}", i)).collect();
    // Fail early on bad arguments instead of in every game
    if n_sims == 0 {
        return Err(anyhow!("Number of games must be at least 1"));
    }
    yahtzee::State::new(&names)?;

    log::info!("Running {} simulations for {} players", n_sims, n_players);

    let play_log: Arc<Mutex<PlayLog>> = Arc::new(Mutex::new(Vec::new()));

    let game_log: Vec<Option<usize>> = (0..n_sims).into_par_iter().map(|game_id| -> Result<Option<usize>> {
        let mut rng = rand::rng();
        let mut state = yahtzee::State::new(&names)?;
        let mut turns = Vec::new();

        let mut turn_id = 0;
        while !state.is_game_over() {
            let player_id = state.current_player();
            let turn = yahtzee::play_greedy(&mut state, &mut rng)?;

            turns.push(PlayLogTurn {
                game_id,
                turn_id,
                player_id,
                dice: turn.dice.iter().flatten().copied().collect(),
                category: turn.category,
                score: turn.points,
                state: serde_json::to_string(&state)?,
            });
            turn_id += 1;
        }
        state.validate()?;

        for player in state.players() {
            log::debug!("Final score {}: {}", player.name(), player.total());
        }
        let outcome = yahtzee::winner(&state);
        log::info!("Game {}: {}", game_id, outcome);

        play_log.lock().map_err(|_| anyhow!("Play log lock poisoned"))?.extend(turns);
        Ok(match outcome {
            Outcome::Winner { name, .. } => names.iter().position(|n| *n == name),
            Outcome::Tie { .. } => None,
        })
    }).collect::<Result<_>>()?;

    report(&game_log, n_players);
    let play_log = play_log.lock().map_err(|_| anyhow!("Play log lock poisoned"))?;
    write_play_log(&play_log, log_file)
}

fn open_storage(store: &StoreArgs, ephemeral: bool) -> Box<dyn Storage> {
    if ephemeral {
        Box::new(MemoryStorage::default())
    } else {
        Box::new(FileStorage::new(&store.store_dir))
    }
}

fn run_interactive(names: Vec<String>, storage: Box<dyn Storage>) -> Result<()> {
    let names = if names.is_empty() {
        vec!["Player 1".to_string(), "Player 2".to_string()]
    } else {
        names
    };
    let state = yahtzee::State::new(&names)?;

    color_eyre::install().map_err(|e| anyhow!("{}", e))?;
    let mut terminal = ratatui::init();
    let mut app = InteractiveApp::new(state, SaveStore::new(storage));

    let result = loop {
        if let Err(err) = terminal.draw(|frame| frame.render_widget(app.screen(), frame.area())) {
            break Err(err.into());
        }

        match event::read() {
            Ok(Event::Key(key_event)) if key_event.kind == KeyEventKind::Press => {
                if app.handle_key(key_event.code) {
                    break Ok(());
                }
            },
            Ok(_) => {},
            Err(err) => break Err(err.into()),
        }
    };

    ratatui::restore();
    result
}

fn run_saves(store: &StoreArgs, action: SavesCommand) -> Result<()> {
    let mut saves = SaveStore::new(FileStorage::new(&store.store_dir));

    let entries = match action {
        SavesCommand::List => saves.list()?,
        SavesCommand::Delete { index } => saves.delete(index)?,
    };

    if entries.is_empty() {
        println!("No saved games in {}", store.store_dir.display());
    }
    for entry in entries {
        let id = entry.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        println!("{:>3}  {}  [{}]", entry.index, entry.label, id);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.commands {
        Commands::Play { store, ephemeral, names } => run_interactive(names, open_storage(&store, ephemeral)),
        Commands::Saves { store, action } => run_saves(&store, action),
        Commands::Simulate { log_file, players, games } => simulate(&log_file, players, games),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_simulate_rejects_bad_arguments() {
        let dir = TempDir::new().unwrap();
        let log_file = dir.path().join("play.jsonl");

        assert!(simulate(&log_file, 2, 0).is_err());
        assert!(simulate(&log_file, 7, 1).is_err());
        assert!(!log_file.exists());
    }

    #[test]
    fn test_simulate_writes_every_turn() {
        let dir = TempDir::new().unwrap();
        let log_file = dir.path().join("play.jsonl");

        simulate(&log_file, 2, 3).unwrap();
        let lines = std::fs::read_to_string(&log_file).unwrap().lines().count();
        assert_eq!(lines, 3 * 2 * 13);
    }
}
