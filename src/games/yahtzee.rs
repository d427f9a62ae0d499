use super::{GameState, Validate};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use anyhow::anyhow;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod scoring;

pub use scoring::calculate_score;

pub const N_DICE: usize = 5;
pub const MIN_PLAYERS: usize = 1;
pub const MAX_PLAYERS: usize = 6;
pub const ROLLS_PER_TURN: u8 = 3;
pub const MAX_MANUAL_SCORE: u32 = 300;
pub const UPPER_BONUS_THRESHOLD: u32 = 63;
pub const UPPER_BONUS: u32 = 35;

/// Die faces of the current roll, `None` until a die has been rolled.
pub type Dice = [Option<u8>; N_DICE];
pub type Held = [bool; N_DICE];

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Ones,
    Twos,
    Threes,
    Fours,
    Fives,
    Sixes,
    ThreeOfKind,
    FourOfKind,
    FullHouse,
    SmallStraight,
    LargeStraight,
    FiveOfAKind,
    Chance,
}

// Scorecard order, upper section first
pub const CATEGORIES: [Category; 13] = [
    Category::Ones,
    Category::Twos,
    Category::Threes,
    Category::Fours,
    Category::Fives,
    Category::Sixes,
    Category::ThreeOfKind,
    Category::FourOfKind,
    Category::FullHouse,
    Category::SmallStraight,
    Category::LargeStraight,
    Category::FiveOfAKind,
    Category::Chance,
];

impl Category {
    // Face value counted by an upper category
    pub fn face(self) -> Option<u8> {
        match self {
            Self::Ones => Some(1),
            Self::Twos => Some(2),
            Self::Threes => Some(3),
            Self::Fours => Some(4),
            Self::Fives => Some(5),
            Self::Sixes => Some(6),
            _ => None,
        }
    }

    pub fn is_upper(self) -> bool {
        self.face().is_some()
    }

    pub fn short_label(self) -> &'static str {
        match self {
            Self::Ones => "1s",
            Self::Twos => "2s",
            Self::Threes => "3s",
            Self::Fours => "4s",
            Self::Fives => "5s",
            Self::Sixes => "6s",
            Self::ThreeOfKind => "3 Kind",
            Self::FourOfKind => "4 Kind",
            Self::FullHouse => "Full House",
            Self::SmallStraight => "Sm. Straight",
            Self::LargeStraight => "Lg. Straight",
            Self::FiveOfAKind => "5 Kind",
            Self::Chance => "Chance",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ones => "Ones",
            Self::Twos => "Twos",
            Self::Threes => "Threes",
            Self::Fours => "Fours",
            Self::Fives => "Fives",
            Self::Sixes => "Sixes",
            Self::ThreeOfKind => "Three of a Kind",
            Self::FourOfKind => "Four of a Kind",
            Self::FullHouse => "Full House (25)",
            Self::SmallStraight => "Small Straight (30)",
            Self::LargeStraight => "Large Straight (40)",
            Self::FiveOfAKind => "Five of a Kind (50)",
            Self::Chance => "Chance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnPhase {
    Roll,
    SelectCategory,
    GameOver,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Roll => "rolling",
            Self::SelectCategory => "choosing a category",
            Self::GameOver => "the game is over",
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Validation,
    IllegalTransition,
}

// Every error leaves the state exactly as it was before the call
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum GameError {
    #[error("a game needs 1 to 6 players, got {0}")]
    PlayerCount(usize),
    #[error("player {0} needs a name")]
    EmptyName(usize),
    #[error("the name {0:?} is already taken")]
    DuplicateName(String),
    #[error("there is no die {0}")]
    DieIndex(usize),
    #[error("{0:?} is not a score, enter a number between 0 and 300")]
    ManualScore(String),
    #[error("{0} has already been scored")]
    CategoryUsed(Category),
    #[error("roll the dice first")]
    IncompleteRoll,
    #[error("{action} is not possible while {phase}")]
    WrongPhase { action: &'static str, phase: TurnPhase },
    #[error("no rolls left, choose a category")]
    NoRollsLeft,
    #[error("all dice are held, release some dice or choose a category")]
    NothingToRoll,
    #[error("roll at least once first")]
    NotRolledYet,
    #[error("manual mode is on, enter the points by hand")]
    ManualModeOn,
    #[error("manual mode is off, pick a category to score the dice")]
    ManualModeOff,
    #[error("the game is over")]
    GameOver,
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PlayerCount(_)
            | Self::EmptyName(_)
            | Self::DuplicateName(_)
            | Self::DieIndex(_)
            | Self::ManualScore(_)
            | Self::CategoryUsed(_)
            | Self::IncompleteRoll => ErrorKind::Validation,
            _ => ErrorKind::IllegalTransition,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Player {
    name: String,
    scores: BTreeMap<Category, Option<u32>>,
    used: BTreeMap<Category, bool>,
}

impl Player {
    fn new(name: String) -> Self {
        Self {
            name,
            scores: CATEGORIES.iter().map(|&c| (c, None)).collect(),
            used: CATEGORIES.iter().map(|&c| (c, false)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn score(&self, category: Category) -> Option<u32> {
        self.scores.get(&category).copied().flatten()
    }

    pub fn is_used(&self, category: Category) -> bool {
        self.used.get(&category).copied().unwrap_or(false)
    }

    pub fn unused_categories(&self) -> impl Iterator<Item = Category> + '_ {
        CATEGORIES.into_iter().filter(|&c| !self.is_used(c))
    }

    pub fn has_used_all(&self) -> bool {
        CATEGORIES.iter().all(|&c| self.is_used(c))
    }

    // Scores are written once and never cleared
    fn assign(&mut self, category: Category, points: u32) -> Result<(), GameError> {
        if self.is_used(category) {
            return Err(GameError::CategoryUsed(category));
        }
        self.scores.insert(category, Some(points));
        self.used.insert(category, true);
        Ok(())
    }

    pub fn upper_sum(&self) -> u32 {
        CATEGORIES
            .iter()
            .filter(|c| c.is_upper())
            .filter_map(|&c| self.score(c))
            .sum()
    }

    pub fn bonus(&self) -> u32 {
        if self.upper_sum() >= UPPER_BONUS_THRESHOLD { UPPER_BONUS } else { 0 }
    }

    pub fn total(&self) -> u32 {
        CATEGORIES.iter().filter_map(|&c| self.score(c)).sum::<u32>() + self.bonus()
    }
}

impl Validate for Player {
    fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() || self.name.trim() != self.name {
            return Err(anyhow!("Player name {:?} is empty or untrimmed", self.name));
        }

        for category in CATEGORIES {
            match (self.score(category), self.is_used(category)) {
                (Some(points), true) if points > MAX_MANUAL_SCORE => {
                    return Err(anyhow!("{} has {} points for {}, above the maximum", self.name, points, category));
                },
                (Some(_), true) | (None, false) => {},
                (Some(_), false) => return Err(anyhow!("{} has a score for {} that is not marked used", self.name, category)),
                (None, true) => return Err(anyhow!("{} has {} marked used without a score", self.name, category)),
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    players: Vec<Player>,
    current_player: usize,
    dice: Dice,
    held: Held,
    rolls_left: u8,
    turn_phase: TurnPhase,
    game_over: bool,
    manual_mode_active: bool,
    #[serde(default)]
    timestamp: Option<String>,
}

impl State {
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn current_player(&self) -> usize {
        self.current_player
    }

    pub fn active_player(&self) -> &Player {
        &self.players[self.current_player]
    }

    pub fn dice(&self) -> &Dice {
        &self.dice
    }

    pub fn held(&self) -> &Held {
        &self.held
    }

    pub fn rolls_left(&self) -> u8 {
        self.rolls_left
    }

    pub fn turn_phase(&self) -> TurnPhase {
        self.turn_phase
    }

    pub fn manual_mode_active(&self) -> bool {
        self.manual_mode_active
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: Option<String>) {
        self.timestamp = timestamp;
    }

    pub fn player_names(&self) -> Vec<String> {
        self.players.iter().map(|p| p.name.clone()).collect()
    }

    fn has_rolled(&self) -> bool {
        self.rolls_left < ROLLS_PER_TURN
    }
}

// Trim names and check count, emptiness and case-insensitive uniqueness
fn validate_names(player_names: &[String]) -> Result<Vec<String>, GameError> {
    if player_names.len() < MIN_PLAYERS || player_names.len() > MAX_PLAYERS {
        return Err(GameError::PlayerCount(player_names.len()));
    }

    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(player_names.len());
    for (i, name) in player_names.iter().enumerate() {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(GameError::EmptyName(i + 1));
        }
        if !seen.insert(trimmed.to_lowercase()) {
            return Err(GameError::DuplicateName(trimmed.to_string()));
        }
        names.push(trimmed.to_string());
    }

    Ok(names)
}

impl GameState for State {
    type Error = GameError;

    // Fresh game with the first player about to roll
    fn new(player_names: &[String]) -> Result<Self, GameError> {
        let names = validate_names(player_names)?;
        log::info!("New game for {} player(s): {}", names.len(), names.join(", "));

        Ok(State {
            players: names.into_iter().map(Player::new).collect(),
            current_player: 0,
            dice: [None; N_DICE],
            held: [false; N_DICE],
            rolls_left: ROLLS_PER_TURN,
            turn_phase: TurnPhase::Roll,
            game_over: false,
            manual_mode_active: false,
            timestamp: None,
        })
    }

    fn is_turn_over(&self) -> bool {
        self.turn_phase == TurnPhase::SelectCategory
    }

    fn is_game_over(&self) -> bool {
        self.game_over
    }
}

impl Validate for State {
    fn validate(&self) -> anyhow::Result<()> {
        let n_players = self.players.len();
        if n_players < MIN_PLAYERS || n_players > MAX_PLAYERS {
            return Err(anyhow!("Number of players ({}) outside the bound [{}, {}]", n_players, MIN_PLAYERS, MAX_PLAYERS));
        }

        validate_names(&self.player_names()).map_err(|e| anyhow!("Invalid player names: {}", e))?;
        for player in &self.players {
            player.validate()?;
        }

        if self.current_player >= n_players {
            return Err(anyhow!("Current player {} out of range", self.current_player));
        }
        if self.rolls_left > ROLLS_PER_TURN {
            return Err(anyhow!("{} rolls left, at most {} allowed", self.rolls_left, ROLLS_PER_TURN));
        }
        if let Some(face) = self.dice.iter().flatten().find(|&&f| !(1..=6).contains(&f)) {
            return Err(anyhow!("Die shows {}, outside 1 to 6", face));
        }

        let finished = self.players.iter().all(|p| p.has_used_all());
        if self.game_over != (self.turn_phase == TurnPhase::GameOver) || self.game_over != finished {
            return Err(anyhow!("Game over flag disagrees with phase {:?} and scorecards", self.turn_phase));
        }

        if self.turn_phase == TurnPhase::Roll && !self.has_rolled()
            && (self.held.iter().any(|&h| h) || self.dice.iter().any(|d| d.is_some())) {
            return Err(anyhow!("Dice are set before the first roll of the turn"));
        }

        Ok(())
    }
}

fn ensure_phase(state: &State, phase: TurnPhase, action: &'static str) -> Result<(), GameError> {
    if state.game_over {
        return Err(GameError::GameOver);
    }
    if state.turn_phase != phase {
        return Err(GameError::WrongPhase { action, phase: state.turn_phase });
    }
    Ok(())
}

// Re-roll every die that is not held. Running out of rolls moves the turn on
// to category selection.
pub fn roll_dice<R: Rng + ?Sized>(state: &mut State, rng: &mut R) -> Result<(), GameError> {
    ensure_phase(state, TurnPhase::Roll, "rolling")?;
    if state.rolls_left == 0 {
        return Err(GameError::NoRollsLeft);
    }
    if state.has_rolled() && state.held.iter().all(|&h| h) {
        log::warn!("Rejected roll with all dice held, {} rolls left", state.rolls_left);
        return Err(GameError::NothingToRoll);
    }

    for (die, &held) in state.dice.iter_mut().zip(state.held.iter()) {
        if !held {
            *die = Some(rng.random_range(1..=6));
        }
    }
    state.rolls_left -= 1;
    log::debug!("{} rolled {:?}, {} rolls left", state.active_player().name, state.dice, state.rolls_left);

    if state.rolls_left == 0 {
        state.turn_phase = TurnPhase::SelectCategory;
    }
    Ok(())
}

// Flip the held flag of a die and return the new flag. Dice can only be held
// once they have been rolled.
pub fn toggle_hold(state: &mut State, die_idx: usize) -> Result<bool, GameError> {
    ensure_phase(state, TurnPhase::Roll, "holding dice")?;
    if die_idx >= N_DICE {
        return Err(GameError::DieIndex(die_idx));
    }
    if !state.has_rolled() {
        return Err(GameError::NotRolledYet);
    }

    state.held[die_idx] = !state.held[die_idx];
    Ok(state.held[die_idx])
}

// Stop rolling early and go on to category selection
pub fn end_turn(state: &mut State) -> Result<(), GameError> {
    ensure_phase(state, TurnPhase::Roll, "ending the turn")?;
    if !state.has_rolled() {
        return Err(GameError::NotRolledYet);
    }

    state.turn_phase = TurnPhase::SelectCategory;
    Ok(())
}

pub fn set_manual_mode(state: &mut State, active: bool) -> Result<(), GameError> {
    if state.game_over {
        return Err(GameError::GameOver);
    }
    state.manual_mode_active = active;
    Ok(())
}

// Score the current dice in the category for the current player and pass the
// turn on. Returns the points awarded.
pub fn choose_category(state: &mut State, category: Category) -> Result<u32, GameError> {
    ensure_phase(state, TurnPhase::SelectCategory, "choosing a category")?;
    if state.manual_mode_active {
        return Err(GameError::ManualModeOn);
    }
    if state.active_player().is_used(category) {
        return Err(GameError::CategoryUsed(category));
    }
    if state.dice.iter().any(|d| d.is_none()) {
        return Err(GameError::IncompleteRoll);
    }

    let points = calculate_score(category, &state.dice);
    apply_score(state, category, points)?;
    Ok(points)
}

// Parse operator input for manual mode
pub fn parse_manual_score(text: &str) -> Result<u32, GameError> {
    let trimmed = text.trim();
    match trimmed.parse::<i64>() {
        Ok(points) => check_manual_score(points),
        Err(_) => Err(GameError::ManualScore(trimmed.to_string())),
    }
}

fn check_manual_score(points: i64) -> Result<u32, GameError> {
    if (0..=MAX_MANUAL_SCORE as i64).contains(&points) {
        Ok(points as u32)
    } else {
        Err(GameError::ManualScore(points.to_string()))
    }
}

// Record operator entered points for the category, bypassing dice scoring
pub fn apply_manual_score(state: &mut State, category: Category, points: i64) -> Result<u32, GameError> {
    ensure_phase(state, TurnPhase::SelectCategory, "entering a score")?;
    if !state.manual_mode_active {
        return Err(GameError::ManualModeOff);
    }
    let points = check_manual_score(points)?;
    if state.active_player().is_used(category) {
        return Err(GameError::CategoryUsed(category));
    }

    apply_score(state, category, points)?;
    Ok(points)
}

fn apply_score(state: &mut State, category: Category, points: u32) -> Result<(), GameError> {
    let player = &mut state.players[state.current_player];
    player.assign(category, points)?;
    log::debug!("{} scored {} for {}", player.name, points, category);

    advance_turn(state);
    Ok(())
}

// End the game once every scorecard is full, otherwise hand fresh dice to the
// next player
fn advance_turn(state: &mut State) {
    if state.players.iter().all(|p| p.has_used_all()) {
        state.game_over = true;
        state.turn_phase = TurnPhase::GameOver;
        log::info!("Game over: {}", winner(state));
        return;
    }

    state.current_player = (state.current_player + 1) % state.players.len();
    state.rolls_left = ROLLS_PER_TURN;
    state.held = [false; N_DICE];
    state.dice = [None; N_DICE];
    state.turn_phase = TurnPhase::Roll;
}

// Hold every die showing the most frequent face, preferring higher faces
fn hold_most_common(state: &mut State) {
    let mut counts = [0u8; 7];
    for face in state.dice.iter().flatten() {
        counts[*face as usize] += 1;
    }
    let best = (1..=6u8).max_by_key(|&f| counts[f as usize]).unwrap_or(6);

    for (held, die) in state.held.iter_mut().zip(state.dice.iter()) {
        *held = *die == Some(best);
    }
}

// Unused category of the current player that scores the most with the current
// dice. Ties go to the earlier category on the scorecard.
fn best_category(state: &State) -> Option<Category> {
    state.active_player()
        .unused_categories()
        .min_by_key(|&c| std::cmp::Reverse(calculate_score(c, &state.dice)))
}

// A finished turn: the dice that were scored and where they went
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Turn {
    pub dice: Dice,
    pub category: Category,
    pub points: u32,
}

// Play a whole turn chasing the most frequent face, then take the category
// with the highest immediate score.
pub fn play_greedy<R: Rng + ?Sized>(state: &mut State, rng: &mut R) -> Result<Turn, GameError> {
    roll_dice(state, rng)?;

    while state.turn_phase == TurnPhase::Roll {
        hold_most_common(state);
        if state.held.iter().all(|&h| h) {
            end_turn(state)?;
        } else {
            roll_dice(state, rng)?;
        }
    }

    let category = best_category(state).ok_or(GameError::GameOver)?;
    let dice = state.dice;
    let points = choose_category(state, category)?;
    Ok(Turn { dice, category, points })
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Standing {
    pub name: String,
    pub total: u32,
}

// Players with their totals, best first. Equal totals keep seating order.
pub fn standings(state: &State) -> Vec<Standing> {
    let mut standings: Vec<Standing> = state.players
        .iter()
        .map(|p| Standing { name: p.name.clone(), total: p.total() })
        .collect();
    standings.sort_by(|a, b| b.total.cmp(&a.total));
    standings
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    Winner { name: String, total: u32 },
    Tie { names: Vec<String>, total: u32 },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Winner { name, total } => write!(f, "{} wins with {} points!", name, total),
            Self::Tie { names, total } => write!(f, "Tie at {} points ({}).", total, names.join(", ")),
        }
    }
}

pub fn winner(state: &State) -> Outcome {
    let standings = standings(state);
    let top = standings.first().map(|s| s.total).unwrap_or(0);
    let mut leaders: Vec<String> = standings
        .into_iter()
        .filter(|s| s.total == top)
        .map(|s| s.name)
        .collect();

    if leaders.len() == 1 {
        Outcome::Winner { name: leaders.remove(0), total: top }
    } else {
        Outcome::Tie { names: leaders, total: top }
    }
}
