//! Read-only projection of a game into what a scoreboard screen shows. The
//! renderer only ever looks at this, never at the game state itself.

use crate::games::yahtzee::{winner, Category, Outcome, State, TurnPhase, CATEGORIES, N_DICE, ROLLS_PER_TURN};
use crate::games::GameState;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RowKind {
    Category(Category),
    UpperSum,
    Bonus,
    Total,
}

impl RowKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Category(category) => category.short_label(),
            Self::UpperSum => "Upper Sum",
            Self::Bonus => "Bonus",
            Self::Total => "Total",
        }
    }

    pub fn is_computed(self) -> bool {
        !matches!(self, Self::Category(_))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cell {
    pub text: String,
    pub used: bool,
    pub selectable: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScoreRow {
    pub kind: RowKind,
    pub cells: Vec<Cell>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DieView {
    pub face: Option<u8>,
    pub held: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScoreboardView {
    pub players: Vec<String>,
    pub current_player: usize,
    pub dice: [DieView; N_DICE],
    pub rolls_left: u8,
    pub phase: TurnPhase,
    pub manual_mode: bool,
    pub can_roll: bool,
    pub can_hold: bool,
    pub can_end_turn: bool,
    pub rows: Vec<ScoreRow>,
    // Categories the current player may pick right now, in scorecard order
    pub choices: Vec<Category>,
    pub prompt: String,
    pub outcome: Option<Outcome>,
}

// Upper categories, their sum and bonus, then the lower section and the total
fn row_order() -> Vec<RowKind> {
    let mut rows: Vec<RowKind> = CATEGORIES[..6].iter().map(|&c| RowKind::Category(c)).collect();
    rows.push(RowKind::UpperSum);
    rows.push(RowKind::Bonus);
    rows.extend(CATEGORIES[6..].iter().map(|&c| RowKind::Category(c)));
    rows.push(RowKind::Total);
    rows
}

fn prompt(state: &State) -> String {
    let name = state.active_player().name();
    match state.turn_phase() {
        TurnPhase::GameOver => winner(state).to_string(),
        TurnPhase::Roll if state.rolls_left() == ROLLS_PER_TURN => format!("{}'s turn. Roll the dice.", name),
        TurnPhase::Roll => format!("{}: {} rolls left.", name, state.rolls_left()),
        TurnPhase::SelectCategory if state.manual_mode_active() => {
            format!("{}: choose a category and enter the points.", name)
        },
        TurnPhase::SelectCategory => format!("{}: choose a category.", name),
    }
}

pub fn project(state: &State) -> ScoreboardView {
    let phase = state.turn_phase();
    let selecting = state.is_turn_over();
    let rolled = state.rolls_left() < ROLLS_PER_TURN;

    let rows = row_order()
        .into_iter()
        .map(|kind| ScoreRow {
            kind,
            cells: state.players()
                .iter()
                .enumerate()
                .map(|(i, player)| match kind {
                    RowKind::Category(category) => Cell {
                        text: player.score(category).map(|s| s.to_string()).unwrap_or_default(),
                        used: player.is_used(category),
                        selectable: selecting && i == state.current_player() && !player.is_used(category),
                    },
                    RowKind::UpperSum => computed(player.upper_sum()),
                    RowKind::Bonus => computed(player.bonus()),
                    RowKind::Total => computed(player.total()),
                })
                .collect(),
        })
        .collect();

    let mut dice = [DieView { face: None, held: false }; N_DICE];
    for (i, die) in dice.iter_mut().enumerate() {
        die.face = state.dice()[i];
        die.held = state.held()[i];
    }

    ScoreboardView {
        players: state.player_names(),
        current_player: state.current_player(),
        dice,
        rolls_left: state.rolls_left(),
        phase,
        manual_mode: state.manual_mode_active(),
        can_roll: phase == TurnPhase::Roll && state.rolls_left() > 0,
        can_hold: phase == TurnPhase::Roll && rolled,
        can_end_turn: phase == TurnPhase::Roll && rolled,
        rows,
        choices: if selecting { state.active_player().unused_categories().collect() } else { Vec::new() },
        prompt: prompt(state),
        outcome: if state.is_game_over() { Some(winner(state)) } else { None },
    }
}

fn computed(points: u32) -> Cell {
    Cell { text: points.to_string(), used: false, selectable: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::yahtzee::{apply_manual_score, choose_category, end_turn, roll_dice, set_manual_mode};
    use rand::{rngs::StdRng, SeedableRng};

    fn game() -> State {
        State::new(&["Ann".to_string(), "Bob".to_string()]).unwrap()
    }

    #[test]
    fn test_new_game_view() {
        let view = project(&game());

        assert_eq!(view.players, vec!["Ann".to_string(), "Bob".to_string()]);
        assert_eq!(view.rows.len(), 16);
        assert_eq!(view.rows[6].kind, RowKind::UpperSum);
        assert_eq!(view.rows[7].kind, RowKind::Bonus);
        assert_eq!(view.rows[15].kind, RowKind::Total);
        assert_eq!(view.rows[0].cells[0].text, "");
        assert_eq!(view.rows[15].cells[1].text, "0");
        assert!(view.can_roll && !view.can_hold && !view.can_end_turn);
        assert!(view.choices.is_empty());
        assert_eq!(view.prompt, "Ann's turn. Roll the dice.");
        assert_eq!(view.outcome, None);
    }

    #[test]
    fn test_selection_view_marks_open_categories() {
        let mut state = game();
        let mut rng = StdRng::seed_from_u64(11);
        roll_dice(&mut state, &mut rng).unwrap();
        end_turn(&mut state).unwrap();
        let points = choose_category(&mut state, Category::Chance).unwrap();
        roll_dice(&mut state, &mut rng).unwrap();
        end_turn(&mut state).unwrap();

        let view = project(&state);
        assert_eq!(view.current_player, 1);
        assert_eq!(view.choices.len(), 13);
        assert_eq!(view.prompt, "Bob: choose a category.");

        let chance = view.rows.iter().find(|r| r.kind == RowKind::Category(Category::Chance)).unwrap();
        assert_eq!(chance.cells[0].text, points.to_string());
        assert!(chance.cells[0].used && !chance.cells[0].selectable);
        assert!(chance.cells[1].selectable);
        assert_eq!(view.rows[15].cells[0].text, points.to_string());
        assert!(view.dice.iter().all(|d| d.face.is_some() && !d.held));
    }

    #[test]
    fn test_finished_game_view() {
        let mut state = State::new(&["Ann".to_string()]).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        set_manual_mode(&mut state, true).unwrap();
        for category in CATEGORIES {
            roll_dice(&mut state, &mut rng).unwrap();
            end_turn(&mut state).unwrap();
            apply_manual_score(&mut state, category, 5).unwrap();
        }

        let view = project(&state);
        assert_eq!(view.phase, TurnPhase::GameOver);
        assert!(!view.can_roll && !view.can_hold && !view.can_end_turn);
        assert!(view.choices.is_empty());
        assert_eq!(view.outcome, Some(Outcome::Winner { name: "Ann".to_string(), total: 65 }));
        assert_eq!(view.prompt, "Ann wins with 65 points!");
        assert!(view.rows.iter().filter(|r| !r.kind.is_computed()).all(|r| r.cells[0].used));
        assert_eq!(view.rows[6].cells[0].text, "30");
        assert_eq!(view.rows[7].cells[0].text, "0");
    }
}
