use anyhow::Result;

pub mod yahtzee;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

// A game state for sequential games with named players sharing one device.
// Players take turns in a fixed order until every one of them is done.
pub trait GameState: Sized {
    type Error;

    fn new(player_names: &[String]) -> std::result::Result<Self, Self::Error>;

    // Tell if the current player has stopped rolling and has to settle the
    // turn. The game might still go on after that.
    fn is_turn_over(&self) -> bool;

    // Tell if the game is over. Also see `is_turn_over`.
    fn is_game_over(&self) -> bool;
}
