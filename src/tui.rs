use crossterm::event::KeyCode;
use rand::rngs::ThreadRng;
use ratatui::layout::{Constraint, Direction, Flex, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use ratatui::widgets::{BorderType, Clear, HighlightSpacing, List, ListState, Row, StatefulWidget, Table};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Stylize,
    symbols::border,
    text::{Line, Text},
    widgets::{Block, Paragraph, Widget},
};

use crate::games::yahtzee::{self, Category, GameError, State, TurnPhase};
use crate::games::GameState;
use crate::storage::{SaveStore, SnapshotEntry, Storage, StorageError};
use crate::view::{self, DieView, RowKind, ScoreboardView};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    pub text: String,
    pub is_error: bool,
}

impl Message {
    fn info(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: false }
    }

    fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: true }
    }
}

// What the keyboard currently drives
#[derive(Clone, Debug)]
pub enum Mode {
    Play,
    ManualEntry {
        category: Category,
        input: String,
        error: Option<String>,
    },
    Saves {
        entries: Vec<SnapshotEntry>,
        selected: ListState,
    },
}

pub struct InteractiveApp<S: Storage> {
    pub state: State,
    pub mode: Mode,
    pub choice_state: ListState,
    pub message: Option<Message>,
    store: SaveStore<S>,
    rng: ThreadRng,
}

// Everything needed to draw one frame
#[derive(Clone)]
pub struct Screen {
    pub view: ScoreboardView,
    pub mode: Mode,
    pub choice: Option<Category>,
    pub message: Option<Message>,
}

impl<S: Storage> InteractiveApp<S> {
    pub fn new(state: State, store: SaveStore<S>) -> Self {
        let mut app = Self {
            state,
            mode: Mode::Play,
            choice_state: ListState::default(),
            message: None,
            store,
            rng: rand::rng(),
        };
        app.sync_choice();
        app
    }

    pub fn screen(&self) -> Screen {
        Screen {
            view: view::project(&self.state),
            mode: self.mode.clone(),
            choice: self.selected_choice(),
            message: self.message.clone(),
        }
    }

    fn choices(&self) -> Vec<Category> {
        view::project(&self.state).choices
    }

    fn selected_choice(&self) -> Option<Category> {
        self.choice_state.selected().and_then(|i| self.choices().get(i).copied())
    }

    // Keep the category cursor on an open category of the current player
    fn sync_choice(&mut self) {
        let n_choices = self.choices().len();
        match self.choice_state.selected() {
            _ if n_choices == 0 => self.choice_state.select(None),
            Some(i) if i < n_choices => {},
            _ => self.choice_state.select_first(),
        }
    }

    fn game_error(&mut self, err: GameError) {
        log::warn!("Rejected action ({:?}): {}", err.kind(), err);
        self.message = Some(Message::error(err.to_string()));
    }

    fn storage_error(&mut self, err: StorageError) {
        log::error!("Saved games: {}", err);
        let text = match err {
            StorageError::Corrupt(_) => "Saved games are unreadable, the next save starts a fresh list.".to_string(),
            err => err.to_string(),
        };
        self.message = Some(Message::error(text));
    }

    // Handle one key press. Returns true once the user wants to quit.
    pub fn handle_key(&mut self, key: KeyCode) -> bool {
        let quit = match self.mode {
            Mode::Play => self.handle_play_key(key),
            Mode::ManualEntry { .. } => {
                self.handle_manual_key(key);
                false
            },
            Mode::Saves { .. } => {
                self.handle_saves_key(key);
                false
            },
        };
        self.sync_choice();
        quit
    }

    fn handle_play_key(&mut self, key: KeyCode) -> bool {
        let result = match key {
            KeyCode::Char('q') => return true,
            KeyCode::Char('r') => yahtzee::roll_dice(&mut self.state, &mut self.rng),
            KeyCode::Char(c @ '1'..='5') => {
                let die = c as usize - '1' as usize;
                yahtzee::toggle_hold(&mut self.state, die).map(|_| ())
            },
            KeyCode::Char('e') => yahtzee::end_turn(&mut self.state),
            KeyCode::Char('m') => {
                let active = !self.state.manual_mode_active();
                yahtzee::set_manual_mode(&mut self.state, active)
            },
            KeyCode::Down => {
                if let Some(i) = self.choice_state.selected() {
                    if i + 1 < self.choices().len() {
                        self.choice_state.select_next();
                    }
                }
                return false;
            },
            KeyCode::Up => {
                self.choice_state.select_previous();
                return false;
            },
            KeyCode::Enter => {
                self.pick_choice();
                return false;
            },
            KeyCode::Char('s') => {
                if self.state.is_game_over() {
                    self.game_error(GameError::GameOver);
                    return false;
                }
                match self.store.save(&self.state) {
                    Ok(_) => self.message = Some(Message::info("Game saved.")),
                    Err(err) => self.storage_error(err),
                }
                return false;
            },
            KeyCode::Char('l') => {
                self.open_saves();
                return false;
            },
            KeyCode::Char('n') => {
                match State::new(&self.state.player_names()) {
                    Ok(state) => {
                        self.state = state;
                        self.message = Some(Message::info("New game started."));
                    },
                    Err(err) => self.game_error(err),
                }
                return false;
            },
            _ => return false,
        };

        match result {
            Ok(()) => self.message = None,
            Err(err) => self.game_error(err),
        }
        false
    }

    fn pick_choice(&mut self) {
        match self.state.turn_phase() {
            TurnPhase::GameOver => {
                self.game_error(GameError::GameOver);
                return;
            },
            TurnPhase::Roll => {
                self.message = Some(Message::error("Finish rolling first."));
                return;
            },
            TurnPhase::SelectCategory => {},
        }
        let Some(category) = self.selected_choice() else {
            return;
        };

        if self.state.manual_mode_active() {
            self.mode = Mode::ManualEntry { category, input: String::new(), error: None };
            return;
        }

        let name = self.state.active_player().name().to_string();
        match yahtzee::choose_category(&mut self.state, category) {
            Ok(points) => {
                self.message = Some(Message::info(format!("{}: {} points for {}.", name, points, category)));
            },
            Err(err) => self.game_error(err),
        }
    }

    fn handle_manual_key(&mut self, key: KeyCode) {
        let Mode::ManualEntry { category, input, error } = &mut self.mode else {
            return;
        };
        let category = *category;

        match key {
            KeyCode::Esc => {
                self.mode = Mode::Play;
                let name = self.state.active_player().name();
                self.message = Some(Message::info(format!("{}: manual entry cancelled.", name)));
            },
            KeyCode::Backspace => {
                input.pop();
                *error = None;
            },
            KeyCode::Char(c) if c.is_ascii_digit() || c == '-' => {
                if input.len() < 4 {
                    input.push(c);
                }
                *error = None;
            },
            KeyCode::Enter => {
                let points = match yahtzee::parse_manual_score(input) {
                    Ok(points) => points,
                    Err(err) => {
                        *error = Some(err.to_string());
                        return;
                    },
                };

                let name = self.state.active_player().name().to_string();
                self.mode = Mode::Play;
                match yahtzee::apply_manual_score(&mut self.state, category, points as i64) {
                    Ok(points) => {
                        self.message = Some(Message::info(format!("{}: manually {} points for {}.", name, points, category)));
                    },
                    Err(err) => self.game_error(err),
                }
            },
            _ => {},
        }
    }

    fn open_saves(&mut self) {
        match self.store.list() {
            Ok(entries) => {
                let mut selected = ListState::default();
                if !entries.is_empty() {
                    selected.select_first();
                }
                self.mode = Mode::Saves { entries, selected };
            },
            Err(err) => self.storage_error(err),
        }
    }

    fn handle_saves_key(&mut self, key: KeyCode) {
        let Mode::Saves { entries, selected } = &mut self.mode else {
            return;
        };

        match key {
            KeyCode::Esc | KeyCode::Char('q') => self.mode = Mode::Play,
            KeyCode::Down => {
                if let Some(i) = selected.selected() {
                    if i + 1 < entries.len() {
                        selected.select_next();
                    }
                }
            },
            KeyCode::Up => selected.select_previous(),
            KeyCode::Enter => {
                let Some(entry) = selected.selected().and_then(|i| entries.get(i)).cloned() else {
                    self.message = Some(Message::error("Select a saved game first."));
                    return;
                };
                let loaded = match entry.id {
                    Some(id) => self.store.load_by_id(id),
                    None => self.store.load(entry.index),
                };

                match loaded {
                    Ok(state) => {
                        let info = format!("Loaded game from {}.", state.timestamp().unwrap_or("an unknown date"));
                        self.state = state;
                        self.choice_state = ListState::default();
                        self.mode = Mode::Play;
                        self.message = Some(Message::info(info));
                    },
                    Err(err) => self.storage_error(err),
                }
            },
            KeyCode::Char('d') => {
                let Some(entry) = selected.selected().and_then(|i| entries.get(i)).cloned() else {
                    return;
                };
                let deleted = match entry.id {
                    Some(id) => self.store.delete_by_id(id),
                    None => self.store.delete(entry.index),
                };

                match deleted {
                    Ok(remaining) => {
                        let mut selected = ListState::default();
                        if !remaining.is_empty() {
                            selected.select_first();
                        }
                        self.mode = Mode::Saves { entries: remaining, selected };
                        self.message = Some(Message::info("Saved game deleted."));
                    },
                    Err(err) => self.storage_error(err),
                }
            },
            _ => {},
        }
    }
}

fn die_span(index: usize, die: &DieView) -> Span<'static> {
    let face = die.face.map(|f| f.to_string()).unwrap_or_else(|| "?".to_string());
    let text = format!(" {}:[{}] ", index + 1, face);
    if die.held {
        Span::styled(text, Style::default().fg(Color::Yellow)).add_modifier(Modifier::REVERSED)
    } else {
        Span::styled(text, Style::default())
    }
}

// Key hint for the help line, greyed out while the action is unavailable
fn key_hint(action: &'static str, key: &'static str, enabled: bool) -> [Span<'static>; 2] {
    if enabled {
        [Span::raw(action), Span::styled(key, Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD))]
    } else {
        let dim = Style::default().fg(Color::DarkGray);
        [Span::styled(action, dim), Span::styled(key, dim)]
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let vertical = Layout::vertical([Constraint::Percentage(height)]).flex(Flex::Center);
    let horizontal = Layout::horizontal([Constraint::Percentage(width)]).flex(Flex::Center);
    let [area] = vertical.areas(area);
    let [area] = horizontal.areas(area);
    area
}

impl Screen {
    fn render_scoreboard(&self, area: Rect, buf: &mut Buffer) {
        let view = &self.view;

        let mut header = vec![ratatui::widgets::Cell::from(" Category")];
        for (i, name) in view.players.iter().enumerate() {
            let cell = ratatui::widgets::Cell::from(name.clone());
            header.push(if i == view.current_player { cell.bold().blue() } else { cell });
        }

        let rows = view.rows.iter().map(|row| {
            let mut cells = vec![ratatui::widgets::Cell::from(format!(" {}", row.kind.label()))];
            for (i, cell) in row.cells.iter().enumerate() {
                let selected = i == view.current_player
                    && matches!(row.kind, RowKind::Category(c) if Some(c) == self.choice);
                let style = if selected {
                    Style::default().fg(Color::Blue).add_modifier(Modifier::REVERSED)
                } else if cell.selectable {
                    Style::default().fg(Color::Blue)
                } else if row.kind.is_computed() {
                    Style::default().add_modifier(Modifier::ITALIC)
                } else {
                    Style::default()
                };
                let (text, style) = match cell.text.is_empty() {
                    true if selected => ("→".to_string(), style),
                    true if !cell.used && !cell.selectable => ("·".to_string(), style.fg(Color::DarkGray)),
                    _ => (cell.text.clone(), style),
                };
                cells.push(ratatui::widgets::Cell::from(text).style(style));
            }
            Row::new(cells)
        });

        let mut widths = vec![Constraint::Length(14)];
        widths.extend(vec![Constraint::Length(12); view.players.len()]);

        let table = Table::new(rows, widths)
            .header(Row::new(header).add_modifier(Modifier::UNDERLINED))
            .column_spacing(1)
            .block(Block::bordered().title(Line::from(" Scoreboard ".bold())));

        Widget::render(table, area, buf);
    }

    fn render_manual_entry(&self, category: Category, input: &str, error: &Option<String>, area: Rect, buf: &mut Buffer) {
        let area = centered(area, 50, 30);
        Clear.render(area, buf);

        let mut lines = vec![
            Line::from(""),
            Line::from(format!("  Points for {} (0-300):", category)),
            Line::from(vec!["  > ".into(), Span::styled(input.to_string(), Style::default().add_modifier(Modifier::BOLD)), "_".into()]),
        ];
        if let Some(error) = error {
            lines.push(Line::from(Span::styled(format!("  {}", error), Style::default().fg(Color::Red))));
        }

        Paragraph::new(lines)
            .block(
                Block::bordered()
                    .border_type(BorderType::Thick)
                    .title(" Manual Entry ")
                    .title_bottom(Line::from(vec![" Confirm ".into(), "<RET> ".blue().bold(), " Cancel ".into(), "<esc> ".blue().bold()]).right_aligned()),
            )
            .render(area, buf);
    }

    fn render_saves(&self, entries: &[SnapshotEntry], selected: &ListState, area: Rect, buf: &mut Buffer) {
        let area = centered(area, 70, 60);
        Clear.render(area, buf);

        let block = Block::bordered()
            .border_type(BorderType::Thick)
            .title(" Saved Games ")
            .title_bottom(Line::from(vec![
                " Load ".into(),
                "<RET> ".blue().bold(),
                " Delete ".into(),
                "<d> ".blue().bold(),
                " Close ".into(),
                "<esc> ".blue().bold(),
            ]).right_aligned());

        if entries.is_empty() {
            Paragraph::new("\n  No saved games").block(block).render(area, buf);
            return;
        }

        let items = List::new(entries.iter().map(|e| Line::from(format!(" {}", e.label))))
            .block(block)
            .highlight_style(Style::default().add_modifier(Modifier::BOLD))
            .highlight_symbol(" →")
            .highlight_spacing(HighlightSpacing::Always);

        let mut selected = selected.clone();
        StatefulWidget::render(items, area, buf, &mut selected);
    }
}

impl Widget for Screen {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let view = &self.view;
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(4),
                Constraint::Min(20),
                Constraint::Length(4),
            ])
            .split(area);

        let status = match view.phase {
            TurnPhase::GameOver => Span::styled(" GAME OVER ", Style::default().fg(Color::Red)).bold().add_modifier(Modifier::SLOW_BLINK | Modifier::REVERSED),
            TurnPhase::Roll => Span::styled(" ROLL ", Style::default().fg(Color::Blue)).bold().add_modifier(Modifier::REVERSED),
            TurnPhase::SelectCategory => Span::styled(" SCORE ", Style::default().fg(Color::Green)).bold().add_modifier(Modifier::REVERSED),
        };

        let header_line = match &view.outcome {
            Some(outcome) => Line::from(vec![" ".into(), status, Span::styled(format!(" {}", outcome), Style::default().add_modifier(Modifier::BOLD))]),
            None => Line::from(vec![
                " ".into(),
                status,
                format!(" Players: {}, ", view.players.len()).into(),
                format!("Current: {}, ", view.players[view.current_player]).into(),
                format!("Rolls left: {}, ", view.rolls_left).into(),
                format!("Manual mode: {}", if view.manual_mode { "on" } else { "off" }).into(),
            ]),
        };
        let header_text = Text::from(vec![header_line]);

        Paragraph::new(header_text)
            .block(Block::bordered().border_set(border::THICK))
            .render(layout[0], buf);

        let dice_line = Line::from(
            std::iter::once(Span::raw(" "))
                .chain(view.dice.iter().enumerate().map(|(i, die)| die_span(i, die)))
                .collect::<Vec<_>>(),
        );
        Paragraph::new(vec![Line::from(""), dice_line])
            .block(Block::bordered().title(" Dice "))
            .render(layout[1], buf);

        self.render_scoreboard(layout[2], buf);

        let mut lines = vec![Line::from(Span::styled(format!(" {}", view.prompt), Style::default().add_modifier(Modifier::ITALIC)))];
        if let Some(message) = &self.message {
            let style = if message.is_error { Style::default().fg(Color::Red) } else { Style::default() };
            lines.push(Line::from(Span::styled(format!(" {}", message.text), style)));
        }

        let playing = view.outcome.is_none();
        let hints = [
            key_hint(" Roll ", "<r> ", view.can_roll),
            key_hint(" Hold ", "<1-5> ", view.can_hold),
            key_hint(" End Turn ", "<e> ", view.can_end_turn),
            key_hint(" Score ", "<RET> ", !view.choices.is_empty()),
            key_hint(" Manual ", "<m> ", playing),
            key_hint(" Save ", "<s> ", playing),
            key_hint(" Load ", "<l> ", true),
            key_hint(" New ", "<n> ", true),
            key_hint(" Quit ", "<q> ", true),
        ];
        let help = Block::bordered().title_bottom(Line::from(hints.into_iter().flatten().collect::<Vec<_>>()).right_aligned());
        Paragraph::new(lines).block(help).render(layout[3], buf);

        match &self.mode {
            Mode::Play => {},
            Mode::ManualEntry { category, input, error } => self.render_manual_entry(*category, input, error, area, buf),
            Mode::Saves { entries, selected } => self.render_saves(entries, selected, area, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::yahtzee::CATEGORIES;
    use crate::storage::MemoryStorage;
    use rand::{rngs::StdRng, SeedableRng};
    use std::io;

    // Every write fails, reads see nothing
    struct BrokenStorage;

    impl Storage for BrokenStorage {
        fn get(&self, _key: &str) -> io::Result<Option<String>> {
            Ok(None)
        }

        fn set(&mut self, _key: &str, _value: &str) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }

        fn remove(&mut self, _key: &str) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }
    }

    fn app() -> InteractiveApp<MemoryStorage> {
        let state = State::new(&["Ann".to_string(), "Bob".to_string()]).unwrap();
        InteractiveApp::new(state, SaveStore::new(MemoryStorage::default()))
    }

    fn press<S: Storage>(app: &mut InteractiveApp<S>, keys: &str) {
        for c in keys.chars() {
            assert!(!app.handle_key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn test_roll_then_score_first_choice() {
        let mut app = app();
        assert_eq!(app.choice_state.selected(), None);

        press(&mut app, "re");
        assert_eq!(app.state.turn_phase(), TurnPhase::SelectCategory);
        assert_eq!(app.selected_choice(), Some(Category::Ones));

        app.handle_key(KeyCode::Down);
        assert_eq!(app.selected_choice(), Some(Category::Twos));
        app.handle_key(KeyCode::Enter);

        assert!(app.state.players()[0].is_used(Category::Twos));
        assert_eq!(app.state.current_player(), 1);
        assert_eq!(app.choice_state.selected(), None);
        assert!(app.message.as_ref().is_some_and(|m| !m.is_error && m.text.starts_with("Ann: ")));
    }

    #[test]
    fn test_illegal_actions_show_errors() {
        let mut app = app();
        press(&mut app, "e");
        assert!(app.message.as_ref().is_some_and(|m| m.is_error));
        assert_eq!(app.state.rolls_left(), 3);

        press(&mut app, "r12345r");
        assert_eq!(app.message, Some(Message::error(GameError::NothingToRoll.to_string())));
        assert_eq!(app.state.rolls_left(), 2);
    }

    #[test]
    fn test_manual_entry_flow() {
        let mut app = app();
        press(&mut app, "mre");
        app.handle_key(KeyCode::Enter);
        assert!(matches!(app.mode, Mode::ManualEntry { category: Category::Ones, .. }));

        press(&mut app, "999");
        app.handle_key(KeyCode::Enter);
        assert!(matches!(&app.mode, Mode::ManualEntry { error: Some(_), .. }));
        assert!(!app.state.players()[0].is_used(Category::Ones));

        for _ in 0..3 {
            app.handle_key(KeyCode::Backspace);
        }
        press(&mut app, "4");
        app.handle_key(KeyCode::Enter);
        assert!(matches!(app.mode, Mode::Play));
        assert_eq!(app.state.players()[0].score(Category::Ones), Some(4));
    }

    #[test]
    fn test_save_load_and_delete_from_menu() {
        let mut app = app();
        press(&mut app, "r");
        let saved = app.state.clone();
        press(&mut app, "s");
        assert_eq!(app.message, Some(Message::info("Game saved.")));

        press(&mut app, "n");
        assert_eq!(app.state.rolls_left(), 3);

        press(&mut app, "l");
        assert!(matches!(&app.mode, Mode::Saves { entries, .. } if entries.len() == 1));
        app.handle_key(KeyCode::Enter);
        assert!(matches!(app.mode, Mode::Play));
        assert_eq!(app.state.dice(), saved.dice());
        assert_eq!(app.state.rolls_left(), 2);

        press(&mut app, "ld");
        assert!(matches!(&app.mode, Mode::Saves { entries, .. } if entries.is_empty()));
        app.handle_key(KeyCode::Esc);
        assert!(matches!(app.mode, Mode::Play));
    }

    #[test]
    fn test_screen_renders_without_panicking() {
        let mut app = app();
        press(&mut app, "rel");
        let area = Rect::new(0, 0, 120, 40);
        let mut buf = Buffer::empty(area);
        app.screen().render(area, &mut buf);

        let text: String = buf.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("Scoreboard"));
        assert!(text.contains("No saved games"));
    }

    // Score every category of a one player game by hand, one point each
    fn finished_app() -> InteractiveApp<MemoryStorage> {
        let state = State::new(&["Ann".to_string()]).unwrap();
        let mut app = InteractiveApp::new(state, SaveStore::new(MemoryStorage::default()));
        let mut rng = StdRng::seed_from_u64(5);
        yahtzee::set_manual_mode(&mut app.state, true).unwrap();
        for category in CATEGORIES {
            yahtzee::roll_dice(&mut app.state, &mut rng).unwrap();
            yahtzee::end_turn(&mut app.state).unwrap();
            yahtzee::apply_manual_score(&mut app.state, category, 1).unwrap();
        }
        assert!(app.state.is_game_over());
        app
    }

    #[test]
    fn test_finished_game_cannot_be_saved() {
        let mut app = finished_app();
        press(&mut app, "s");

        assert_eq!(app.message, Some(Message::error(GameError::GameOver.to_string())));
        assert!(app.store.list().unwrap().is_empty());
    }

    #[test]
    fn test_enter_after_game_over_reports_game_over() {
        let mut app = finished_app();
        app.handle_key(KeyCode::Enter);

        assert!(matches!(app.mode, Mode::Play));
        assert_eq!(app.message, Some(Message::error(GameError::GameOver.to_string())));
    }

    #[test]
    fn test_finished_game_shows_outcome() {
        let app = finished_app();
        let area = Rect::new(0, 0, 120, 40);
        let mut buf = Buffer::empty(area);
        app.screen().render(area, &mut buf);

        let text: String = buf.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("GAME OVER"));
        assert!(text.contains("Ann wins with 13 points!"));
    }

    #[test]
    fn test_failed_save_keeps_the_game() {
        let state = State::new(&["Ann".to_string(), "Bob".to_string()]).unwrap();
        let mut app = InteractiveApp::new(state, SaveStore::new(BrokenStorage));
        press(&mut app, "r1");
        let before = app.state.clone();

        press(&mut app, "s");
        assert_eq!(app.state, before);
        assert!(app.message.as_ref().is_some_and(|m| m.is_error && m.text.starts_with("storage unavailable")));

        press(&mut app, "e");
        assert_eq!(app.state.turn_phase(), TurnPhase::SelectCategory);
    }

    #[test]
    fn test_quit() {
        let mut app = app();
        assert!(app.handle_key(KeyCode::Char('q')));
    }
}
