use std::io::Stdout;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use crate::clipboard::ClipboardChain;
use crate::error::StartupError;
use crate::models::VaultItem;
use crate::process::{ProcessInvoker, Runner};
use crate::storage::{load_config, SessionStore};
use crate::ui::{draw, draw_unlock, UnlockState, ViewState};
use crate::vault::VaultClient;

const STATUS_MESSAGE_SECS: u64 = 2;
const POLL_INTERVAL_MS: u64 = 50;

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    Search,
    Unlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub text: String,
    pub severity: Severity,
    pub issued_at: Instant,
}

impl StatusMessage {
    pub fn expired_at(&self, now: Instant) -> bool {
        now.duration_since(self.issued_at) >= Duration::from_secs(STATUS_MESSAGE_SECS)
    }
}

#[derive(Debug, Default)]
pub struct FilterState {
    items: Vec<VaultItem>,
    query: String,
    filtered: Vec<usize>,
    selection: Option<usize>,
}

impl FilterState {
    pub fn new(items: Vec<VaultItem>) -> Self {
        let mut state = Self {
            items,
            ..Self::default()
        };
        state.recompute();
        state
    }

    pub fn set_items(&mut self, items: Vec<VaultItem>) {
        self.items = items;
        self.recompute();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
        self.recompute();
    }

    pub fn pop_char(&mut self) -> bool {
        let popped = self.query.pop().is_some();
        if popped {
            self.recompute();
        }
        popped
    }

    pub fn clear_query(&mut self) {
        self.query.clear();
        self.recompute();
    }

    pub fn recompute(&mut self) {
        let needle = self.query.to_lowercase();
        self.filtered = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| matches_query(item, &needle))
            .map(|(idx, _)| idx)
            .collect();
        self.selection = if self.filtered.is_empty() { None } else { Some(0) };
    }

    pub fn visible(&self) -> Vec<&VaultItem> {
        self.filtered.iter().map(|&idx| &self.items[idx]).collect()
    }

    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    pub fn selected(&self) -> Option<&VaultItem> {
        self.selection
            .and_then(|sel| self.filtered.get(sel))
            .map(|&idx| &self.items[idx])
    }

    pub fn is_vault_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn move_up(&mut self) -> bool {
        match self.selection {
            Some(sel) if sel > 0 => {
                self.selection = Some(sel - 1);
                true
            }
            _ => false,
        }
    }

    pub fn move_down(&mut self) -> bool {
        match self.selection {
            Some(sel) if sel + 1 < self.filtered.len() => {
                self.selection = Some(sel + 1);
                true
            }
            _ => false,
        }
    }
}

/// Case-insensitive substring match on name or username. `needle` is
/// already lowercased; an empty needle matches everything.
pub fn matches_query(item: &VaultItem, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    item.name.to_lowercase().contains(needle)
        || item
            .username()
            .is_some_and(|user| user.to_lowercase().contains(needle))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    CancelSearch,
    EnterSearch,
    Copy,
    Lock,
    Sync,
    MoveUp,
    MoveDown,
    Type(char),
    Erase,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockCommand {
    Submit,
    Cancel,
    ToggleVisibility,
    Type(char),
    Erase,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    Cancelled,
    Locked { confirmed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue { redraw: bool },
    Exit(ExitReason),
}

fn is_ctrl(key: &KeyEvent, c: char) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char(k) if k.eq_ignore_ascii_case(&c))
}

fn printable(key: &KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(c)
            if !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                && !c.is_control() =>
        {
            Some(c)
        }
        _ => None,
    }
}

pub fn browse_command(key: &KeyEvent) -> Command {
    if is_ctrl(key, 'c') {
        return Command::Quit;
    }
    match key.code {
        KeyCode::Char('q') => Command::Quit,
        KeyCode::Esc => Command::CancelSearch,
        KeyCode::Char('s') | KeyCode::Char('/') => Command::EnterSearch,
        KeyCode::Char('c') | KeyCode::Enter => Command::Copy,
        KeyCode::Char('l') => Command::Lock,
        KeyCode::Char('r') => Command::Sync,
        KeyCode::Up => Command::MoveUp,
        KeyCode::Down => Command::MoveDown,
        _ => Command::Ignore,
    }
}

// Every printable key edits the query here, `q` included.
pub fn search_command(key: &KeyEvent) -> Command {
    if is_ctrl(key, 'c') {
        return Command::Quit;
    }
    match key.code {
        KeyCode::Esc => Command::CancelSearch,
        KeyCode::Enter => Command::Copy,
        KeyCode::Up => Command::MoveUp,
        KeyCode::Down => Command::MoveDown,
        KeyCode::Backspace => Command::Erase,
        _ => printable(key).map(Command::Type).unwrap_or(Command::Ignore),
    }
}

pub fn unlock_command(key: &KeyEvent) -> UnlockCommand {
    if is_ctrl(key, 'c') {
        return UnlockCommand::Cancel;
    }
    if is_ctrl(key, 'h') {
        return UnlockCommand::ToggleVisibility;
    }
    match key.code {
        KeyCode::Enter => UnlockCommand::Submit,
        KeyCode::Esc => UnlockCommand::Cancel,
        KeyCode::Backspace => UnlockCommand::Erase,
        _ => printable(key).map(UnlockCommand::Type).unwrap_or(UnlockCommand::Ignore),
    }
}

pub struct App<'a, R: Runner> {
    vault: &'a mut VaultClient<R>,
    clipboard: &'a ClipboardChain,
    mode: Mode,
    filter: FilterState,
    status: Option<StatusMessage>,
}

impl<'a, R: Runner> App<'a, R> {
    pub fn new(vault: &'a mut VaultClient<R>, clipboard: &'a ClipboardChain) -> Self {
        Self {
            vault,
            clipboard,
            mode: Mode::Browse,
            filter: FilterState::default(),
            status: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn view(&self) -> ViewState<'_> {
        ViewState {
            mode: self.mode,
            query: self.filter.query(),
            items: self.filter.visible(),
            selection: self.filter.selection(),
            vault_empty: self.filter.is_vault_empty(),
            status: self.status.as_ref(),
        }
    }

    pub fn set_status(&mut self, text: impl Into<String>, severity: Severity) {
        self.status = Some(StatusMessage {
            text: text.into(),
            severity,
            issued_at: Instant::now(),
        });
    }

    pub fn tick(&mut self, now: Instant) -> bool {
        if self.status.as_ref().is_some_and(|s| s.expired_at(now)) {
            self.status = None;
            return true;
        }
        false
    }

    pub fn load_items(&mut self) {
        let items = self.vault.list_items(None);
        debug!(count = items.len(), "items loaded into view");
        self.filter.set_items(items);
    }

    pub fn handle_key(&mut self, key: &KeyEvent) -> Flow {
        let command = match self.mode {
            Mode::Browse => browse_command(key),
            Mode::Search => search_command(key),
            Mode::Unlock => Command::Ignore,
        };
        self.apply(command)
    }

    pub fn apply(&mut self, command: Command) -> Flow {
        let redraw = match command {
            Command::Quit => return Flow::Exit(ExitReason::Quit),
            Command::Lock => {
                let confirmed = self.vault.lock();
                if confirmed {
                    self.set_status("Vault locked", Severity::Success);
                } else {
                    self.set_status("Local session cleared", Severity::Error);
                }
                return Flow::Exit(ExitReason::Locked { confirmed });
            }
            Command::CancelSearch => {
                self.filter.clear_query();
                self.mode = Mode::Browse;
                true
            }
            Command::EnterSearch => {
                self.mode = Mode::Search;
                true
            }
            Command::Copy => self.copy_selected(),
            Command::Sync => {
                self.sync();
                true
            }
            Command::MoveUp => self.filter.move_up(),
            Command::MoveDown => self.filter.move_down(),
            Command::Type(c) => {
                self.filter.push_char(c);
                true
            }
            Command::Erase => self.filter.pop_char(),
            Command::Ignore => false,
        };
        Flow::Continue { redraw }
    }

    pub fn submit_unlock(&mut self, password: &str) -> bool {
        if self.vault.unlock(password).is_none() {
            self.set_status("Invalid password. Try again.", Severity::Error);
            return false;
        }
        self.status = None;
        self.mode = Mode::Browse;
        self.load_items();
        true
    }

    fn copy_selected(&mut self) -> bool {
        let Some(item) = self.filter.selected() else {
            return false;
        };
        let name = item.name.clone();
        let mut secret = item.password().map(|p| Zeroizing::new(p.to_string()));
        if secret.is_none() {
            let id = item.id.clone();
            debug!("listed item has no password, fetching full record");
            secret = self
                .vault
                .get_item(&id, None)
                .and_then(|full| full.password().map(|p| Zeroizing::new(p.to_string())));
        }
        match secret {
            Some(secret) if self.clipboard.deliver(&secret) => {
                self.set_status(format!("Password copied for: {name}"), Severity::Success)
            }
            Some(_) => self.set_status("Failed to copy password to clipboard", Severity::Error),
            None => self.set_status("No password found for this item", Severity::Error),
        }
        true
    }

    fn sync(&mut self) {
        if !self.vault.sync(None) {
            self.set_status("Sync failed", Severity::Error);
            return;
        }
        let items = self.vault.list_items(None);
        let count = items.len();
        self.filter.set_items(items);
        self.set_status(format!("Vault synced ({count} items)"), Severity::Success);
    }
}

pub fn run() -> Result<ExitReason> {
    let config = load_config()?;
    let invoker = ProcessInvoker::locate(config.bw_path.as_deref());
    let mut vault = VaultClient::new(invoker, SessionStore::open_default()?);

    if !vault.check_available() {
        return Err(StartupError::CliMissing.into());
    }
    if !vault.is_logged_in() {
        return Err(StartupError::NotLoggedIn.into());
    }

    let clear_after =
        (config.clipboard_clear_secs > 0).then(|| Duration::from_secs(config.clipboard_clear_secs));
    let clipboard = ClipboardChain::system(clear_after);
    let mut app = App::new(&mut vault, &clipboard);

    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, crossterm::cursor::Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_interactive(&mut terminal, &mut app);

    teardown_terminal(&mut terminal);
    result
}

fn run_interactive<R: Runner>(terminal: &mut Tui, app: &mut App<'_, R>) -> Result<ExitReason> {
    if !app.vault.is_unlocked() {
        debug!("vault is locked, requesting unlock");
        if !unlock_screen(terminal, app)? {
            debug!("unlock cancelled");
            return Ok(ExitReason::Cancelled);
        }
    } else {
        app.load_items();
    }

    terminal.draw(|f| draw(f, &app.view()))?;
    loop {
        let mut redraw = app.tick(Instant::now());
        if event::poll(Duration::from_millis(POLL_INTERVAL_MS))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match app.handle_key(&key) {
                    Flow::Continue { redraw: changed } => redraw |= changed,
                    Flow::Exit(reason) => return Ok(reason),
                },
                Event::Resize(_, _) => redraw = true,
                _ => {}
            }
        }
        if redraw {
            terminal.draw(|f| draw(f, &app.view()))?;
        }
    }
}

fn unlock_screen<R: Runner>(terminal: &mut Tui, app: &mut App<'_, R>) -> Result<bool> {
    app.mode = Mode::Unlock;
    let mut input = Zeroizing::new(String::new());
    let mut show_input = false;

    loop {
        app.tick(Instant::now());
        draw_unlock_frame(terminal, app, &input, show_input)?;

        let key = match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => key,
            _ => continue,
        };
        match unlock_command(&key) {
            UnlockCommand::Cancel => return Ok(false),
            UnlockCommand::ToggleVisibility => show_input = !show_input,
            UnlockCommand::Erase => {
                input.pop();
            }
            UnlockCommand::Type(c) => input.push(c),
            UnlockCommand::Submit if input.is_empty() => {
                app.set_status("Password required", Severity::Error);
            }
            UnlockCommand::Submit => {
                app.set_status("Unlocking...", Severity::Info);
                draw_unlock_frame(terminal, app, "", show_input)?;
                let unlocked = app.submit_unlock(&input);
                input.zeroize();
                if unlocked {
                    return Ok(true);
                }
            }
            UnlockCommand::Ignore => {}
        }
    }
}

fn draw_unlock_frame<R: Runner>(
    terminal: &mut Tui,
    app: &App<'_, R>,
    input: &str,
    show_input: bool,
) -> Result<()> {
    let mut display = if show_input {
        input.to_string()
    } else {
        "•".repeat(input.chars().count())
    };
    terminal.draw(|f| {
        let view = UnlockState {
            input_display: &display,
            input_visible: show_input,
            status: app.status(),
        };
        draw_unlock(f, &view);
    })?;
    display.zeroize();
    Ok(())
}

fn teardown_terminal(terminal: &mut Tui) {
    disable_raw_mode().ok();
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        crossterm::cursor::Show
    )
    .ok();
    terminal.show_cursor().ok();
}
