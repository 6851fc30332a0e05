use crate::cache::{state_keys, CacheStorage};
use crate::event::{Event, EventHandler};
use crate::ui::components::{draw_footer, CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::draw_header;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::{EntryListView, StoreListView};
use color_eyre::{eyre::eyre, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

/// Cache browser: a stack of views, root at index 0
pub struct App {
  storage: Arc<dyn CacheStorage>,
  views: Vec<Box<dyn View>>,
  command: CommandInput,
  /// Origin shown in the header
  title: String,
  /// Configured cache version shown in the header
  version: String,
  /// Last command error, shown in the footer until the next key
  status: Option<String>,
  should_quit: bool,
}

impl App {
  pub fn new(storage: Arc<dyn CacheStorage>, title: String, version: String) -> Self {
    let root: Box<dyn View> = Box::new(StoreListView::new(storage.clone()));
    Self {
      storage,
      views: vec![root],
      command: CommandInput::new(),
      title,
      version,
      status: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode().map_err(|e| eyre!("Failed to enable raw mode: {}", e))?;
    stdout()
      .execute(EnterAlternateScreen)
      .map_err(|e| eyre!("Failed to enter alternate screen: {}", e))?;

    let result = self.event_loop().await;

    // Restore the terminal even when the loop failed
    disable_raw_mode().map_err(|e| eyre!("Failed to disable raw mode: {}", e))?;
    stdout()
      .execute(LeaveAlternateScreen)
      .map_err(|e| eyre!("Failed to leave alternate screen: {}", e))?;

    result
  }

  async fn event_loop(&mut self) -> Result<()> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))
      .map_err(|e| eyre!("Failed to create terminal: {}", e))?;
    let mut events = EventHandler::new(Duration::from_millis(100));

    while !self.should_quit {
      terminal
        .draw(|frame| self.draw(frame))
        .map_err(|e| eyre!("Failed to draw: {}", e))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => {
          if let Some(view) = self.views.last_mut() {
            view.tick();
          }
        }
        Some(Event::Resize) => {}
        None => break,
      }
    }

    tracing::debug!("Cache browser closed");
    Ok(())
  }

  fn draw(&mut self, frame: &mut Frame) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1), // Header
        Constraint::Min(1),    // Content
        Constraint::Length(1), // Breadcrumb
      ])
      .split(frame.area());

    let shortcuts = if self.command.is_active() {
      vec![
        ShortcutInfo::new("Tab", "next").with_priority(10),
        ShortcutInfo::new("Enter", "run").with_priority(20),
        ShortcutInfo::new("Esc", "cancel").with_priority(30),
      ]
    } else {
      self.views.last().map(|v| v.shortcuts()).unwrap_or_default()
    };
    draw_header(frame, chunks[0], &self.title, &self.version, &shortcuts);

    if let Some(view) = self.views.last_mut() {
      view.render(frame, chunks[1]);
    }
    self.command.render_overlay(frame, chunks[1]);

    draw_footer(frame, chunks[2], &self.breadcrumb(), self.status.as_deref());
  }

  fn breadcrumb(&self) -> Vec<String> {
    self.views.iter().map(|v| v.breadcrumb_label()).collect()
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }
    self.status = None;

    match self.command.handle_key(key) {
      KeyResult::Handled | KeyResult::Event(CommandEvent::Cancelled) => return,
      KeyResult::Event(CommandEvent::Submitted(cmd)) => {
        self.execute_command(&cmd);
        return;
      }
      KeyResult::NotHandled => {}
    }

    let action = match self.views.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.views.push(view),
      ViewAction::Pop => {
        // Popping the root quits
        if self.views.len() > 1 {
          self.views.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  fn execute_command(&mut self, cmd: &str) {
    match cmd {
      "stores" => {
        self.views.truncate(1);
        self.views[0] = Box::new(StoreListView::new(self.storage.clone()));
      }
      "active" => match self.storage.get_state(state_keys::ACTIVE_VERSION) {
        Ok(Some(active)) => {
          self.views.truncate(1);
          self
            .views
            .push(Box::new(EntryListView::new(self.storage.clone(), active)));
        }
        Ok(None) => self.status = Some("No active store; run `shellcache activate`".to_string()),
        Err(e) => {
          tracing::warn!(error = %e, "Failed to read active version");
          self.status = Some(format!("Error: {}", e));
        }
      },
      "quit" => self.should_quit = true,
      "" => {}
      other => self.status = Some(format!("Unknown command: {}", other)),
    }
  }
}
