use crate::cache::{state_keys, CacheStorage, StoreInfo};
use crate::query::{self, Query, QueryState};
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::format_bytes;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::EntryListView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::sync::Arc;

/// Stores plus the name of the one currently serving requests
#[derive(Debug, Clone)]
pub struct StoreListing {
  pub stores: Vec<StoreInfo>,
  pub active: Option<String>,
}

/// Root view: every cache store in the database
pub struct StoreListView {
  storage: Arc<dyn CacheStorage>,
  query: Query<StoreListing>,
  list_state: ListState,
  search: SearchInput,
}

impl StoreListView {
  pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
    let storage_for_query = storage.clone();
    let mut query = Query::new(move || {
      let storage = storage_for_query.clone();
      query::blocking(move || {
        Ok(StoreListing {
          stores: storage.list_stores()?,
          active: storage.get_state(state_keys::ACTIVE_VERSION)?,
        })
      })
    });

    // Start fetching immediately
    query.fetch();

    Self {
      storage,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
    }
  }

  fn visible(&self) -> Vec<&StoreInfo> {
    let filter = self.search.query().to_lowercase();
    self
      .query
      .data()
      .map(|listing| {
        listing
          .stores
          .iter()
          .filter(|s| filter.is_empty() || s.name.to_lowercase().contains(&filter))
          .collect()
      })
      .unwrap_or_default()
  }

  fn active(&self) -> Option<&str> {
    self.query.data().and_then(|l| l.active.as_deref())
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = match self.query.state() {
      QueryState::Loading => " Stores (loading...) ".to_string(),
      QueryState::Error(e) => format!(" Stores (error: {}) ", e),
      _ => format!(" Stores ({}) ", len),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 && !self.query.is_loading() {
      let content = if self.query.is_error() {
        "Failed to read the cache. Press 'r' to retry."
      } else if self.search.query().is_empty() {
        "No cache stores. Run `shellcache install` first."
      } else {
        "No stores match the filter."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let active = self.active();
    // Collect items first to avoid borrow conflicts with list_state
    let items: Vec<ListItem> = self
      .visible()
      .into_iter()
      .map(|store| {
        let is_active = active == Some(store.name.as_str());
        let marker = if is_active { "● " } else { "  " };
        let name_style = if is_active {
          Style::default().fg(Color::Green).bold()
        } else {
          Style::default().fg(Color::White)
        };
        ListItem::new(Line::from(vec![
          Span::styled(marker, Style::default().fg(Color::Green)),
          Span::styled(format!("{:<28}", store.name), name_style),
          Span::styled(
            format!("{:>6} entries ", store.entry_count),
            Style::default().fg(Color::Cyan),
          ),
          Span::styled(
            format!("{:>10} ", format_bytes(store.total_bytes)),
            Style::default().fg(Color::Yellow),
          ),
          Span::styled(
            store.created_at.format("%Y-%m-%d %H:%M").to_string(),
            Style::default().fg(Color::DarkGray),
          ),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  // Key handling helpers for or_else chain pattern
  fn handle_overlays(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match self.search.handle_key(key) {
      KeyResult::Handled | KeyResult::Event(SearchEvent::Submitted) => Some(ViewAction::None),
      KeyResult::Event(SearchEvent::Changed(_)) => {
        self.list_state.select(Some(0));
        Some(ViewAction::None)
      }
      KeyResult::NotHandled => None,
    }
  }

  fn handle_navigation(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.list_state.select_next();
        Some(ViewAction::None)
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.list_state.select_previous();
        Some(ViewAction::None)
      }
      _ => None,
    }
  }

  fn handle_actions(&mut self, key: KeyEvent) -> Option<ViewAction> {
    match key.code {
      KeyCode::Char('r') => {
        self.query.refetch();
        Some(ViewAction::None)
      }
      KeyCode::Enter => {
        let idx = self.list_state.selected()?;
        let name = self.visible().get(idx)?.name.clone();
        Some(ViewAction::Push(Box::new(EntryListView::new(
          self.storage.clone(),
          name,
        ))))
      }
      KeyCode::Char('q') | KeyCode::Esc => Some(ViewAction::Pop),
      _ => None,
    }
  }
}

impl View for StoreListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    self
      .handle_overlays(key)
      .or_else(|| self.handle_navigation(key))
      .or_else(|| self.handle_actions(key))
      .unwrap_or(ViewAction::None)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Stores".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    if self.search.is_active() {
      return vec![
        ShortcutInfo::new("Enter", "keep filter").with_priority(10),
        ShortcutInfo::new("Esc", "clear").with_priority(20),
      ];
    }
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("/", "filter").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(25),
      ShortcutInfo::new("q", "quit").with_priority(30),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::gateway::{Request, Response, ResponseKind};
  use crossterm::event::KeyModifiers;
  use std::time::Duration;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  fn seeded() -> Arc<dyn CacheStorage> {
    let storage = MemoryStorage::new();
    storage.open_store("notes-cache-v1").unwrap();
    storage.open_store("notes-cache-v2").unwrap();
    let request = Request::parse("https://notes.example.com/style.css").unwrap();
    storage
      .put("notes-cache-v2", &request, &Response::new(200, ResponseKind::Basic, "body{}"))
      .unwrap();
    storage
      .set_state(state_keys::ACTIVE_VERSION, "notes-cache-v2")
      .unwrap();
    Arc::new(storage)
  }

  async fn loaded(storage: Arc<dyn CacheStorage>) -> StoreListView {
    let mut view = StoreListView::new(storage);
    for _ in 0..50 {
      view.tick();
      if view.query.data().is_some() {
        break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    view
  }

  #[tokio::test]
  async fn test_loads_stores_and_active_version() {
    let view = loaded(seeded()).await;
    assert_eq!(view.visible().len(), 2);
    assert_eq!(view.active(), Some("notes-cache-v2"));
  }

  #[tokio::test]
  async fn test_filter_narrows_stores() {
    let mut view = loaded(seeded()).await;
    for code in [KeyCode::Char('/'), KeyCode::Char('v'), KeyCode::Char('2')] {
      view.handle_key(key(code));
    }
    let names: Vec<_> = view.visible().iter().map(|s| s.name.clone()).collect();
    assert_eq!(names, vec!["notes-cache-v2"]);
  }

  #[tokio::test]
  async fn test_enter_pushes_entries_and_q_pops() {
    let mut view = loaded(seeded()).await;
    view.list_state.select(Some(1));

    match view.handle_key(key(KeyCode::Enter)) {
      ViewAction::Push(next) => assert_eq!(next.breadcrumb_label(), "notes-cache-v2"),
      _ => panic!("expected a pushed view"),
    }
    assert!(matches!(view.handle_key(key(KeyCode::Char('q'))), ViewAction::Pop));
  }
}
