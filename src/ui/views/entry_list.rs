use crate::cache::{CacheStorage, EntrySummary};
use crate::query::{self, Query, QueryState};
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_bytes, status_color, truncate};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::ui::views::EntryDetailView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::sync::Arc;

/// Entries of one cache store, filterable by URL
pub struct EntryListView {
  storage: Arc<dyn CacheStorage>,
  store: String,
  query: Query<Vec<EntrySummary>>,
  list_state: ListState,
  search: SearchInput,
}

impl EntryListView {
  pub fn new(storage: Arc<dyn CacheStorage>, store: String) -> Self {
    let (storage_for_query, store_for_query) = (storage.clone(), store.clone());
    let mut query = Query::new(move || {
      let storage = storage_for_query.clone();
      let store = store_for_query.clone();
      query::blocking(move || storage.list_entries(&store))
    });

    query.fetch();

    Self {
      storage,
      store,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
    }
  }

  fn visible(&self) -> Vec<&EntrySummary> {
    let filter = self.search.query().to_lowercase();
    self
      .query
      .data()
      .map(|entries| {
        entries
          .iter()
          .filter(|e| filter.is_empty() || e.url.to_lowercase().contains(&filter))
          .collect()
      })
      .unwrap_or_default()
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let title = match self.query.state() {
      QueryState::Loading => format!(" {} (loading...) ", self.store),
      QueryState::Error(e) => format!(" {} (error: {}) ", self.store, e),
      _ if !self.search.query().is_empty() => format!(
        " {} ({}/{}) [/{}] ",
        self.store,
        len,
        self.query.data().map(Vec::len).unwrap_or(0),
        self.search.query()
      ),
      _ => format!(" {} ({}) ", self.store, len),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    if len == 0 && !self.query.is_loading() {
      let content = if self.query.is_error() {
        "Failed to load entries. Press 'r' to retry."
      } else {
        "No entries."
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    // Leave room for the fixed-width columns
    let url_width = (area.width as usize).saturating_sub(40).max(20);
    let items: Vec<ListItem> = self
      .visible()
      .into_iter()
      .map(|entry| {
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<5}", entry.status),
            Style::default().fg(status_color(entry.status)),
          ),
          Span::styled(
            format!("{:<7}", entry.kind),
            Style::default().fg(Color::Magenta),
          ),
          Span::styled(
            format!("{:>10}  ", format_bytes(entry.size)),
            Style::default().fg(Color::Yellow),
          ),
          Span::raw(truncate(&entry.url, url_width)),
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
      KeyCode::Char('g') | KeyCode::Home => {
        self.list_state.select_first();
        Some(ViewAction::None)
      }
      KeyCode::Char('G') | KeyCode::End => {
        self.list_state.select_last();
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
        let entry = self.visible().get(idx).copied()?;
        Some(ViewAction::Push(Box::new(EntryDetailView::new(
          self.storage.clone(),
          self.store.clone(),
          entry.request_key.clone(),
          entry.url.clone(),
        ))))
      }
      KeyCode::Char('q') | KeyCode::Esc => Some(ViewAction::Pop),
      _ => None,
    }
  }
}

impl View for EntryListView {
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
    self.store.clone()
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
      ShortcutInfo::new("q", "back").with_priority(30),
    ]
  }
}
