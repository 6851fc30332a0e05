use crate::cache::{CacheStorage, CachedResponse};
use crate::query::{self, Query, QueryState};
use crate::ui::renderfns::{format_bytes, status_color};
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use std::sync::Arc;
use url::Url;

/// Bytes of body shown in the preview
const PREVIEW_BYTES: usize = 16 * 1024;

/// One stored response: status line, headers, and a body preview
pub struct EntryDetailView {
  url: String,
  query: Query<Option<CachedResponse>>,
  scroll: u16,
}

impl EntryDetailView {
  pub fn new(
    storage: Arc<dyn CacheStorage>,
    store: String,
    request_key: String,
    url: String,
  ) -> Self {
    let mut query = Query::new(move || {
      let storage = storage.clone();
      let store = store.clone();
      let key = request_key.clone();
      query::blocking(move || storage.get_by_key(&store, &key))
    });

    // Start fetching immediately
    query.fetch();

    Self {
      url,
      query,
      scroll: 0,
    }
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let title = match self.query.state() {
      QueryState::Loading => format!(" {} (loading...) ", self.url),
      QueryState::Error(e) => format!(" {} (error: {}) ", self.url, e),
      _ => format!(" {} ", self.url),
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let entry = match self.query.state() {
      QueryState::Success(Some(entry)) => entry,
      QueryState::Success(None) => {
        let paragraph = Paragraph::new("Entry no longer in this store. It may have been purged.")
          .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, inner);
        return;
      }
      QueryState::Error(e) => {
        let paragraph = Paragraph::new(format!("Error: {}\n\nPress 'r' to retry.", e))
          .style(Style::default().fg(Color::Red));
        frame.render_widget(paragraph, inner);
        return;
      }
      QueryState::Idle | QueryState::Loading => {
        let paragraph =
          Paragraph::new("Loading entry...").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(paragraph, inner);
        return;
      }
    };

    let paragraph = Paragraph::new(detail_lines(entry))
      .wrap(Wrap { trim: false })
      .scroll((self.scroll, 0));
    frame.render_widget(paragraph, inner);
  }
}

fn label(name: &str) -> Span<'static> {
  Span::styled(format!("{:<10}", name), Style::default().fg(Color::DarkGray))
}

/// Status line, headers, then the body as lossy UTF-8
fn detail_lines(entry: &CachedResponse) -> Vec<Line<'static>> {
  let response = &entry.response;
  let mut lines = vec![
    Line::from(vec![
      label("Request"),
      Span::raw(format!("{} {}", entry.method, entry.url)),
    ]),
    Line::from(vec![
      label("Status"),
      Span::styled(
        response.status.to_string(),
        Style::default().fg(status_color(response.status)).bold(),
      ),
      Span::raw("  "),
      Span::styled(
        response.kind.as_str().to_string(),
        Style::default().fg(Color::Magenta),
      ),
    ]),
    Line::from(vec![
      label("Size"),
      Span::raw(format_bytes(response.body.len() as u64)),
    ]),
    Line::from(vec![
      label("Cached"),
      Span::raw(entry.cached_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
    ]),
    Line::raw(""),
  ];

  if !response.headers.is_empty() {
    lines.push(Line::styled("Headers", Style::default().fg(Color::Cyan).bold()));
    for (name, value) in &response.headers {
      lines.push(Line::from(vec![
        Span::styled(format!("  {}: ", name), Style::default().fg(Color::Yellow)),
        Span::raw(value.clone()),
      ]));
    }
    lines.push(Line::raw(""));
  }

  lines.push(Line::styled("Body", Style::default().fg(Color::Cyan).bold()));
  let bytes = response.body.as_bytes();
  let shown = &bytes[..bytes.len().min(PREVIEW_BYTES)];
  for line in String::from_utf8_lossy(shown).lines() {
    lines.push(Line::raw(line.to_string()));
  }
  if bytes.len() > PREVIEW_BYTES {
    lines.push(Line::styled(
      format!("... {} more bytes", bytes.len() - PREVIEW_BYTES),
      Style::default().fg(Color::DarkGray),
    ));
  }

  lines
}

impl View for EntryDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        self.scroll = self.scroll.saturating_add(1);
        ViewAction::None
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.scroll = self.scroll.saturating_sub(1);
        ViewAction::None
      }
      KeyCode::PageDown | KeyCode::Char(' ') => {
        self.scroll = self.scroll.saturating_add(20);
        ViewAction::None
      }
      KeyCode::PageUp => {
        self.scroll = self.scroll.saturating_sub(20);
        ViewAction::None
      }
      KeyCode::Char('g') | KeyCode::Home => {
        self.scroll = 0;
        ViewAction::None
      }
      KeyCode::Char('r') => {
        self.query.refetch();
        ViewAction::None
      }
      KeyCode::Char('q') | KeyCode::Esc => ViewAction::Pop,
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
  }

  /// The URL path, which is what tells entries of one origin apart
  fn breadcrumb_label(&self) -> String {
    Url::parse(&self.url)
      .map(|u| u.path().to_string())
      .unwrap_or_else(|_| self.url.clone())
  }

  fn tick(&mut self) {
    self.query.poll();
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("j/k", "scroll").with_priority(20),
      ShortcutInfo::new("r", "reload").with_priority(25),
      ShortcutInfo::new("q", "back").with_priority(30),
    ]
  }
}
