use ratatui::prelude::Color;

/// Truncate a string to at most `max_len` chars, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Display color for an HTTP status code
pub fn status_color(status: u16) -> Color {
  match status {
    200..=299 => Color::Green,
    300..=399 => Color::Cyan,
    400..=499 => Color::Yellow,
    _ => Color::Red,
  }
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("/index.html", 20), "/index.html");
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("/fonts/inter.woff2", 10), "/fonts/...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("ééééé", 4), "é...");
  }

  #[test]
  fn test_status_color() {
    assert_eq!(status_color(200), Color::Green);
    assert_eq!(status_color(204), Color::Green);
    assert_eq!(status_color(304), Color::Cyan);
    assert_eq!(status_color(404), Color::Yellow);
    assert_eq!(status_color(503), Color::Red);
  }

  #[test]
  fn test_format_bytes() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(1023), "1023 B");
    assert_eq!(format_bytes(1536), "1.5 KiB");
    assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
  }
}
