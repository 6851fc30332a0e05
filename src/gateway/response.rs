//! Buffered responses that can be read more than once.

use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;

/// Visibility of a response to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
  /// Same-origin response
  Basic,
  /// Cross-origin response readable through CORS
  Cors,
  /// Cross-origin response whose content cannot be inspected
  Opaque,
}

impl ResponseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(Self::Basic),
      "cors" => Some(Self::Cors),
      "opaque" => Some(Self::Opaque),
      _ => None,
    }
  }
}

/// A response payload buffered once.
///
/// Cloning shares the buffer; every call to [`Body::reader`] yields an
/// independent read handle over the same bytes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Body(Arc<[u8]>);

impl Body {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// A fresh reader starting at the beginning of the payload.
  pub fn reader(&self) -> Cursor<&[u8]> {
    Cursor::new(self.as_bytes())
  }
}

impl From<Vec<u8>> for Body {
  fn from(bytes: Vec<u8>) -> Self {
    Self(bytes.into())
  }
}

impl From<&[u8]> for Body {
  fn from(bytes: &[u8]) -> Self {
    Self(bytes.into())
  }
}

impl From<&str> for Body {
  fn from(s: &str) -> Self {
    Self(s.as_bytes().into())
  }
}

impl std::fmt::Debug for Body {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Body({} bytes)", self.0.len())
  }
}

/// A complete response with its body already buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub kind: ResponseKind,
  pub body: Body,
}

impl Response {
  pub fn new(status: u16, kind: ResponseKind, body: impl Into<Body>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      kind,
      body: body.into(),
    }
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Empty success used when an optional resource is unavailable.
  pub fn no_content() -> Self {
    Self::new(204, ResponseKind::Basic, Body::empty())
  }

  /// 2xx status.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Whether this response may be written to a cache store.
  ///
  /// Opaque responses are passed through but never persisted.
  pub fn is_storable(&self) -> bool {
    self.status == 200 && self.kind != ResponseKind::Opaque
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn content_type(&self) -> Option<&str> {
    self.header("content-type")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Read;

  #[test]
  fn test_body_can_be_read_twice() {
    let response = Response::new(200, ResponseKind::Basic, "<html>shell</html>");
    let stored = response.clone();

    let mut first = String::new();
    response.body.reader().read_to_string(&mut first).unwrap();
    let mut second = String::new();
    stored.body.reader().read_to_string(&mut second).unwrap();

    assert_eq!(first, "<html>shell</html>");
    assert_eq!(first, second);
  }

  #[test]
  fn test_storable_requires_200_and_readable_kind() {
    assert!(Response::new(200, ResponseKind::Basic, "a").is_storable());
    assert!(Response::new(200, ResponseKind::Cors, "a").is_storable());
    assert!(!Response::new(200, ResponseKind::Opaque, "a").is_storable());
    assert!(!Response::new(404, ResponseKind::Basic, "a").is_storable());
    assert!(!Response::no_content().is_storable());
  }

  #[test]
  fn test_no_content_is_empty_204() {
    let response = Response::no_content();
    assert_eq!(response.status, 204);
    assert_eq!(response.body.len(), 0);
    assert!(response.is_ok());
  }

  #[test]
  fn test_header_lookup_ignores_case() {
    let response =
      Response::new(200, ResponseKind::Basic, "").with_header("Content-Type", "text/css");
    assert_eq!(response.content_type(), Some("text/css"));
    assert_eq!(response.header("x-missing"), None);
  }

  #[test]
  fn test_kind_round_trips_through_str() {
    for kind in [ResponseKind::Basic, ResponseKind::Cors, ResponseKind::Opaque] {
      assert_eq!(ResponseKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(ResponseKind::parse("error"), None);
  }
}
