//! Network access used by the gateway.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::time::Duration;
use url::Url;

use super::request::Request;
use super::response::{Body, Response, ResponseKind};
use crate::config::NetworkConfig;

/// Something that can perform a request against the real network.
///
/// An `Err` means a transport failure (offline, DNS, refused); HTTP error
/// statuses are returned as `Ok` responses.
pub trait Network: Send + Sync {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>>;
}

/// Network client backed by reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(origin: Url, config: &NetworkConfig) -> Result<Self> {
    let mut builder = reqwest::Client::builder().user_agent(
      config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("shellcache/{}", env!("CARGO_PKG_VERSION"))),
    );
    if let Some(secs) = config.connect_timeout_secs {
      builder = builder.connect_timeout(Duration::from_secs(secs));
    }

    let client = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  async fn perform(&self, request: &Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
      .map_err(|e| eyre!("Unsupported method {}: {}", request.method, e))?;

    let response = self
      .client
      .request(method, request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers: Vec<(String, String)> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    let kind = response_kind(&self.origin, request, &headers);

    Ok(Response {
      status,
      headers,
      kind,
      body: Body::from(body.to_vec()),
    })
  }
}

impl Network for HttpNetwork {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
    Box::pin(self.perform(request))
  }
}

/// Decide how visible a response is to the app's origin.
///
/// Same-origin responses and navigations are basic; cross-origin ones are
/// readable only when the server allows the origin through CORS.
fn response_kind(origin: &Url, request: &Request, headers: &[(String, String)]) -> ResponseKind {
  if request.is_navigation() || request.url.origin() == origin.origin() {
    return ResponseKind::Basic;
  }

  let app_origin = origin.origin().ascii_serialization();
  let allowed = headers
    .iter()
    .filter(|(name, _)| name.eq_ignore_ascii_case("access-control-allow-origin"))
    .any(|(_, value)| value.trim() == "*" || value.trim() == app_origin);

  if allowed {
    ResponseKind::Cors
  } else {
    ResponseKind::Opaque
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn origin() -> Url {
    Url::parse("https://notes.test").unwrap()
  }

  fn acao(value: &str) -> Vec<(String, String)> {
    vec![("Access-Control-Allow-Origin".to_string(), value.to_string())]
  }

  #[test]
  fn test_same_origin_is_basic() {
    let req = Request::parse("https://notes.test/style.css").unwrap();
    assert_eq!(response_kind(&origin(), &req, &[]), ResponseKind::Basic);
  }

  #[test]
  fn test_cross_origin_with_wildcard_is_cors() {
    let req = Request::parse("https://fonts.gstatic.com/inter.woff2").unwrap();
    assert_eq!(response_kind(&origin(), &req, &acao("*")), ResponseKind::Cors);
  }

  #[test]
  fn test_cross_origin_with_matching_origin_is_cors() {
    let req = Request::parse("https://cdn.example.com/lib.js").unwrap();
    assert_eq!(
      response_kind(&origin(), &req, &acao("https://notes.test")),
      ResponseKind::Cors
    );
  }

  #[test]
  fn test_cross_origin_without_cors_is_opaque() {
    let req = Request::parse("https://cdn.example.com/lib.js").unwrap();
    assert_eq!(response_kind(&origin(), &req, &[]), ResponseKind::Opaque);
    assert_eq!(
      response_kind(&origin(), &req, &acao("https://other.test")),
      ResponseKind::Opaque
    );
  }

  #[test]
  fn test_navigation_is_basic() {
    let req = Request::navigate(Url::parse("https://elsewhere.test/").unwrap());
    assert_eq!(response_kind(&origin(), &req, &[]), ResponseKind::Basic);
  }

  fn client(origin: &str) -> HttpNetwork {
    HttpNetwork::new(Url::parse(origin).unwrap(), &NetworkConfig::default()).unwrap()
  }

  #[tokio::test]
  async fn test_perform_captures_status_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/style.css"))
      .and(header("user-agent", "shellcache-test"))
      .respond_with(ResponseTemplate::new(200).set_body_raw("body{}", "text/css"))
      .mount(&server)
      .await;

    let config = NetworkConfig {
      user_agent: Some("shellcache-test".to_string()),
      ..NetworkConfig::default()
    };
    let network = HttpNetwork::new(Url::parse(&server.uri()).unwrap(), &config).unwrap();
    let request = Request::parse(&format!("{}/style.css", server.uri())).unwrap();

    let response = network.fetch(&request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.kind, ResponseKind::Basic);
    assert_eq!(response.content_type(), Some("text/css"));
    assert_eq!(response.body.as_bytes(), b"body{}");
  }

  #[tokio::test]
  async fn test_error_status_is_a_response_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/missing"))
      .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/broken"))
      .respond_with(ResponseTemplate::new(500))
      .mount(&server)
      .await;

    let network = client(&server.uri());
    let missing = Request::parse(&format!("{}/missing", server.uri())).unwrap();
    let broken = Request::parse(&format!("{}/broken", server.uri())).unwrap();

    let response = network.fetch(&missing).await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.body.as_bytes(), b"nope");
    assert_eq!(network.fetch(&broken).await.unwrap().status, 500);
  }

  #[tokio::test]
  async fn test_cross_origin_kind_follows_allow_origin_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/open.js"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_string("open()")
          .insert_header("access-control-allow-origin", "*"),
      )
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/closed.js"))
      .respond_with(ResponseTemplate::new(200).set_body_string("closed()"))
      .mount(&server)
      .await;

    let network = client("https://notes.test");
    let open = Request::parse(&format!("{}/open.js", server.uri())).unwrap();
    let closed = Request::parse(&format!("{}/closed.js", server.uri())).unwrap();

    assert_eq!(network.fetch(&open).await.unwrap().kind, ResponseKind::Cors);
    assert_eq!(network.fetch(&closed).await.unwrap().kind, ResponseKind::Opaque);
  }

  #[tokio::test]
  async fn test_refused_connection_is_an_error() {
    let port = {
      let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
      listener.local_addr().unwrap().port()
    };
    let network = client("https://notes.test");
    let request = Request::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();

    let err = network.fetch(&request).await.unwrap_err();
    assert!(err.to_string().contains("Failed to fetch"));
  }
}
