//! Request and response values exchanged between the host, the worker and the network.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use url::Url;

/// An intercepted request. Bodies are buffered so they can be both sent and queued.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
  /// Follow redirects to the final resource instead of returning the 3xx itself.
  pub follow_redirects: bool,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: HeaderMap::new(),
      body: Vec::new(),
      follow_redirects: false,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn following_redirects(mut self) -> Self {
    self.follow_redirects = true;
    self
  }

  /// Build a POST with the given content type and body.
  pub fn post(url: Url, content_type: &str, body: Vec<u8>) -> Self {
    let mut request = Self::new(Method::POST, url);
    if let Ok(value) = HeaderValue::from_str(content_type) {
      request.headers.insert(CONTENT_TYPE, value);
    }
    request.body = body;
    request
  }

  pub fn content_type(&self) -> Option<&str> {
    self
      .headers
      .get(CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
  }
}

/// A response, either from the network, from a cache generation, or synthesized.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Vec<u8>,
}

#[derive(Serialize)]
struct QueuedNotice<'a> {
  queued: bool,
  message: &'a str,
}

impl Response {
  pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// The `202 Accepted` answer handed back when a submission was put in the outbox.
  pub fn queued(message: &str) -> Self {
    let notice = QueuedNotice {
      queued: true,
      message,
    };
    // Serializing a bool and a str cannot fail.
    let body = serde_json::to_vec(&notice).unwrap_or_default();

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Self::new(StatusCode::ACCEPTED, headers, body)
  }

  /// Whether a replayed submission counts as accepted by the endpoint.
  ///
  /// The endpoint answers a successful form post with a redirect, so 3xx counts too.
  pub fn is_delivered(&self) -> bool {
    self.status.is_success() || self.status.is_redirection()
  }
}
