//! Types describing cache generations and their stored responses.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};

use crate::http::Response;

/// Lifecycle state of a stored generation.
///
/// A generation is written as `Installed` and promoted to `Active` on activation.
/// Superseded generations are deleted during activation, so they are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
  Installed,
  Active,
}

impl GenerationState {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Installed => "installed",
      Self::Active => "active",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "installed" => Some(Self::Installed),
      "active" => Some(Self::Active),
      _ => None,
    }
  }
}

/// Summary of one stored generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInfo {
  pub tag: String,
  pub state: GenerationState,
  pub created_at: DateTime<Utc>,
  pub entries: usize,
}

/// A precached response, keyed by the absolute URL it was fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub url: String,
  pub status: u16,
  /// Header values as raw bytes; they are not required to be UTF-8.
  pub headers: Vec<(String, Vec<u8>)>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn from_response(url: &url::Url, response: &Response) -> Self {
    let headers = response
      .headers
      .iter()
      .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
      .collect();

    Self {
      url: cache_key(url),
      status: response.status.as_u16(),
      headers,
      body: response.body.clone(),
    }
  }

  /// Content address of the body.
  pub fn body_hash(&self) -> String {
    hex::encode(Sha256::digest(&self.body))
  }

  pub fn into_response(self) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in &self.headers {
      if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_bytes(value),
      ) {
        headers.append(name, value);
      }
    }
    let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
    Response::new(status, headers, self.body)
  }
}

/// Lookup key for a URL: the absolute URL without its fragment.
pub fn cache_key(url: &url::Url) -> String {
  let mut url = url.clone();
  url.set_fragment(None);
  url.to_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::CONTENT_TYPE;

  #[test]
  fn test_cache_key_drops_fragment() {
    let url = url::Url::parse("https://hb.example/static/styles.css?v=2#top").unwrap();
    assert_eq!(cache_key(&url), "https://hb.example/static/styles.css?v=2");
  }

  #[test]
  fn test_stored_response_keeps_headers_and_body() {
    let url = url::Url::parse("https://hb.example/").unwrap();
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    let response = Response::new(StatusCode::OK, headers, b"<html>".to_vec());

    let cached = CachedResponse::from_response(&url, &response);
    assert_eq!(cached.url, "https://hb.example/");
    assert_eq!(cached.into_response(), response);
  }

  #[test]
  fn test_body_hash_is_content_address() {
    let a = CachedResponse {
      url: "https://hb.example/a".into(),
      status: 200,
      headers: vec![],
      body: b"same".to_vec(),
    };
    let b = CachedResponse {
      url: "https://hb.example/b".into(),
      ..a.clone()
    };
    assert_eq!(a.body_hash(), b.body_hash());
    assert_eq!(a.body_hash().len(), 64);
  }
}
