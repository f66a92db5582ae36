//! Form payloads: decoding an intercepted submission body and rebuilding it for replay.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
  #[error("unsupported form content type: {0}")]
  UnsupportedContentType(String),
  #[error("multipart content type has no boundary")]
  MissingBoundary,
  #[error("malformed multipart body: {0}")]
  Malformed(&'static str),
}

/// Ordered field name -> value mapping.
///
/// Setting an existing field replaces its value in place, so each name appears once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    let name = name.into();
    let value = value.into();
    match self.0.iter_mut().find(|(existing, _)| *existing == name) {
      Some(slot) => slot.1 = value,
      None => self.0.push((name, value)),
    }
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self
      .0
      .iter()
      .find(|(existing, _)| existing == name)
      .map(|(_, value)| value.as_str())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Decode a request body according to its `Content-Type`.
  ///
  /// Accepts `multipart/form-data` and `application/x-www-form-urlencoded`.
  /// A body without a content type is only accepted when empty.
  pub fn from_body(content_type: Option<&str>, body: &[u8]) -> Result<Self, FormError> {
    let Some(content_type) = content_type else {
      if body.is_empty() {
        return Ok(Self::new());
      }
      return Err(FormError::UnsupportedContentType(String::new()));
    };

    let mime = content_type
      .split(';')
      .next()
      .unwrap_or_default()
      .trim()
      .to_ascii_lowercase();

    match mime.as_str() {
      "application/x-www-form-urlencoded" => Ok(Self::from_urlencoded(body)),
      "multipart/form-data" => {
        let boundary = boundary_param(content_type).ok_or(FormError::MissingBoundary)?;
        Self::from_multipart(&boundary, body)
      }
      _ => Err(FormError::UnsupportedContentType(mime)),
    }
  }

  fn from_urlencoded(body: &[u8]) -> Self {
    let mut fields = Self::new();
    for (name, value) in url::form_urlencoded::parse(body) {
      fields.set(name, value);
    }
    fields
  }

  fn from_multipart(boundary: &str, body: &[u8]) -> Result<Self, FormError> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let next_delimiter = format!("\r\n--{}", boundary).into_bytes();

    let mut pos = find(body, &delimiter, 0).ok_or(FormError::Malformed("no opening boundary"))?
      + delimiter.len();
    let mut fields = Self::new();

    loop {
      if body[pos..].starts_with(b"--") {
        return Ok(fields);
      }
      if !body[pos..].starts_with(b"\r\n") {
        return Err(FormError::Malformed("boundary not followed by line break"));
      }
      pos += 2;

      let end = find(body, &next_delimiter, pos).ok_or(FormError::Malformed("unterminated part"))?;
      let part = &body[pos..end];

      let split = find(part, b"\r\n\r\n", 0).ok_or(FormError::Malformed("part without headers"))?;
      let headers = String::from_utf8_lossy(&part[..split]);
      let content = &part[split + 4..];

      let name = headers
        .split("\r\n")
        .find(|line| {
          line
            .to_ascii_lowercase()
            .starts_with("content-disposition:")
        })
        .and_then(disposition_name)
        .ok_or(FormError::Malformed("part without a field name"))?;

      fields.set(name, String::from_utf8_lossy(content).into_owned());
      pos = end + next_delimiter.len();
    }
  }

  /// Encode as `multipart/form-data`, returning the content type and the body.
  ///
  /// The boundary is derived from the field contents and never occurs inside them.
  pub fn to_multipart(&self) -> (String, Vec<u8>) {
    let mut hasher = Sha256::new();
    for (name, value) in self.iter() {
      hasher.update(name.as_bytes());
      hasher.update([0u8]);
      hasher.update(value.as_bytes());
      hasher.update([0u8]);
    }
    let mut digest = hasher.finalize().to_vec();

    let boundary = loop {
      let candidate = format!("----hb-sync-{}", hex::encode(&digest[..12]));
      let clashes = self
        .iter()
        .any(|(name, value)| name.contains(&candidate) || value.contains(&candidate));
      if !clashes {
        break candidate;
      }
      digest = Sha256::digest(&digest).to_vec();
    };

    let mut body = Vec::new();
    for (name, value) in self.iter() {
      body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
      body.extend_from_slice(
        format!(
          "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
          escape_name(name)
        )
        .as_bytes(),
      );
      body.extend_from_slice(value.as_bytes());
      body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (format!("multipart/form-data; boundary={}", boundary), body)
  }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
  if from > haystack.len() {
    return None;
  }
  haystack[from..]
    .windows(needle.len())
    .position(|window| window == needle)
    .map(|offset| from + offset)
}

fn boundary_param(content_type: &str) -> Option<String> {
  content_type.split(';').skip(1).find_map(|param| {
    let (key, value) = param.split_once('=')?;
    if !key.trim().eq_ignore_ascii_case("boundary") {
      return None;
    }
    let value = value.trim().trim_matches('"');
    (!value.is_empty()).then(|| value.to_string())
  })
}

fn disposition_name(line: &str) -> Option<String> {
  let (_, params) = line.split_once(':')?;
  header_params(params).into_iter().find_map(|(key, value)| {
    if !key.eq_ignore_ascii_case("name") {
      return None;
    }
    Some(unescape_name(&value))
  })
}

/// Split `; key=value` header parameters. Separators inside quoted values do not
/// count, and backslash escapes inside quotes are resolved.
fn header_params(params: &str) -> Vec<(String, String)> {
  let mut out = Vec::new();
  let mut chars = params.chars().peekable();

  while chars.peek().is_some() {
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut quoted = false;

    while let Some(c) = chars.next() {
      match c {
        '"' if in_value => quoted = !quoted,
        '\\' if quoted => {
          if let Some(escaped) = chars.next() {
            value.push(escaped);
          }
        }
        ';' if !quoted => break,
        '=' if !in_value => in_value = true,
        c if in_value => value.push(c),
        c => key.push(c),
      }
    }

    if in_value {
      out.push((key.trim().to_string(), value.trim().to_string()));
    }
  }

  out
}

// Field names are quoted strings with '"', CR and LF percent-encoded.
fn escape_name(name: &str) -> String {
  name
    .replace('"', "%22")
    .replace('\r', "%0D")
    .replace('\n', "%0A")
}

fn unescape_name(name: &str) -> String {
  name
    .replace("%22", "\"")
    .replace("%0D", "\r")
    .replace("%0A", "\n")
}
