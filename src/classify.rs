//! Routing of intercepted requests to a handling strategy.

use reqwest::Method;
use url::{Origin, Url};

use crate::http::Request;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Same-origin GET, served cache-first
  AssetFetch,
  /// Same-origin POST to the mutation path, queued when offline
  MutationSubmit,
  /// Anything else; goes to the network untouched
  Passthrough,
}

#[derive(Debug, Clone)]
pub struct Classifier {
  origin: Origin,
  mutation_path: String,
}

impl Classifier {
  pub fn new(origin: &Url, mutation_path: impl Into<String>) -> Self {
    Self {
      origin: origin.origin(),
      mutation_path: mutation_path.into(),
    }
  }

  pub fn classify(&self, request: &Request) -> RequestClass {
    if request.url.origin() != self.origin {
      return RequestClass::Passthrough;
    }

    if request.method == Method::POST && request.url.path() == self.mutation_path {
      RequestClass::MutationSubmit
    } else if request.method == Method::GET {
      RequestClass::AssetFetch
    } else {
      RequestClass::Passthrough
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classifier() -> Classifier {
    Classifier::new(&Url::parse("https://hb.example").unwrap(), "/add")
  }

  fn request(method: Method, url: &str) -> Request {
    Request::new(method, Url::parse(url).unwrap())
  }

  #[test]
  fn test_same_origin_get_is_asset() {
    let c = classifier();
    assert_eq!(
      c.classify(&request(Method::GET, "https://hb.example/static/styles.css")),
      RequestClass::AssetFetch
    );
    assert_eq!(
      c.classify(&request(Method::GET, "https://hb.example/add")),
      RequestClass::AssetFetch
    );
  }

  #[test]
  fn test_post_to_mutation_path() {
    let c = classifier();
    assert_eq!(
      c.classify(&request(Method::POST, "https://hb.example/add?from=form")),
      RequestClass::MutationSubmit
    );
    assert_eq!(
      c.classify(&request(Method::POST, "https://hb.example/edit")),
      RequestClass::Passthrough
    );
  }

  #[test]
  fn test_cross_origin_and_other_methods_pass_through() {
    let c = classifier();
    assert_eq!(
      c.classify(&request(Method::GET, "https://cdn.example/lib.js")),
      RequestClass::Passthrough
    );
    assert_eq!(
      c.classify(&request(Method::POST, "http://hb.example/add")),
      RequestClass::Passthrough
    );
    assert_eq!(
      c.classify(&request(Method::DELETE, "https://hb.example/add")),
      RequestClass::Passthrough
    );
  }
}
