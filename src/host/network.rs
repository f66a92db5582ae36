//! Network access through reqwest.

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use std::sync::Arc;

use super::{Network, TransportError};
use crate::http::{Request, Response};

/// reqwest-backed [`Network`].
///
/// Redirects are only followed when the request asks for it. Otherwise the caller
/// sees the redirect response itself, which is how a replayed form post learns that
/// it was accepted. Cookies set by the origin are kept in one jar for both modes, so
/// queued submissions carry the session.
#[derive(Clone)]
pub struct ReqwestNetwork {
  direct: reqwest::Client,
  following: reqwest::Client,
}

impl ReqwestNetwork {
  pub fn new() -> Result<Self, reqwest::Error> {
    let jar = Arc::new(Jar::default());

    let direct = Self::builder(&jar).redirect(Policy::none()).build()?;
    let following = Self::builder(&jar).redirect(Policy::default()).build()?;

    Ok(Self { direct, following })
  }

  fn builder(jar: &Arc<Jar>) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
      .cookie_provider(Arc::clone(jar))
      .user_agent(concat!("hb-sync/", env!("CARGO_PKG_VERSION")))
  }
}

#[async_trait]
impl Network for ReqwestNetwork {
  async fn send(&self, request: Request) -> Result<Response, TransportError> {
    let method = request.method.clone();
    let url = request.url.clone();
    let client = if request.follow_redirects {
      &self.following
    } else {
      &self.direct
    };

    let response = client
      .request(request.method, request.url)
      .headers(request.headers)
      .body(request.body)
      .send()
      .await
      .map_err(|e| TransportError(e.to_string()))?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
      .bytes()
      .await
      .map_err(|e| TransportError(format!("failed to read response body: {}", e)))?;

    tracing::debug!(%method, %url, status = status.as_u16(), len = body.len(), "network response");

    Ok(Response::new(status, headers, body.to_vec()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::StatusCode;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;
  use url::Url;

  /// Serves `/` as a redirect to `/home`, and `/home` as a page, until dropped.
  async fn redirecting_origin() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
      loop {
        let Ok((mut socket, _)) = listener.accept().await else {
          return;
        };
        tokio::spawn(async move {
          let mut buf = vec![0u8; 4096];
          let mut read = 0;
          while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf[read..]).await {
              Ok(0) | Err(_) => return,
              Ok(n) => read += n,
            }
          }
          let head = String::from_utf8_lossy(&buf[..read]);
          let reply = if head.starts_with("GET /home ") {
            "HTTP/1.1 200 OK\r\ncontent-length: 4\r\nconnection: close\r\n\r\nhome"
          } else {
            "HTTP/1.1 302 Found\r\nlocation: /home\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
          };
          let _ = socket.write_all(reply.as_bytes()).await;
          let _ = socket.shutdown().await;
        });
      }
    });

    Url::parse(&format!("http://{}/", addr)).unwrap()
  }

  #[tokio::test]
  async fn test_redirects_only_followed_on_request() {
    let origin = redirecting_origin().await;
    let network = ReqwestNetwork::new().unwrap();

    let direct = network.send(Request::get(origin.clone())).await.unwrap();
    assert_eq!(direct.status, StatusCode::FOUND);
    assert!(direct.is_delivered());

    let followed = network
      .send(Request::get(origin).following_redirects())
      .await
      .unwrap();
    assert_eq!(followed.status, StatusCode::OK);
    assert_eq!(followed.body, b"home");
  }
}
