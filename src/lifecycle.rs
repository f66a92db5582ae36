//! Install and activation of cache generations.

use futures::future::try_join_all;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::cache::{CachedResponse, GenerationStorage};
use crate::db::{StoreError, StoreHandle};
use crate::host::{Clients, Network, TransportError};
use crate::http::Request;

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("invalid precache url {url}: {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },
  #[error("failed to fetch {url}: {source}")]
  Unreachable {
    url: String,
    #[source]
    source: TransportError,
  },
  #[error("failed to fetch {url}: status {status}")]
  BadStatus { url: String, status: u16 },
  #[error(transparent)]
  Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ActivateError {
  #[error("generation {0} was never installed")]
  GenerationMissing(String),
  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Creates, activates and retires cache generations.
///
/// The generation tag is injected, so a new deployment only changes configuration.
pub struct LifecycleManager<S: GenerationStorage> {
  generations: Arc<S>,
  store: Arc<StoreHandle>,
  network: Arc<dyn Network>,
  clients: Arc<dyn Clients>,
  origin: Url,
  version: String,
  precache: Vec<String>,
}

impl<S: GenerationStorage> LifecycleManager<S> {
  pub fn new(
    generations: Arc<S>,
    store: Arc<StoreHandle>,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    origin: Url,
    version: String,
    precache: Vec<String>,
  ) -> Self {
    Self {
      generations,
      store,
      network,
      clients,
      origin,
      version,
      precache,
    }
  }

  /// Fetch the whole precache manifest and store it as the configured generation.
  ///
  /// Nothing is written unless every resource answered with a success status, so a
  /// failed install leaves the current generation authoritative.
  pub async fn install(&self) -> Result<(), InstallError> {
    tracing::info!(version = %self.version, resources = self.precache.len(), "installing generation");

    let urls = self
      .precache
      .iter()
      .map(|path| {
        self.origin.join(path).map_err(|source| InstallError::InvalidUrl {
          url: path.clone(),
          source,
        })
      })
      .collect::<Result<Vec<_>, _>>()?;

    let entries = try_join_all(urls.into_iter().map(|url| self.fetch_resource(url))).await?;

    self.generations.put_generation(&self.version, &entries)?;
    tracing::info!(version = %self.version, "generation installed");
    Ok(())
  }

  async fn fetch_resource(&self, url: Url) -> Result<CachedResponse, InstallError> {
    let response = self
      .network
      .send(Request::get(url.clone()).following_redirects())
      .await
      .map_err(|source| InstallError::Unreachable {
        url: url.to_string(),
        source,
      })?;

    if !response.status.is_success() {
      return Err(InstallError::BadStatus {
        url: url.to_string(),
        status: response.status.as_u16(),
      });
    }

    Ok(CachedResponse::from_response(&url, &response))
  }

  /// Promote the configured generation, delete every other one, open the outbox
  /// store and take over open clients.
  pub async fn activate(&self) -> Result<(), ActivateError> {
    let deleted = self
      .generations
      .promote(&self.version)?
      .ok_or_else(|| ActivateError::GenerationMissing(self.version.clone()))?;

    for tag in &deleted {
      tracing::info!(tag = %tag, "deleted superseded generation");
    }

    self.store.get().await?;
    self.clients.claim().await;

    tracing::info!(version = %self.version, "generation active");
    Ok(())
  }
}
