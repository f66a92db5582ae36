//! The offline worker: lifecycle, fetch interception and replay wired together.

use std::sync::Arc;
use thiserror::Error;
use url::Url;

use crate::cache::{cache_key, GenerationStorage};
use crate::classify::{Classifier, RequestClass};
use crate::db::{StoreError, StoreHandle};
use crate::event::{Completion, Event};
use crate::form::{FormError, FormFields};
use crate::host::{Host, Network, SyncRegistrar, TransportError};
use crate::http::{Request, Response};
use crate::lifecycle::{ActivateError, InstallError, LifecycleManager};
use crate::outbox::Outbox;
use crate::replay::ReplayEngine;

/// Failure of a single event. Other events are unaffected.
#[derive(Debug, Error)]
pub enum WorkerError {
  #[error(transparent)]
  Install(#[from] InstallError),
  #[error(transparent)]
  Activate(#[from] ActivateError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Transport(#[from] TransportError),
  #[error("cannot queue submission: {0}")]
  Form(#[from] FormError),
  #[error("event loop stopped before the event completed")]
  Closed,
}

/// Deployment-specific values the worker needs.
#[derive(Debug, Clone)]
pub struct Settings {
  pub origin: Url,
  /// Tag of the generation this build installs
  pub version: String,
  pub precache: Vec<String>,
  pub mutation_path: String,
  pub sync_tag: String,
  pub queued_message: String,
}

pub struct Worker<S: GenerationStorage> {
  classifier: Classifier,
  generations: Arc<S>,
  outbox: Outbox,
  replay: ReplayEngine,
  lifecycle: LifecycleManager<S>,
  network: Arc<dyn Network>,
  registrar: Arc<dyn SyncRegistrar>,
  sync_tag: String,
  queued_message: String,
}

impl<S: GenerationStorage> Worker<S> {
  pub fn new(settings: Settings, generations: Arc<S>, store: Arc<StoreHandle>, host: Host) -> Self {
    let outbox = Outbox::new(Arc::clone(&store));
    let replay = ReplayEngine::new(
      outbox.clone(),
      Arc::clone(&host.network),
      settings.origin.clone(),
    );
    let lifecycle = LifecycleManager::new(
      Arc::clone(&generations),
      store,
      Arc::clone(&host.network),
      host.clients,
      settings.origin.clone(),
      settings.version,
      settings.precache,
    );

    Self {
      classifier: Classifier::new(&settings.origin, settings.mutation_path),
      generations,
      outbox,
      replay,
      lifecycle,
      network: host.network,
      registrar: host.registrar,
      sync_tag: settings.sync_tag,
      queued_message: settings.queued_message,
    }
  }

  pub fn outbox(&self) -> &Outbox {
    &self.outbox
  }

  pub fn generations(&self) -> &S {
    &self.generations
  }

  /// Handle one host event to completion.
  pub async fn handle(&self, event: Event) -> Result<Completion, WorkerError> {
    match event {
      Event::Install => {
        self.lifecycle.install().await?;
        Ok(Completion::Installed)
      }
      Event::Activate => {
        self.lifecycle.activate().await?;
        Ok(Completion::Activated)
      }
      Event::Fetch(request) => Ok(Completion::Responded(self.fetch(request).await?)),
      Event::ConnectivityTrigger(tag) => {
        if tag != self.sync_tag {
          tracing::debug!(tag = %tag, "ignoring trigger for unknown channel");
          return Ok(Completion::Ignored);
        }
        Ok(Completion::Replayed(self.replay.run().await?))
      }
    }
  }

  /// Produce the response for an intercepted request.
  pub async fn fetch(&self, request: Request) -> Result<Response, WorkerError> {
    let class = self.classifier.classify(&request);
    tracing::debug!(method = %request.method, url = %request.url, ?class, "fetch");

    match class {
      RequestClass::AssetFetch => self.fetch_asset(request).await,
      RequestClass::MutationSubmit => self.submit_mutation(request).await,
      RequestClass::Passthrough => Ok(self.network.send(request).await?),
    }
  }

  /// Cache-first; misses go to the network and are not stored.
  async fn fetch_asset(&self, request: Request) -> Result<Response, WorkerError> {
    if let Some(cached) = self.generations.lookup(&cache_key(&request.url))? {
      tracing::debug!(url = %request.url, "served from cache");
      return Ok(cached.into_response());
    }
    Ok(self.network.send(request).await?)
  }

  /// Network-first; a transport failure queues the submission and answers 202.
  async fn submit_mutation(&self, request: Request) -> Result<Response, WorkerError> {
    let target_path = request.url.path().to_string();
    let content_type = request.content_type().map(str::to_string);
    let body = request.body.clone();

    let error = match self.network.send(request).await {
      Ok(response) => return Ok(response),
      Err(e) => e,
    };
    tracing::info!(path = %target_path, error = %error, "submission failed offline, queueing");

    let payload = FormFields::from_body(content_type.as_deref(), &body)?;
    self.outbox.enqueue(&target_path, &payload).await?;

    // Best effort: the caller is told the entry is queued whether or not this works.
    if let Err(e) = self.registrar.register(&self.sync_tag).await {
      tracing::debug!(tag = %self.sync_tag, error = %e, "sync registration refused");
    }

    Ok(Response::queued(&self.queued_message))
  }
}
