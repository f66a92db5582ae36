use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::cache::GenerationStorage;
use crate::http::{Request, Response};
use crate::replay::ReplayReport;
use crate::worker::{Worker, WorkerError};

/// Events delivered by the host
#[derive(Debug)]
pub enum Event {
  /// A new build was deployed; precache its shell
  Install,
  /// The installed build takes over
  Activate,
  /// An application request to intercept
  Fetch(Request),
  /// Connectivity likely restored on the named channel
  ConnectivityTrigger(String),
}

/// What a completed event produced
#[derive(Debug)]
pub enum Completion {
  Installed,
  Activated,
  Responded(Response),
  Replayed(ReplayReport),
  /// Trigger for a channel this worker does not own
  Ignored,
}

struct Dispatch {
  event: Event,
  done: oneshot::Sender<Result<Completion, WorkerError>>,
}

/// Host-facing event loop.
///
/// Each event runs on its own task, so fetches interleave freely. The caller of
/// [`EventHandler::dispatch`] is only released once the handler has finished, and
/// the handler's error becomes the event's failure.
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Dispatch>,
}

impl EventHandler {
  pub fn new<S: GenerationStorage>(worker: Arc<Worker<S>>) -> Self {
    let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();

    tokio::spawn(async move {
      while let Some(Dispatch { event, done }) = rx.recv().await {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
          let result = worker.handle(event).await;
          // The host may have stopped waiting
          let _ = done.send(result);
        });
      }
    });

    Self { tx }
  }

  /// Deliver an event and wait until it is done.
  pub async fn dispatch(&self, event: Event) -> Result<Completion, WorkerError> {
    let (done, wait) = oneshot::channel();
    self
      .tx
      .send(Dispatch { event, done })
      .map_err(|_| WorkerError::Closed)?;
    wait.await.map_err(|_| WorkerError::Closed)?
  }
}
