//! Scripted host services for tests.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Clients, Host, Network, RegistrationError, SyncRegistrar, TransportError};
use crate::http::{Request, Response};

/// One scripted network result.
#[derive(Debug, Clone)]
pub enum Outcome {
  Respond(Response),
  Offline,
}

impl Outcome {
  pub fn status(code: u16) -> Self {
    Outcome::Respond(text(code, ""))
  }
}

/// Build a plain response with a body.
pub fn text(code: u16, body: &str) -> Response {
  Response::new(
    StatusCode::from_u16(code).unwrap(),
    HeaderMap::new(),
    body.as_bytes().to_vec(),
  )
}

#[derive(Default)]
struct FakeNetworkState {
  script: VecDeque<Outcome>,
  routes: HashMap<String, Response>,
  offline: bool,
  calls: Vec<Request>,
}

/// Fake network.
///
/// Each send consumes the next scripted outcome if there is one; otherwise it fails
/// when offline, and answers from the route table (404 when unrouted) when online.
#[derive(Clone, Default)]
pub struct FakeNetwork {
  state: Arc<Mutex<FakeNetworkState>>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, url: &str, response: Response) {
    self.lock().routes.insert(url.to_string(), response);
  }

  pub fn script(&self, outcome: Outcome) {
    self.lock().script.push_back(outcome);
  }

  pub fn set_offline(&self, offline: bool) {
    self.lock().offline = offline;
  }

  /// All requests sent so far.
  pub fn calls(&self) -> Vec<Request> {
    self.lock().calls.clone()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, FakeNetworkState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn send(&self, request: Request) -> Result<Response, TransportError> {
    let mut state = self.lock();
    let url = request.url.to_string();
    state.calls.push(request);

    match state.script.pop_front() {
      Some(Outcome::Respond(response)) => return Ok(response),
      Some(Outcome::Offline) => return Err(TransportError("scripted offline".into())),
      None => {}
    }

    if state.offline {
      return Err(TransportError("network unreachable".into()));
    }
    Ok(
      state
        .routes
        .get(&url)
        .cloned()
        .unwrap_or_else(|| text(404, "not found")),
    )
  }
}

/// Fake registrar that records tags and can be told to refuse.
#[derive(Clone, Default)]
pub struct FakeRegistrar {
  tags: Arc<Mutex<Vec<String>>>,
  refuse: Arc<AtomicBool>,
}

impl FakeRegistrar {
  pub fn refuse(&self) {
    self.refuse.store(true, Ordering::SeqCst);
  }

  pub fn tags(&self) -> Vec<String> {
    self.tags.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }
}

#[async_trait]
impl SyncRegistrar for FakeRegistrar {
  async fn register(&self, tag: &str) -> Result<(), RegistrationError> {
    if self.refuse.load(Ordering::SeqCst) {
      return Err(RegistrationError("permission denied".into()));
    }
    self
      .tags
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(tag.to_string());
    Ok(())
  }
}

/// Fake clients counting claims.
#[derive(Clone, Default)]
pub struct FakeClients {
  claims: Arc<AtomicUsize>,
}

impl FakeClients {
  pub fn claims(&self) -> usize {
    self.claims.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Clients for FakeClients {
  async fn claim(&self) {
    self.claims.fetch_add(1, Ordering::SeqCst);
  }
}

/// A [`Host`] wired to fresh fakes, plus handles to inspect them.
pub struct FakeHost {
  pub network: FakeNetwork,
  pub registrar: FakeRegistrar,
  pub clients: FakeClients,
}

impl FakeHost {
  pub fn new() -> Self {
    Self {
      network: FakeNetwork::new(),
      registrar: FakeRegistrar::default(),
      clients: FakeClients::default(),
    }
  }

  pub fn host(&self) -> Host {
    Host {
      network: Arc::new(self.network.clone()),
      registrar: Arc::new(self.registrar.clone()),
      clients: Arc::new(self.clients.clone()),
    }
  }
}
