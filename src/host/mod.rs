//! Platform services the worker consumes: the network, connectivity-trigger
//! registration and client claiming.

mod clients;
mod network;
mod registrar;

#[cfg(test)]
pub mod fake;

pub use clients::LoggingClients;
pub use network::ReqwestNetwork;
pub use registrar::SqliteRegistrar;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::http::{Request, Response};

/// The request never produced an HTTP response (offline, DNS, reset, ...).
#[derive(Debug, Clone, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// The host refused to register a connectivity trigger.
#[derive(Debug, Clone, Error)]
#[error("sync registration rejected: {0}")]
pub struct RegistrationError(pub String);

/// Sends requests to the network.
///
/// Any HTTP status is a successful send; only transport failures are errors.
#[async_trait]
pub trait Network: Send + Sync + 'static {
  async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// Registers interest in a connectivity-trigger channel.
#[async_trait]
pub trait SyncRegistrar: Send + Sync + 'static {
  async fn register(&self, tag: &str) -> Result<(), RegistrationError>;
}

/// Open application contexts the worker can take control of.
#[async_trait]
pub trait Clients: Send + Sync + 'static {
  async fn claim(&self);
}

/// The set of host services handed to the worker.
#[derive(Clone)]
pub struct Host {
  pub network: Arc<dyn Network>,
  pub registrar: Arc<dyn SyncRegistrar>,
  pub clients: Arc<dyn Clients>,
}
