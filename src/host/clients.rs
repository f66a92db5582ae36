use async_trait::async_trait;

use super::Clients;

/// [`Clients`] for hosts without attached application windows; claiming is logged.
#[derive(Clone, Default)]
pub struct LoggingClients;

#[async_trait]
impl Clients for LoggingClients {
  async fn claim(&self) {
    tracing::info!("claimed open clients");
  }
}
