//! Replay of queued submissions when connectivity returns.

use serde::Serialize;
use std::sync::Arc;
use url::Url;

use crate::db::StoreError;
use crate::host::Network;
use crate::http::Request;
use crate::outbox::{Outbox, OutboxEntry};

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
  pub attempted: usize,
  pub delivered: usize,
  pub kept: usize,
}

/// Drains the outbox against the network.
///
/// Entries are attempted one at a time in ascending id order. An entry is removed
/// only after the endpoint accepted it; a failed entry stays queued and the pass
/// moves on. A crash between acceptance and removal means the entry is sent again
/// on the next pass.
#[derive(Clone)]
pub struct ReplayEngine {
  outbox: Outbox,
  network: Arc<dyn Network>,
  origin: Url,
}

impl ReplayEngine {
  pub fn new(outbox: Outbox, network: Arc<dyn Network>, origin: Url) -> Self {
    Self {
      outbox,
      network,
      origin,
    }
  }

  pub async fn run(&self) -> Result<ReplayReport, StoreError> {
    let entries = self.outbox.list_ordered().await?;
    let mut report = ReplayReport::default();

    for entry in entries {
      report.attempted += 1;

      if self.submit(&entry).await {
        self.outbox.delete(entry.id).await?;
        report.delivered += 1;
      } else {
        report.kept += 1;
      }
    }

    tracing::info!(
      attempted = report.attempted,
      delivered = report.delivered,
      kept = report.kept,
      "replay pass finished"
    );
    Ok(report)
  }

  /// Send one entry; true if the endpoint accepted it.
  async fn submit(&self, entry: &OutboxEntry) -> bool {
    let url = match self.origin.join(&entry.target_path) {
      Ok(url) => url,
      Err(e) => {
        tracing::warn!(id = entry.id, path = %entry.target_path, error = %e, "cannot resolve target");
        return false;
      }
    };

    let (content_type, body) = entry.payload.to_multipart();
    let request = Request::post(url, &content_type, body);

    match self.network.send(request).await {
      Ok(response) if response.is_delivered() => {
        tracing::debug!(id = entry.id, status = response.status.as_u16(), "replayed");
        true
      }
      Ok(response) => {
        tracing::warn!(id = entry.id, status = response.status.as_u16(), "replay rejected, keeping entry");
        false
      }
      Err(e) => {
        tracing::debug!(id = entry.id, error = %e, "still offline, keeping entry");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::StoreHandle;
  use crate::form::FormFields;
  use crate::host::fake::{FakeNetwork, Outcome};
  use reqwest::Method;

  fn setup() -> (Outbox, FakeNetwork, ReplayEngine) {
    let outbox = Outbox::new(Arc::new(StoreHandle::in_memory()));
    let network = FakeNetwork::new();
    let engine = ReplayEngine::new(
      outbox.clone(),
      Arc::new(network.clone()),
      Url::parse("https://hb.example/").unwrap(),
    );
    (outbox, network, engine)
  }

  fn amount(value: &str) -> FormFields {
    let mut fields = FormFields::new();
    fields.set("amount", value);
    fields
  }

  #[tokio::test]
  async fn test_failed_entry_stays_and_others_are_removed() {
    let (outbox, network, engine) = setup();
    let first = outbox.enqueue("/add", &amount("1")).await.unwrap();
    let second = outbox.enqueue("/add", &amount("2")).await.unwrap();
    let third = outbox.enqueue("/add", &amount("3")).await.unwrap();

    network.script(Outcome::status(200));
    network.script(Outcome::Offline);
    network.script(Outcome::status(302));

    let report = engine.run().await.unwrap();
    assert_eq!(
      report,
      ReplayReport {
        attempted: 3,
        delivered: 2,
        kept: 1
      }
    );

    let remaining: Vec<i64> = outbox
      .list_ordered()
      .await
      .unwrap()
      .iter()
      .map(|e| e.id)
      .collect();
    assert_eq!(remaining, vec![second]);
    assert!(first < second && second < third);
  }

  #[tokio::test]
  async fn test_entries_replayed_in_id_order_as_multipart_posts() {
    let (outbox, network, engine) = setup();
    outbox.enqueue("/add", &amount("1")).await.unwrap();
    outbox.enqueue("/add", &amount("2")).await.unwrap();
    network.route("https://hb.example/add", crate::host::fake::text(200, "ok"));

    engine.run().await.unwrap();

    let calls = network.calls();
    assert_eq!(calls.len(), 2);
    for (call, expected) in calls.iter().zip(["1", "2"]) {
      assert_eq!(call.method, Method::POST);
      assert_eq!(call.url.as_str(), "https://hb.example/add");
      let fields = FormFields::from_body(call.content_type(), &call.body).unwrap();
      assert_eq!(fields.get("amount"), Some(expected));
    }
  }

  #[tokio::test]
  async fn test_error_status_keeps_entry() {
    let (outbox, network, engine) = setup();
    let id = outbox.enqueue("/add", &amount("1")).await.unwrap();
    network.script(Outcome::status(500));

    let report = engine.run().await.unwrap();
    assert_eq!(report.kept, 1);
    assert_eq!(outbox.list_ordered().await.unwrap()[0].id, id);
  }

  #[tokio::test]
  async fn test_empty_outbox_makes_no_calls() {
    let (_outbox, network, engine) = setup();

    let report = engine.run().await.unwrap();
    assert_eq!(report, ReplayReport::default());
    assert!(network.calls().is_empty());
  }

  #[tokio::test]
  async fn test_offline_pass_keeps_everything_for_next_trigger() {
    let (outbox, network, engine) = setup();
    outbox.enqueue("/add", &amount("1")).await.unwrap();
    outbox.enqueue("/add", &amount("2")).await.unwrap();

    network.set_offline(true);
    engine.run().await.unwrap();
    assert_eq!(outbox.len().await.unwrap(), 2);

    network.set_offline(false);
    network.route("https://hb.example/add", crate::host::fake::text(303, ""));
    let report = engine.run().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(outbox.len().await.unwrap(), 0);
  }
}
