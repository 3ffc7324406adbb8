//! [`HttpPublisher`]: delivers domain events to a message broker over HTTP.

use std::{collections::HashMap, time::Duration};

use anyhow::Context as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use visits_core::event::EventPublisher;

/// Posts each event to `{endpoint}/topics/{topic}/messages`.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpPublisher {
  client:   Client,
  endpoint: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
  message_id: String,
}

impl HttpPublisher {
  pub fn new(endpoint: impl Into<String>) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, endpoint: endpoint.into() })
  }

  fn url(&self, topic: &str) -> String {
    format!("{}/topics/{topic}/messages", self.endpoint.trim_end_matches('/'))
  }
}

impl EventPublisher for HttpPublisher {
  type Error = reqwest::Error;

  async fn publish(
    &self,
    topic: &str,
    payload: String,
    attributes: HashMap<String, String>,
  ) -> Result<String, Self::Error> {
    let resp = self
      .client
      .post(self.url(topic))
      .json(&json!({ "message": payload, "messageAttributes": attributes }))
      .send()
      .await?
      .error_for_status()?;
    let body: PublishResponse = resp.json().await?;
    Ok(body.message_id)
  }
}
