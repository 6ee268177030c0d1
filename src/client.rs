// Client side of the CLI: talks to a running node's HTTP API.

use anyhow::{bail, Context, Result};
use tom::{MessageId, SendRequest};

fn url(node: &str, path: &str) -> String {
    format!("{}/multicast/{path}", node.trim_end_matches('/'))
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("node answered {status}: {body}")
}

pub async fn send(node: &str, payload: String) -> Result<MessageId> {
    let response = reqwest::Client::new()
        .post(url(node, "send"))
        .json(&SendRequest { payload })
        .send()
        .await
        .with_context(|| format!("could not reach {node}"))?;

    check(response)
        .await?
        .json()
        .await
        .context("unexpected response to send")
}

pub async fn status(node: &str) -> Result<serde_json::Value> {
    let response = reqwest::get(url(node, "status"))
        .await
        .with_context(|| format!("could not reach {node}"))?;

    check(response)
        .await?
        .json()
        .await
        .context("unexpected status response")
}
