//! Submits audit batches to a ClaimDesk server.

use crate::CliResult;
use clap::Args;
use claimdesk_core::{AuditRecord, AuditSummary, CaseId, ShipmentAuditData, WorkflowOutcome};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080";

/// Connection settings for the ClaimDesk server.
#[derive(Args, Clone, Debug)]
pub struct ServerArgs {
    /// Base URL of the ClaimDesk server.
    #[arg(long, env = "CLAIMDESK_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    pub server_url: String,
    /// API key sent as a bearer token.
    #[arg(long, env = "CLAIMDESK_API_KEY", hide_env_values = true)]
    pub api_key: String,
}

/// Request payload for `POST /api/audits`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditBatchRequest<'a> {
    shipments: &'a [ShipmentAuditData],
}

/// Response of `POST /api/audits`.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedBatch {
    /// Stored batch identifier.
    pub batch_id: String,
    /// Server-side audit records.
    pub records: Vec<AuditRecord>,
    /// Batch totals.
    pub summary: AuditSummary,
    /// Cases opened by workflows.
    pub created_case_ids: Vec<CaseId>,
    /// Fired workflow triggers.
    pub workflow_outcomes: Vec<WorkflowOutcome>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Normalize the server URL for consistent API requests.
pub(crate) fn normalize_server_url(server_url: &str) -> CliResult<String> {
    let trimmed = server_url.trim();
    if trimmed.is_empty() {
        return Err("server url is required".into());
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// HTTP client abstraction for batch submission.
pub(crate) trait AuditApi {
    fn submit_batch<'a>(
        &'a self,
        server_url: &'a str,
        api_key: &'a str,
        shipments: &'a [ShipmentAuditData],
    ) -> Pin<Box<dyn Future<Output = CliResult<SubmittedBatch>> + Send + 'a>>;
}

/// Reqwest-backed server client.
#[cfg_attr(test, allow(dead_code))]
pub(crate) struct ReqwestAuditClient {
    client: Client,
}

impl ReqwestAuditClient {
    /// Build a new reqwest client.
    #[cfg_attr(test, allow(dead_code))]
    pub(crate) fn new() -> CliResult<Self> {
        let client = Client::builder().user_agent("claimdesk-cli").build()?;
        Ok(Self { client })
    }
}

impl AuditApi for ReqwestAuditClient {
    fn submit_batch<'a>(
        &'a self,
        server_url: &'a str,
        api_key: &'a str,
        shipments: &'a [ShipmentAuditData],
    ) -> Pin<Box<dyn Future<Output = CliResult<SubmittedBatch>> + Send + 'a>> {
        Box::pin(submit_batch(&self.client, server_url, api_key, shipments))
    }
}

/// Post a batch to `/api/audits`, surfacing the server's error message.
#[cfg_attr(test, allow(dead_code))]
async fn submit_batch(
    client: &Client,
    server_url: &str,
    api_key: &str,
    shipments: &[ShipmentAuditData],
) -> CliResult<SubmittedBatch> {
    let response = client
        .post(format!("{server_url}/api/audits"))
        .bearer_auth(api_key)
        .json(&AuditBatchRequest { shipments })
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|err| err.message)
            .unwrap_or(body);
        return Err(format!("server rejected batch ({status}): {message}").into());
    }
    Ok(response.json::<SubmittedBatch>().await?)
}

/// Submit shipments with an injected client.
pub(crate) async fn submit_with<C: AuditApi>(
    args: &ServerArgs,
    client: &C,
    shipments: &[ShipmentAuditData],
) -> CliResult<SubmittedBatch> {
    let server_url = normalize_server_url(&args.server_url)?;
    let api_key = args.api_key.trim();
    if api_key.is_empty() {
        return Err("api key is required (set CLAIMDESK_API_KEY)".into());
    }
    if shipments.is_empty() {
        return Err("no shipments to submit".into());
    }
    client.submit_batch(&server_url, api_key, shipments).await
}
