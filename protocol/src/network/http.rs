//! HTTP ledger client.
//!
//! Speaks the node's v2 REST API over `reqwest`. Every request carries the
//! API token header. Response bodies are JSON with kebab-case keys; byte
//! fields (genesis hash, state keys, byte values, compiled programs) are
//! standard base64. Transaction ids and addresses arrive in the node's
//! base32 forms; hex ids and Bech32 addresses are accepted as well.
//!
//! Reads follow the node's JSON shapes, but submitted bytes are this
//! crate's canonical group encoding (see [`crate::transaction::encode_group`]),
//! not the node's msgpack. A stock node will refuse them; the client is meant
//! for nodes or gateways that accept this encoding. When the id a node
//! reports for an accepted group cannot be parsed, the locally computed id of
//! the first member is returned instead.
//!
//! Status code mapping:
//!
//! | Status | Error |
//! |--------|-------|
//! | 400 on submit | [`ClientError::Rejected`] |
//! | 404 | [`ClientError::NotFound`] |
//! | anything else non-2xx | [`ClientError::Http`] (5xx and 429 retryable) |

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::rpc::{
    ApplicationState, ClientError, ConfirmationEffects, LedgerClient, NodeStatus,
    PendingTransaction, ProgramCompiler, StateDelta, TealValue,
};
use crate::config::{API_TOKEN_HEADER, HTTP_REQUEST_TIMEOUT};
use crate::crypto::Address;
use crate::transaction::{decode_group, NetworkParameters, TxId};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ParamsResponse {
    #[serde(default)]
    min_fee: u64,
    last_round: u64,
    genesis_id: String,
    genesis_hash: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StatusResponse {
    last_round: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PendingResponse {
    confirmed_round: Option<u64>,
    #[serde(default)]
    pool_error: String,
    application_index: Option<u64>,
    asset_index: Option<u64>,
    #[serde(default)]
    global_state_delta: Vec<WireDelta>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    key: String,
    value: WireDeltaValue,
}

#[derive(Debug, Deserialize)]
struct WireDeltaValue {
    action: u8,
    #[serde(default)]
    bytes: String,
    #[serde(default)]
    uint: u64,
}

#[derive(Debug, Deserialize)]
struct ApplicationResponse {
    id: u64,
    params: ApplicationParams,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ApplicationParams {
    creator: String,
    #[serde(default)]
    global_state: Vec<WireKeyValue>,
}

#[derive(Debug, Deserialize)]
struct WireKeyValue {
    key: String,
    value: WireTealValue,
}

#[derive(Debug, Deserialize)]
struct WireTealValue {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    bytes: String,
    #[serde(default)]
    uint: u64,
}

#[derive(Debug, Deserialize)]
struct CompileResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`LedgerClient`] backed by a node's REST API.
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    http: Client,
    base_url: String,
    token: String,
}

impl HttpLedgerClient {
    /// Creates a client for `server`, optionally on an explicit `port`.
    ///
    /// `server` includes the scheme, e.g. `http://localhost`.
    pub fn new(server: &str, port: Option<u16>, token: &str) -> Result<Self, ClientError> {
        let server = server.trim_end_matches('/');
        if server.is_empty() {
            return Err(ClientError::Transport("empty server URL".to_string()));
        }
        let base_url = match port {
            Some(port) => format!("{}:{}", server, port),
            None => server.to_string(),
        };
        let http = Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        request
            .header(API_TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!(path, "GET");
        let response = self.send(self.http.get(self.url(path))).await?;
        let response = check_status(response, path).await?;
        read_json(response).await
    }
}

async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text)
}

async fn check_status(response: Response, what: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = error_message(response).await;
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(format!("{}: {}", what, message)));
    }
    Err(ClientError::Http {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

fn decode_b64(field: &str, value: &str) -> Result<Vec<u8>, ClientError> {
    BASE64_STANDARD
        .decode(value)
        .map_err(|e| ClientError::Decode(format!("{}: {}", field, e)))
}

fn decode_key(value: &str) -> Result<String, ClientError> {
    Ok(String::from_utf8_lossy(&decode_b64("key", value)?).into_owned())
}

fn convert_delta(wire: WireDelta) -> Result<StateDelta, ClientError> {
    let key = decode_key(&wire.key)?;
    match wire.value.action {
        1 => Ok(StateDelta::SetBytes {
            key,
            value: decode_b64("bytes", &wire.value.bytes)?,
        }),
        2 => Ok(StateDelta::SetUint {
            key,
            value: wire.value.uint,
        }),
        3 => Ok(StateDelta::Delete { key }),
        other => Err(ClientError::Decode(format!(
            "unknown state delta action {}",
            other
        ))),
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn suggested_params(&self) -> Result<NetworkParameters, ClientError> {
        let wire: ParamsResponse = self.get_json("/v2/transactions/params").await?;
        let hash = decode_b64("genesis-hash", &wire.genesis_hash)?;
        let genesis_hash: [u8; 32] = hash
            .as_slice()
            .try_into()
            .map_err(|_| ClientError::Decode(format!("genesis-hash is {} bytes", hash.len())))?;
        Ok(NetworkParameters::at_round(
            wire.last_round,
            wire.min_fee,
            &wire.genesis_id,
            genesis_hash,
        ))
    }

    async fn send_raw_transactions(&self, bytes: Vec<u8>) -> Result<TxId, ClientError> {
        debug!(bytes = bytes.len(), "POST /v2/transactions");
        let local_id = decode_group(&bytes)
            .ok()
            .and_then(|group| group.first().map(|stx| stx.transaction().id()));
        let request = self
            .http
            .post(self.url("/v2/transactions"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
            .body(bytes);
        let response = self.send(request).await?;

        if response.status() == StatusCode::BAD_REQUEST {
            return Err(ClientError::Rejected(error_message(response).await));
        }
        let response = check_status(response, "send transactions").await?;
        let wire: SendResponse = read_json(response).await?;
        if let Some(id) = TxId::parse(&wire.tx_id) {
            return Ok(id);
        }
        // The group is already accepted, so an odd id must not fail the submit.
        match local_id {
            Some(id) => {
                warn!(reported = %wire.tx_id, local = %id, "unparseable txId, using local id");
                Ok(id)
            }
            None => Err(ClientError::Decode(format!("txId {}", wire.tx_id))),
        }
    }

    async fn pending_transaction(&self, id: &TxId) -> Result<PendingTransaction, ClientError> {
        let wire: PendingResponse = self
            .get_json(&format!("/v2/transactions/pending/{}", id.to_base32()))
            .await?;
        let global_state_delta = wire
            .global_state_delta
            .into_iter()
            .map(convert_delta)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PendingTransaction {
            confirmed_round: wire.confirmed_round.filter(|r| *r > 0),
            pool_error: Some(wire.pool_error).filter(|e| !e.is_empty()),
            effects: ConfirmationEffects {
                created_app_id: wire.application_index,
                created_asset_id: wire.asset_index,
                global_state_delta,
            },
        })
    }

    async fn status(&self) -> Result<NodeStatus, ClientError> {
        let wire: StatusResponse = self.get_json("/v2/status").await?;
        Ok(NodeStatus {
            last_round: wire.last_round,
        })
    }

    async fn status_after_block(&self, round: u64) -> Result<NodeStatus, ClientError> {
        let wire: StatusResponse = self
            .get_json(&format!("/v2/status/wait-for-block-after/{}", round))
            .await?;
        Ok(NodeStatus {
            last_round: wire.last_round,
        })
    }

    async fn application_state(&self, app_id: u64) -> Result<ApplicationState, ClientError> {
        let wire: ApplicationResponse = self
            .get_json(&format!("/v2/applications/{}", app_id))
            .await?;
        let creator = Address::parse_any(&wire.params.creator)
            .map_err(|e| ClientError::Decode(format!("creator: {}", e)))?;

        let mut global_state = BTreeMap::new();
        for kv in wire.params.global_state {
            let value = match kv.value.kind {
                1 => TealValue::Bytes(decode_b64("bytes", &kv.value.bytes)?),
                2 => TealValue::Uint(kv.value.uint),
                other => {
                    return Err(ClientError::Decode(format!(
                        "unknown value type {}",
                        other
                    )))
                }
            };
            global_state.insert(decode_key(&kv.key)?, value);
        }

        Ok(ApplicationState {
            app_id: wire.id,
            creator,
            global_state,
        })
    }
}

#[async_trait]
impl ProgramCompiler for HttpLedgerClient {
    async fn compile(&self, source: &str) -> Result<Vec<u8>, ClientError> {
        debug!(bytes = source.len(), "POST /v2/teal/compile");
        let request = self
            .http
            .post(self.url("/v2/teal/compile"))
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(source.to_string());
        let response = self.send(request).await?;
        if response.status() == StatusCode::BAD_REQUEST {
            return Err(ClientError::Rejected(error_message(response).await));
        }
        let response = check_status(response, "compile").await?;
        let wire: CompileResponse = read_json(response).await?;
        decode_b64("result", &wire.result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
