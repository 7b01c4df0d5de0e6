//! HTTP implementation of the indexer gateway.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{GatewayError, IndexerGateway, ScopeKey};
use crate::config::{Config, PAGE_SIZE};
use crate::domain::{HistoricalPosition, OpenPosition, PaginatedResponse, Position, UnspentNote};
use crate::identity::AuthHeaders;

/// Gateway over the HTTP-style indexer API.
#[derive(Debug, Clone)]
pub struct HttpIndexerGateway {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MetadataEnvelope {
    encrypted_metadata: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotesEnvelope {
    unspent_notes: Vec<UnspentNote>,
}

#[derive(Debug, Deserialize)]
struct OpenPositionsEnvelope {
    open_positions: Vec<OpenPosition>,
}

#[derive(Debug, Deserialize)]
struct PositionEnvelope {
    position: Position,
}

impl HttpIndexerGateway {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    /// Build a gateway honoring the configured request timeout. Fails rather
    /// than falling back to a client without one.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| {
                GatewayError::Unreachable(format!("failed to build HTTP client: {}", err))
            })?;
        Ok(Self {
            client,
            base_url: config.indexer_api_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(request: RequestBuilder, auth: &AuthHeaders) -> RequestBuilder {
        auth.header_pairs()
            .into_iter()
            .fold(request, |req, (name, value)| req.header(name, value))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(classify_transport)?;
        match map_status(response.status()) {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| GatewayError::Parse(err.to_string()))
    }

    fn history_query(cursor: Option<&str>) -> Vec<(String, String)> {
        let mut query = vec![("page_size".to_string(), PAGE_SIZE.to_string())];
        if let Some(cursor) = cursor {
            // Cursors are opaque; forwarded verbatim.
            query.push(("cursor".to_string(), cursor.to_string()));
        }
        query
    }
}

#[async_trait::async_trait]
impl IndexerGateway for HttpIndexerGateway {
    async fn get_metadata(&self, auth: &AuthHeaders) -> Result<Option<String>, GatewayError> {
        debug!("GET /private/metadata");
        let request = Self::with_auth(self.client.get(self.url("/private/metadata")), auth);
        let envelope: MetadataEnvelope = self.get_json(request).await?;
        Ok(envelope.encrypted_metadata)
    }

    async fn post_metadata(&self, auth: &AuthHeaders, blob: &str) -> Result<(), GatewayError> {
        debug!(blob_len = blob.len(), "POST /private/metadata");
        let request = Self::with_auth(self.client.post(self.url("/private/metadata")), auth)
            .header("Content-Type", "text/plain")
            .body(blob.to_string());
        self.send(request).await?;
        Ok(())
    }

    async fn unspent_notes(&self, receiver_hash: &str) -> Result<Vec<UnspentNote>, GatewayError> {
        debug!("GET /private/notes/unspent");
        let request = self
            .client
            .get(self.url("/private/notes/unspent"))
            .header("x-receiver-hash", receiver_hash);
        let envelope: NotesEnvelope = self.get_json(request).await?;
        Ok(envelope.unspent_notes)
    }

    async fn open_positions(&self, scope: &ScopeKey) -> Result<Vec<OpenPosition>, GatewayError> {
        let request = match scope {
            ScopeKey::Public { address } => {
                debug!(address, "GET /positions/open");
                self.client
                    .get(self.url(&format!("/positions/open/{}", address)))
            }
            ScopeKey::Private { auth } => {
                debug!("GET /private/positions/open");
                Self::with_auth(self.client.get(self.url("/private/positions/open")), auth)
            }
        };
        let envelope: OpenPositionsEnvelope = self.get_json(request).await?;
        Ok(envelope.open_positions)
    }

    async fn historical_positions(
        &self,
        scope: &ScopeKey,
        cursor: Option<&str>,
    ) -> Result<PaginatedResponse<HistoricalPosition>, GatewayError> {
        let query = Self::history_query(cursor);
        let request = match scope {
            ScopeKey::Public { address } => {
                debug!(address, ?cursor, "GET /positions/history");
                self.client
                    .get(self.url(&format!("/positions/history/{}", address)))
                    .query(&query)
            }
            ScopeKey::Private { auth } => {
                debug!(?cursor, "GET /private/positions/history");
                Self::with_auth(
                    self.client.get(self.url("/private/positions/history")),
                    auth,
                )
                .query(&query)
            }
        };
        self.get_json(request).await
    }

    async fn position_by_id(&self, position_id: &str) -> Result<Position, GatewayError> {
        debug!(position_id, "GET /positions/{{id}}");
        let request = self
            .client
            .get(self.url(&format!("/positions/{}", position_id)));
        let envelope: PositionEnvelope = self.get_json(request).await?;
        Ok(envelope.position)
    }
}

fn classify_transport(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unreachable(err.to_string())
    }
}

fn map_status(status: StatusCode) -> Option<GatewayError> {
    if status.is_success() {
        return None;
    }
    Some(if status == StatusCode::NOT_FOUND {
        GatewayError::NotFound
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        GatewayError::Unauthorized
    } else if status.is_server_error() {
        GatewayError::ServerError {
            status: status.as_u16(),
        }
    } else {
        GatewayError::Http {
            status: status.as_u16(),
            message: "client error".to_string(),
        }
    })
}
