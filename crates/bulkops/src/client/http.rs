//! HTTP client wrapper for the directory service REST API

use std::collections::VecDeque;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::sse::SseDecoder;
use super::{DirectoryClient, FrameStream};
use crate::audit::AuditSink;
use crate::config::OrchestratorConfig;
use crate::error::{ClientError, ClientResult};
use crate::models::{
    AuditEntry, Collection, OperationType, ProgressFrame, RollbackCheckpoint, RollbackResponse,
    SubmitResponse,
};

/// REST client for the directory service
#[derive(Debug, Clone)]
pub struct HttpDirectoryClient {
    client: Client,
    /// Client without a total timeout, for long-lived event streams
    stream_client: Client,
    base_url: Url,
    token: Option<String>,
    streaming: bool,
}

impl HttpDirectoryClient {
    /// Create a client from orchestrator configuration
    pub fn new(config: &OrchestratorConfig) -> ClientResult<Self> {
        let base_url = Url::parse(config.base_url())
            .map_err(|e| ClientError::Network(format!("invalid API URL '{}': {e}", config.api_url)))?;

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {e}")))?;

        let stream_client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| ClientError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            stream_client,
            base_url,
            token: config.api_token.clone(),
            streaming: config.streaming_enabled,
        })
    }

    /// Build `<base>/<segments...>` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::Network(format!("API URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ClientResult<T> {
        debug!(%url, "GET");
        let response = self.authorize(self.client.get(url)).send().await?;
        parse_json(response).await
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> ClientResult<T>
    where
        B: serde::Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(%url, "POST");
        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn post_empty(&self, url: Url, body: &serde_json::Value) -> ClientResult<()> {
        debug!(%url, "POST");
        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }
}

async fn api_error(response: Response) -> ClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    ClientError::Api {
        status: status.as_u16(),
        message: body,
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    if response.status().is_success() {
        response.json().await.map_err(Into::into)
    } else {
        Err(api_error(response).await)
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    #[instrument(skip(self, payload))]
    async fn submit(
        &self,
        op_type: OperationType,
        payload: &serde_json::Value,
    ) -> ClientResult<SubmitResponse> {
        let url = self.endpoint(&["api", op_type.as_str()])?;
        debug!(%url, "POST");
        let response = self
            .authorize(self.client.post(url))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(api_error(response).await);
        }
        let body = response.text().await?;
        // Rejections usually still carry `{success: false, error}`
        match serde_json::from_str::<SubmitResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if status.is_success() => Err(ClientError::Decode(format!(
                "submit response is not a valid submit reply: {body}"
            ))),
            Err(_) => Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            }),
        }
    }

    async fn progress(&self, session_id: &str) -> ClientResult<ProgressFrame> {
        let url = self.endpoint(&["api", "progress", session_id])?;
        self.get_json(url).await
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    #[instrument(skip(self))]
    async fn open_stream(&self, session_id: &str) -> ClientResult<FrameStream> {
        let url = self.endpoint(&["api", "progress", session_id, "stream"])?;
        debug!(%url, "GET (event stream)");
        let response = self
            .authorize(self.stream_client.get(url))
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        Ok(frame_stream(response))
    }

    async fn cancel(&self, session_id: &str) -> ClientResult<()> {
        let url = self.endpoint(&["api", "cancel", session_id])?;
        self.post_empty(url, &serde_json::json!({})).await
    }

    #[instrument(skip(self, checkpoint), fields(checkpoint_id = %checkpoint.id))]
    async fn rollback(&self, checkpoint: &RollbackCheckpoint) -> ClientResult<RollbackResponse> {
        let url = self.endpoint(&["api", "delete", "rollback"])?;
        let body = serde_json::json!({
            "checkpointId": checkpoint.id,
            "operationType": checkpoint.operation_type,
            "targetCollectionId": checkpoint.target_collection_id,
            "targetCollectionName": checkpoint.target_collection_name,
            "recordCount": checkpoint.record_count,
        });
        self.post_json(url, &body).await
    }

    async fn get_collection(&self, collection_id: &str) -> ClientResult<Collection> {
        let url = self.endpoint(&["api", "populations", collection_id])?;
        self.get_json(url).await
    }

    async fn ping(&self) -> ClientResult<()> {
        let url = self.endpoint(&["api", "health"])?;
        let response = self.client.get(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(api_error(response).await)
        }
    }
}

#[async_trait]
impl AuditSink for HttpDirectoryClient {
    async fn mirror(&self, entry: &AuditEntry) -> ClientResult<()> {
        let url = self.endpoint(&["api", "audit", "delete"])?;
        let body = serde_json::to_value(entry)?;
        self.post_empty(url, &body).await
    }
}

struct StreamState {
    response: Response,
    decoder: SseDecoder,
    pending: VecDeque<ClientResult<ProgressFrame>>,
    done: bool,
}

fn decode_frame(data: &str) -> ClientResult<ProgressFrame> {
    serde_json::from_str(data).map_err(|e| ClientError::Decode(format!("bad progress frame: {e}")))
}

/// Turn an event-stream response into a stream of decoded frames
fn frame_stream(response: Response) -> FrameStream {
    let state = StreamState {
        response,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.response.chunk().await {
                Ok(Some(chunk)) => {
                    for data in state.decoder.push(&chunk) {
                        state.pending.push_back(decode_frame(&data));
                    }
                }
                Ok(None) => {
                    state.done = true;
                    if let Some(data) = state.decoder.finish() {
                        state.pending.push_back(decode_frame(&data));
                    }
                }
                Err(e) => {
                    state.done = true;
                    state.pending.push_back(Err(e.into()));
                }
            }
        }
    }))
}
