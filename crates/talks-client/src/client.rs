use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

use crate::types::{
    AnswerRequest, CreateStreamRequest, DeleteStreamRequest, IceCandidateRequest,
    StartTalkRequest,
};
use crate::{
    IceCandidate, SessionDescription, StreamResponse, TalkScript, TalksApi, TalksError,
};

pub const DEFAULT_API_URL: &str = "https://api.d-id.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Sent verbatim as the `authorization` header, e.g. `Basic <token>`.
    pub authorization: Option<String>,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            authorization: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct TalksClient {
    http: Client,
    base_url: Url,
}

impl TalksClient {
    pub fn new(config: ClientConfig) -> Result<Self, TalksError> {
        let base_url = Url::parse(config.base_url.trim()).map_err(|err| {
            TalksError::InvalidEndpoint(format!("invalid base url {}: {err}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TalksError::InvalidEndpoint(format!(
                "base url {base_url} cannot carry a path"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(credential) = config.authorization.as_deref() {
            let mut value = HeaderValue::from_str(credential).map_err(|_| {
                TalksError::InvalidEndpoint("authorization header contains invalid characters".into())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TalksError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                TalksError::InvalidEndpoint(format!("cannot extend path of {}", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn send_json<B: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<Response, TalksError> {
        let payload = serde_json::to_vec(body).map_err(TalksError::InvalidRequest)?;
        debug!(%method, %url, "sending talks request");
        let response = self.http.request(method, url).body(payload).send().await?;
        trace!(status = %response.status(), "talks response received");
        Ok(response)
    }

    async fn expect_ok(response: Response) -> Result<(), TalksError> {
        let status = response.status();
        if status == StatusCode::OK {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(TalksError::RemoteServer {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl TalksApi for TalksClient {
    async fn create_stream(&self, source_url: &str) -> Result<StreamResponse, TalksError> {
        let url = self.endpoint(&["talks", "streams"])?;
        let response = self
            .send_json(Method::POST, url, &CreateStreamRequest { source_url })
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TalksError::RemoteServer {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(TalksError::EmptyResponse);
        }
        let stream: StreamResponse = serde_json::from_slice(&bytes).map_err(TalksError::Decode)?;
        debug!(
            stream_id = %stream.id,
            ice_servers = stream.ice_servers.len(),
            "talk stream created"
        );
        Ok(stream)
    }

    async fn send_answer(
        &self,
        stream_id: &str,
        session_token: &str,
        answer: &SessionDescription,
    ) -> Result<(), TalksError> {
        let url = self.endpoint(&["talks", "streams", stream_id, "sdp"])?;
        let body = AnswerRequest {
            answer,
            session_id: session_token,
        };
        let response = self.send_json(Method::POST, url, &body).await?;
        Self::expect_ok(response).await
    }

    async fn send_ice_candidate(
        &self,
        stream_id: &str,
        candidate: &IceCandidate,
    ) -> Result<(), TalksError> {
        let url = self.endpoint(&["talks", "streams", stream_id, "ice"])?;
        let body = IceCandidateRequest::new(stream_id, candidate);
        let response = self.send_json(Method::POST, url, &body).await?;
        Self::expect_ok(response).await
    }

    async fn start_talk(
        &self,
        stream_id: &str,
        session_token: &str,
        script: &TalkScript,
    ) -> Result<(), TalksError> {
        let url = self.endpoint(&["talks", "streams", stream_id])?;
        let body = StartTalkRequest {
            script,
            session_id: session_token,
        };
        let response = self.send_json(Method::POST, url, &body).await?;
        Self::expect_ok(response).await
    }

    async fn delete_stream(
        &self,
        stream_id: &str,
        session_token: &str,
    ) -> Result<(), TalksError> {
        let url = self.endpoint(&["talks", "streams", stream_id])?;
        let body = DeleteStreamRequest {
            session_id: session_token,
        };
        let response = self.send_json(Method::DELETE, url, &body).await?;
        Self::expect_ok(response).await
    }
}
