//! HTTP transport to the pose server.
//!
//! ```text
//! PUT    {base}/sessions        -> CreateSessionResponse
//! POST   {base}/sessions/{id}   TrackingRequest -> TrackingResponse
//! DELETE {base}/sessions/{id}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use tracing::{debug, warn};

use crate::error::ProtocolError;
use crate::messages::{CreateSessionResponse, TrackingRequest, TrackingResponse};

const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// What the server hands back when a session is created.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionGrant {
    pub session_id: String,
    /// Serialized overlay mesh.
    pub model: Vec<u8>,
}

/// Remote pose estimation.  The engine depends on this trait only.
#[async_trait]
pub trait PoseService: Send + Sync {
    async fn create_session(&self) -> Result<SessionGrant, ProtocolError>;

    async fn track(
        &self,
        session_id: &str,
        request: &TrackingRequest,
    ) -> Result<TrackingResponse, ProtocolError>;

    async fn end_session(&self, session_id: &str) -> Result<(), ProtocolError>;
}

/// Trims whitespace and any trailing `/` so paths can be appended directly.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Rejects ids that would escape a URL path segment or a snapshot directory.
pub fn validate_session_id(session_id: &str) -> Result<(), ProtocolError> {
    if session_id.is_empty() {
        return Err(ProtocolError::EmptySessionId);
    }
    let unsafe_char = |c: char| c == '/' || c == '\\' || c.is_control();
    if session_id.contains("..") || session_id.chars().any(unsafe_char) {
        return Err(ProtocolError::InvalidSessionId(session_id.to_string()));
    }
    Ok(())
}

/// [`PoseService`] over HTTP with protobuf bodies.
pub struct HttpPoseService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPoseService {
    /// Every request (connect + body) is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProtocolError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: normalize_base_url(base_url),
            client,
        })
    }

    /// `{base}/sessions[/{id}]`, with the id percent-encoded as one segment.
    fn endpoint(&self, session_id: Option<&str>) -> Result<reqwest::Url, ProtocolError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ProtocolError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ProtocolError::InvalidUrl(self.base_url.clone()))?;
            segments.pop_if_empty().push("sessions");
            if let Some(id) = session_id {
                validate_session_id(id)?;
                segments.push(id);
            }
        }
        Ok(url)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProtocolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
    Err(ProtocolError::ServerError {
        status_code: status.as_u16(),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

#[async_trait]
impl PoseService for HttpPoseService {
    async fn create_session(&self) -> Result<SessionGrant, ProtocolError> {
        let url = self.endpoint(None)?;
        debug!(%url, "creating session");
        let response = check_status(self.client.put(url).send().await?).await?;
        let body = response.bytes().await?;
        let decoded = CreateSessionResponse::decode(body.as_ref())?;
        validate_session_id(&decoded.session_id)?;
        debug!(
            session_id = %decoded.session_id,
            model_bytes = decoded.model.len(),
            "session created"
        );
        Ok(SessionGrant {
            session_id: decoded.session_id,
            model: decoded.model,
        })
    }

    async fn track(
        &self,
        session_id: &str,
        request: &TrackingRequest,
    ) -> Result<TrackingResponse, ProtocolError> {
        let response = self
            .client
            .post(self.endpoint(Some(session_id))?)
            .header(reqwest::header::CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
            .body(request.encode_to_vec())
            .send()
            .await?;
        let body = check_status(response).await?.bytes().await?;
        Ok(TrackingResponse::decode(body.as_ref())?)
    }

    async fn end_session(&self, session_id: &str) -> Result<(), ProtocolError> {
        let url = self.endpoint(Some(session_id))?;
        let response = self.client.delete(url).send().await;
        match response {
            Ok(r) => {
                check_status(r).await?;
                debug!(%session_id, "session ended");
                Ok(())
            }
            Err(e) => {
                warn!(%session_id, error = %e, "session end request failed");
                Err(e.into())
            }
        }
    }
}
