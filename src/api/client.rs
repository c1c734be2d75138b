use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::models::{
    AuthRequest, AuthResponse, CreateVideo, DeleteAck, ErrorBody, ProcessAck, TagList,
    TicketRequest, UploadTicket, VideoFilter, VideoList, VideoRecord, VideoStatus,
};
use crate::api::VideoBackend;
use crate::auth::CredentialStore;
use crate::config::Settings;
use crate::monitor::StatusSource;
use crate::{Result, VidjotError};

/// Path of the upload-ticket endpoint
const UPLOAD_TICKET_PATH: &str = "/videos/upload-url";

/// HTTP client for the video journal backend.
///
/// Every call except [`ApiClient::authenticate`] carries the stored bearer
/// token. A `401` from any of them invalidates the credential store before
/// the [`VidjotError::Auth`] error is returned.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    credentials: CredentialStore,
}

impl ApiClient {
    pub fn new(base_url: &str, credentials: CredentialStore, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(VidjotError::Config("api.base_url is empty".to_string()));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VidjotError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    pub fn from_settings(settings: &Settings, credentials: CredentialStore) -> Result<Self> {
        Self::new(&settings.api.base_url, credentials, settings.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange the journal password for a bearer token and remember it
    pub async fn authenticate(&self, password: &str) -> Result<()> {
        let response = self
            .http
            .post(self.build_url("/auth"))
            .json(&AuthRequest { password })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(VidjotError::Auth("incorrect password".to_string()));
        }

        let response = self.check_status(response).await?;
        let auth: AuthResponse = response.json().await?;
        self.credentials.store(auth.access_token)?;
        Ok(())
    }

    pub async fn list_videos(&self, filter: &VideoFilter) -> Result<VideoList> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(status) = filter.status {
            query.push(("status", status.as_str().to_string()));
        }
        if let Some(tag) = &filter.tag {
            query.push(("tag", tag.clone()));
        }
        if let Some(limit) = filter.limit {
            query.push(("limit", limit.to_string()));
        }

        let request = self.http.get(self.build_url("/videos")).query(&query);
        self.send_json(request).await
    }

    pub async fn get_video(&self, video_id: &str) -> Result<VideoRecord> {
        let request = self.http.get(self.build_url(&format!("/videos/{}", video_id)));
        self.send_json(request).await
    }

    pub async fn delete_video(&self, video_id: &str) -> Result<DeleteAck> {
        let request = self
            .http
            .delete(self.build_url(&format!("/videos/{}", video_id)));
        self.send_json(request).await
    }

    pub async fn list_tags(&self) -> Result<TagList> {
        let request = self.http.get(self.build_url("/videos/tags"));
        self.send_json(request).await
    }

    /// Unauthenticated liveness probe
    pub async fn health(&self) -> Result<()> {
        let response = self.http.get(self.build_url("/health")).send().await?;
        self.check_status(response).await?;
        Ok(())
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        match self.credentials.token() {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Err(VidjotError::Auth(
                "no stored credentials, run `vidjot login`".to_string(),
            )),
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.authorize(request)?.send().await?;
        let response = self.check_status(response).await?;
        let body = response.json().await?;
        Ok(body)
    }

    async fn check_status(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_string();
        let message = error_message(response).await;

        if status == StatusCode::UNAUTHORIZED {
            warn!("Backend rejected credentials on {}: {}", url, message);
            self.credentials.invalidate();
            return Err(VidjotError::Auth(message));
        }

        if status == StatusCode::NOT_FOUND {
            return Err(VidjotError::NotFound(message));
        }

        debug!("{} failed with status {}: {}", url, status, message);
        Err(VidjotError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

async fn error_message(response: Response) -> String {
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if text.trim().is_empty() => "Unknown error".to_string(),
        Err(_) => text,
    }
}

#[async_trait]
impl VideoBackend for ApiClient {
    async fn request_upload_ticket(&self, filename: &str, content_type: &str) -> Result<UploadTicket> {
        let request = self
            .http
            .post(self.build_url(UPLOAD_TICKET_PATH))
            .json(&TicketRequest {
                filename,
                content_type,
            });
        self.send_json(request).await
    }

    async fn create_video(&self, video: &CreateVideo) -> Result<VideoRecord> {
        let request = self.http.post(self.build_url("/videos")).json(video);
        self.send_json(request).await
    }

    async fn start_processing(&self, video_id: &str) -> Result<ProcessAck> {
        let request = self
            .http
            .post(self.build_url(&format!("/videos/{}/process", video_id)));
        self.send_json(request).await
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, video_id: &str) -> Result<VideoStatus> {
        self.get_video(video_id)
            .await
            .map(|video| video.status)
            .map_err(|e| e.reclassify(VidjotError::Poll))
    }
}
