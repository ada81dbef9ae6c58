use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use jibe_types::{
    ChatMessage, CreateReferralRequest, ErrorBody, GenerateAccepted, GenerateRequest,
    PointsHistoryResponse, PointsStats, PointsStatsResponse, Referral, ReferralResponse,
    ShareStats, ShareStatsResponse, StatusResponse,
};

use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Bearer-authenticated client for the `/api` routes.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(concat!("jibe-client/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Self::with_client(http, base_url, token)
    }

    pub fn with_client(
        http: Client,
        base_url: &str,
        token: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalized).map_err(|_| ClientError::InvalidUrl(base_url.to_owned()))?;
        Ok(Self {
            http,
            base_url,
            token: token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|_| ClientError::InvalidUrl(format!("{}{path}", self.base_url)))
    }

    /// Submit a conversation; returns the id of the queued task.
    pub async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, ClientError> {
        let resp = self
            .http
            .post(self.endpoint("api/generate")?)
            .bearer_auth(&self.token)
            .json(&GenerateRequest { messages })
            .send()
            .await?;
        let accepted: GenerateAccepted = decode(resp).await?;
        debug!(task_id = %accepted.task_id, "generation accepted");
        Ok(accepted.task_id)
    }

    /// Current state of one task.  A `failed` task is a normal answer here.
    pub async fn status(&self, task_id: &str) -> Result<StatusResponse, ClientError> {
        let mut url = self.endpoint("api/generate/status")?;
        url.query_pairs_mut().append_pair("taskId", task_id);
        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;
        decode(resp).await
    }

    pub async fn points_stats(&self) -> Result<PointsStats, ClientError> {
        let resp = self
            .http
            .get(self.endpoint("api/points/stats")?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body: PointsStatsResponse = decode(resp).await?;
        Ok(body.data)
    }

    pub async fn points_history(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<PointsHistoryResponse, ClientError> {
        let mut url = self.endpoint("api/points/history")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("pageSize", &page_size.to_string());
        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;
        decode(resp).await
    }

    /// Click and referral counts plus the caller's own share link.
    pub async fn share_stats(&self) -> Result<ShareStats, ClientError> {
        let resp = self
            .http
            .get(self.endpoint("api/share/stats")?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let body: ShareStatsResponse = decode(resp).await?;
        Ok(body.data)
    }

    /// Record that the caller was referred by `referrer_id`.
    pub async fn create_referral(&self, referrer_id: &str) -> Result<Referral, ClientError> {
        let resp = self
            .http
            .post(self.endpoint("api/referral/create")?)
            .bearer_auth(&self.token)
            .json(&CreateReferralRequest {
                referrer_id: Some(referrer_id.to_owned()),
            })
            .send()
            .await?;
        let body: ReferralResponse = decode(resp).await?;
        Ok(body.data)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json::<T>().await?);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
