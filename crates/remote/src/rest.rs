//! REST implementation of [`RemoteService`].
//!
//! `RestRemoteService` wraps a `reqwest::Client` and maps every trait
//! method onto the orchestration API, with retry and exponential back-off
//! on transient (5xx / timeout / connect) failures.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use nx_domain::config::RemoteConfig;
use nx_domain::error::{Error, Result};
use nx_domain::trace::TraceEvent;

use crate::provider::RemoteService;
use crate::types::{
    AuthResponse, CreateGroupRequest, CreatePipelineRequest, CreatedResponse,
    ExecutePipelineRequest, LoginRequest, RegisterRequest, SpawnWorkerRequest, TaskRequest,
    TaskResponse,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// REST client for the orchestration service.
///
/// Created once per process; the inner `reqwest::Client` pools connections.
#[derive(Debug, Clone)]
pub struct RestRemoteService {
    http: Client,
    base_url: String,
    max_retries: u32,
}

impl RestRemoteService {
    pub fn new(cfg: &RemoteConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            max_retries: cfg.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── request helpers ──────────────────────────────────────────────

    fn decorate(&self, rb: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let rb = rb
            .header("X-Client-Type", "nexus-bridge")
            .header("X-Trace-Id", Uuid::new_v4().to_string());
        match token {
            Some(t) => rb.bearer_auth(t),
            None => rb,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── retry engine ─────────────────────────────────────────────────

    /// Execute a request with retry + exponential back-off.
    ///
    /// * 5xx, timeouts and connection failures are retried.
    /// * 401/403 map to `InvalidCredentials`, other 4xx to `RemoteRejected`;
    ///   neither is retried.
    /// * Emits a `TraceEvent::RemoteCall` after every attempt.
    #[tracing::instrument(skip_all, fields(endpoint = %endpoint))]
    async fn execute_with_retry(
        &self,
        endpoint: &str,
        token: Option<&str>,
        build_request: impl Fn() -> RequestBuilder,
    ) -> Result<Response> {
        let mut last_err: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }

            let start = Instant::now();
            let result = self.decorate(build_request(), token).send().await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    let status = resp.status();
                    TraceEvent::RemoteCall {
                        endpoint: endpoint.to_owned(),
                        status: status.as_u16(),
                        duration_ms,
                    }
                    .emit();

                    if status.is_server_error() {
                        let body = resp.text().await.unwrap_or_default();
                        tracing::warn!(endpoint, %status, attempt, "transient remote failure");
                        last_err = Some(Error::RemoteUnavailable(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                        continue;
                    }

                    if status.is_client_error() {
                        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                            return Err(Error::InvalidCredentials);
                        }
                        let body = resp.text().await.unwrap_or_default();
                        return Err(Error::RemoteRejected(format!(
                            "{endpoint} returned {status}: {body}"
                        )));
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    TraceEvent::RemoteCall {
                        endpoint: endpoint.to_owned(),
                        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                        duration_ms,
                    }
                    .emit();
                    tracing::warn!(endpoint, attempt, error = %e, "remote call failed");
                    last_err = Some(from_reqwest(e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::RemoteUnavailable(format!("{endpoint}: all retries exhausted"))
        }))
    }

    async fn post_json<B, T>(&self, path: &str, token: Option<&str>, body: &B) -> Result<T>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.url(path);
        let endpoint = format!("POST {path}");
        let resp = self
            .execute_with_retry(&endpoint, token, || self.http.post(&url).json(body))
            .await?;
        decode(resp, &endpoint).await
    }
}

async fn decode<T: DeserializeOwned + Send>(resp: Response, endpoint: &str) -> Result<T> {
    let body = resp.text().await.map_err(from_reqwest)?;
    serde_json::from_str(&body)
        .map_err(|e| Error::Other(format!("failed to parse {endpoint} response: {e}: {body}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait]
impl RemoteService for RestRemoteService {
    async fn register(&self, req: RegisterRequest) -> Result<AuthResponse> {
        self.post_json("/api/auth/register", None, &req).await
    }

    async fn login(&self, req: LoginRequest) -> Result<AuthResponse> {
        self.post_json("/api/auth/login", None, &req).await
    }

    async fn logout(&self, token: &str) -> Result<()> {
        let url = self.url("/api/auth/logout");
        self.execute_with_retry("POST /api/auth/logout", Some(token), || {
            self.http.post(&url)
        })
        .await?;
        Ok(())
    }

    async fn create_group(
        &self,
        token: &str,
        req: CreateGroupRequest,
    ) -> Result<CreatedResponse> {
        self.post_json("/api/groups", Some(token), &req).await
    }

    async fn spawn_worker(
        &self,
        token: &str,
        group_id: &str,
        req: SpawnWorkerRequest,
    ) -> Result<CreatedResponse> {
        self.post_json(&format!("/api/groups/{group_id}/workers"), Some(token), &req)
            .await
    }

    async fn create_pipeline(
        &self,
        token: &str,
        req: CreatePipelineRequest,
    ) -> Result<CreatedResponse> {
        self.post_json("/api/pipelines", Some(token), &req).await
    }

    async fn execute_pipeline(
        &self,
        token: &str,
        pipeline_id: &str,
        req: ExecutePipelineRequest,
    ) -> Result<TaskResponse> {
        self.post_json(
            &format!("/api/pipelines/{pipeline_id}/execute"),
            Some(token),
            &req,
        )
        .await
    }

    async fn orchestrate_task(&self, token: &str, req: TaskRequest) -> Result<TaskResponse> {
        self.post_json("/api/tasks", Some(token), &req).await
    }

    async fn task_status(&self, token: &str, task_id: &str) -> Result<TaskResponse> {
        let path = format!("/api/tasks/{task_id}");
        let url = self.url(&path);
        let endpoint = format!("GET {path}");
        let resp = self
            .execute_with_retry(&endpoint, Some(token), || self.http.get(&url))
            .await?;
        decode(resp, &endpoint).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error conversion helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Transport failures (timeout, refused connection, broken body) all
/// surface as `RemoteUnavailable`.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::RemoteUnavailable(format!("timed out: {e}"))
    } else {
        Error::RemoteUnavailable(e.to_string())
    }
}
