//! Flywheel REST client
//!
//! Implements [`StoragePlatform`] against the Flywheel HTTP API. Requests
//! authenticate with `Authorization: scitran-user <api key>`; transient
//! failures (connection errors, timeouts, 5xx) are retried with exponential
//! backoff.

use super::traits::{
    ConflictMode, JobRequest, ProjectCopyRequest, StoragePlatform, TagTarget,
};
use crate::config::PlatformConfig;
use crate::domain::ids::ContainerId;
use crate::domain::session::{
    Acquisition, CopyStatus, FileEntry, Project, Session, Subject, ViewRow,
};
use crate::domain::{PlatformError, Result, WbhiError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, ClientBuilder, Method, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Flywheel API client
///
/// # Example
///
/// ```no_run
/// use wbhi_sync::adapters::platform::{FlywheelClient, StoragePlatform};
/// use wbhi_sync::config::load_config;
///
/// # async fn example() -> wbhi_sync::domain::Result<()> {
/// let config = load_config("wbhi.toml")?;
/// let client = FlywheelClient::new(&config.platform)?;
/// let project = client.lookup_project("ucsd/Inbound Data").await?;
/// # Ok(())
/// # }
/// ```
pub struct FlywheelClient {
    base_url: Url,
    client: Client,
    config: PlatformConfig,
}

impl FlywheelClient {
    /// Creates a client from platform configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the base URL cannot be parsed or the
    /// HTTP client cannot be built.
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            WbhiError::Configuration(format!("Invalid platform.base_url: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(WbhiError::Configuration(
                "platform.base_url cannot be used as a base URL".to_string(),
            ));
        }
        // Drop a trailing slash so segment pushes do not produce `//`
        if base_url.path().ends_with('/') {
            let trimmed = base_url.path().trim_end_matches('/').to_string();
            base_url.set_path(&trimmed);
        }

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                WbhiError::Configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url,
            client,
            config: config.clone(),
        })
    }

    /// Builds an endpoint URL, percent-encoding each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                WbhiError::Configuration("platform.base_url cannot be a base".to_string())
            })?
            .extend(segments);
        Ok(url)
    }

    fn auth_header_value(&self) -> String {
        format!(
            "scitran-user {}",
            self.config.api_key.expose_secret().as_ref()
        )
    }

    /// Retry a request with exponential backoff
    ///
    /// Only transient platform errors are retried.
    async fn retry_request<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    let transient = matches!(&e, WbhiError::Platform(p) if p.is_transient());
                    if !transient || attempt >= retry.max_retries {
                        return Err(e);
                    }

                    let delay_ms = (retry.initial_delay_ms as f64
                        * retry.backoff_multiplier.powi(attempt as i32 - 1))
                        as u64;
                    let delay_ms = delay_ms.min(retry.max_delay_ms);

                    tracing::warn!(
                        attempt = attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Retrying request after error"
                    );

                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    /// Sends one request and maps non-success statuses to [`PlatformError`]
    async fn execute(&self, method: Method, url: &Url, body: Option<&Value>) -> Result<Response> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header("Authorization", self.auth_header_value());
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PlatformError::Timeout(e.to_string())
            } else {
                PlatformError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let context = format!("{method} {}: {body}", url.path());
        Err(status_error(status, context).into())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<T> {
        let resp = self
            .retry_request(|| self.execute(method.clone(), &url, body.as_ref()))
            .await?;
        decode_json(resp).await
    }

    /// Sends a submission exactly once
    ///
    /// A timed-out submission may already have queued work on the server,
    /// so any retry belongs to the caller.
    async fn submit_once<T: DeserializeOwned>(&self, url: Url, body: Value) -> Result<T> {
        let resp = self.execute(Method::POST, &url, Some(&body)).await?;
        decode_json(resp).await
    }

    async fn send_empty(&self, method: Method, url: Url, body: Option<Value>) -> Result<()> {
        self.retry_request(|| self.execute(method.clone(), &url, body.as_ref()))
            .await?;
        Ok(())
    }

    async fn lookup(&self, path: &str) -> Result<Option<FwLookup>> {
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let url = self.endpoint(&["lookup"])?;
        match self
            .send_json::<FwLookup>(Method::POST, url, Some(json!({ "path": parts })))
            .await
        {
            Ok(found) => Ok(Some(found)),
            Err(WbhiError::Platform(PlatformError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn tag_url(&self, target: &TagTarget, tag: Option<&str>) -> Result<Url> {
        let mut segments: Vec<&str> = match target {
            TagTarget::Session(id) => vec!["sessions", id.as_str(), "tags"],
            TagTarget::Acquisition(id) => vec!["acquisitions", id.as_str(), "tags"],
            TagTarget::File { acquisition, name } => {
                vec!["acquisitions", acquisition.as_str(), "files", name.as_str(), "tags"]
            }
        };
        if let Some(tag) = tag {
            segments.push(tag);
        }
        self.endpoint(&segments)
    }
}

async fn decode_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    resp.json::<T>()
        .await
        .map_err(|e| PlatformError::InvalidResponse(e.to_string()).into())
}

fn status_error(status: StatusCode, context: String) -> PlatformError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::AuthenticationFailed(context)
        }
        StatusCode::NOT_FOUND => PlatformError::NotFound(context),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => PlatformError::Conflict(context),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PlatformError::Timeout(context),
        s if s.is_server_error() => PlatformError::ServerError {
            status: s.as_u16(),
            message: context,
        },
        s => PlatformError::ClientError {
            status: s.as_u16(),
            message: context,
        },
    }
}

fn container_id(raw: &str) -> Result<ContainerId> {
    ContainerId::new(raw).map_err(|e| PlatformError::InvalidResponse(e).into())
}

// Wire types. Flywheel returns `_id` and nests parent references.

#[derive(Debug, Deserialize)]
struct FwLookup {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct FwCreated {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct FwProject {
    #[serde(rename = "_id")]
    id: String,
    group: String,
    label: String,
    #[serde(default)]
    copy_status: Option<String>,
}

impl FwProject {
    fn into_domain(self) -> Result<Project> {
        let copy_status = match self.copy_status.as_deref() {
            Some("in_progress") => CopyStatus::InProgress,
            Some("completed") => CopyStatus::Completed,
            Some("failed") => CopyStatus::Failed,
            _ => CopyStatus::None,
        };
        Ok(Project {
            id: container_id(&self.id)?,
            group: self.group,
            label: self.label,
            copy_status,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct FwParents {
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    session: Option<String>,
}

fn parent(value: Option<&String>, kind: &str, child: &str) -> Result<ContainerId> {
    let raw = value.ok_or_else(|| {
        PlatformError::InvalidResponse(format!("{child} has no parent {kind}"))
    })?;
    container_id(raw)
}

#[derive(Debug, Deserialize)]
struct FwSession {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    parents: FwParents,
}

impl FwSession {
    fn into_domain(self) -> Result<Session> {
        let what = format!("session {}", self.id);
        Ok(Session {
            project: parent(self.parents.project.as_ref(), "project", &what)?,
            subject: parent(self.parents.subject.as_ref(), "subject", &what)?,
            id: container_id(&self.id)?,
            label: self.label,
            timestamp: self.timestamp,
            tags: self.tags,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FwSubject {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    parents: FwParents,
}

impl FwSubject {
    fn into_domain(self) -> Result<Subject> {
        let what = format!("subject {}", self.id);
        Ok(Subject {
            project: parent(self.parents.project.as_ref(), "project", &what)?,
            id: container_id(&self.id)?,
            label: self.label,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FwAcquisition {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    files: Vec<FileEntry>,
    #[serde(default)]
    parents: FwParents,
}

impl FwAcquisition {
    fn into_domain(self) -> Result<Acquisition> {
        let what = format!("acquisition {}", self.id);
        Ok(Acquisition {
            session: parent(self.parents.session.as_ref(), "session", &what)?,
            id: container_id(&self.id)?,
            label: self.label,
            timestamp: self.timestamp,
            tags: self.tags,
            files: self.files,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FwViewData {
    #[serde(default)]
    data: Vec<FwViewRow>,
}

#[derive(Debug, Deserialize)]
struct FwViewRow {
    #[serde(rename = "subject.label", default)]
    subject_label: Option<String>,
    #[serde(rename = "session.label", default)]
    session_label: Option<String>,
    #[serde(rename = "session.timestamp", default)]
    session_timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "acquisition.label", default)]
    acquisition_label: Option<String>,
}

#[async_trait]
impl StoragePlatform for FlywheelClient {
    async fn lookup_project(&self, path: &str) -> Result<Option<Project>> {
        match self.lookup(path).await? {
            Some(found) => {
                let id = container_id(&found.id)?;
                Ok(Some(self.get_project(&id).await?))
            }
            None => Ok(None),
        }
    }

    async fn get_project(&self, id: &ContainerId) -> Result<Project> {
        let url = self.endpoint(&["projects", id.as_str()])?;
        self.send_json::<FwProject>(Method::GET, url, None)
            .await?
            .into_domain()
    }

    async fn create_project(&self, group: &str, label: &str) -> Result<Project> {
        let url = self.endpoint(&["projects"])?;
        let created: FwCreated = self
            .send_json(
                Method::POST,
                url,
                Some(json!({ "group": group, "label": label })),
            )
            .await?;
        tracing::info!(group = %group, label = %label, "Created project");
        self.get_project(&container_id(&created.id)?).await
    }

    async fn delete_project(&self, id: &ContainerId) -> Result<()> {
        let url = self.endpoint(&["projects", id.as_str()])?;
        self.send_empty(Method::DELETE, url, None).await
    }

    async fn list_sessions(&self, project: &ContainerId) -> Result<Vec<Session>> {
        let url = self.endpoint(&["projects", project.as_str(), "sessions"])?;
        let sessions: Vec<FwSession> = self.send_json(Method::GET, url, None).await?;
        sessions.into_iter().map(FwSession::into_domain).collect()
    }

    async fn get_session(&self, id: &ContainerId) -> Result<Session> {
        let url = self.endpoint(&["sessions", id.as_str()])?;
        self.send_json::<FwSession>(Method::GET, url, None)
            .await?
            .into_domain()
    }

    async fn list_acquisitions(&self, session: &ContainerId) -> Result<Vec<Acquisition>> {
        let url = self.endpoint(&["sessions", session.as_str(), "acquisitions"])?;
        let acquisitions: Vec<FwAcquisition> = self.send_json(Method::GET, url, None).await?;
        acquisitions
            .into_iter()
            .map(FwAcquisition::into_domain)
            .collect()
    }

    async fn get_subject(&self, id: &ContainerId) -> Result<Subject> {
        let url = self.endpoint(&["subjects", id.as_str()])?;
        self.send_json::<FwSubject>(Method::GET, url, None)
            .await?
            .into_domain()
    }

    async fn find_subject(&self, project: &ContainerId, label: &str) -> Result<Option<Subject>> {
        let url = self.endpoint(&["projects", project.as_str(), "subjects"])?;
        let subjects: Vec<FwSubject> = self.send_json(Method::GET, url, None).await?;
        subjects
            .into_iter()
            .find(|s| s.label == label)
            .map(FwSubject::into_domain)
            .transpose()
    }

    async fn find_session(&self, subject: &ContainerId, label: &str) -> Result<Option<Session>> {
        let url = self.endpoint(&["subjects", subject.as_str(), "sessions"])?;
        let sessions: Vec<FwSession> = self.send_json(Method::GET, url, None).await?;
        sessions
            .into_iter()
            .find(|s| s.label == label)
            .map(FwSession::into_domain)
            .transpose()
    }

    async fn add_tag(&self, target: &TagTarget, tag: &str) -> Result<()> {
        let url = self.tag_url(target, None)?;
        match self
            .send_empty(Method::POST, url, Some(json!({ "value": tag })))
            .await
        {
            // Already tagged
            Err(WbhiError::Platform(PlatformError::Conflict(_))) => Ok(()),
            other => other,
        }
    }

    async fn delete_tag(&self, target: &TagTarget, tag: &str) -> Result<()> {
        let url = self.tag_url(target, Some(tag))?;
        match self.send_empty(Method::DELETE, url, None).await {
            Err(WbhiError::Platform(PlatformError::NotFound(_))) => Ok(()),
            other => other,
        }
    }

    async fn rename_subject(&self, id: &ContainerId, label: &str) -> Result<()> {
        let url = self.endpoint(&["subjects", id.as_str()])?;
        self.send_empty(Method::PUT, url, Some(json!({ "label": label })))
            .await
    }

    async fn move_session(&self, session: &ContainerId, project: &ContainerId) -> Result<()> {
        let url = self.endpoint(&["sessions", session.as_str()])?;
        self.send_empty(
            Method::PUT,
            url,
            Some(json!({ "project": project.as_str() })),
        )
        .await
    }

    async fn bulk_move_sessions(
        &self,
        sessions: &[ContainerId],
        subject: &ContainerId,
        conflict: ConflictMode,
    ) -> Result<()> {
        let url = self.endpoint(&["sessions", "bulk", "move"])?;
        let sources: Vec<&str> = sessions.iter().map(ContainerId::as_str).collect();
        let body = json!({
            "sources": sources,
            "destinations": [subject.as_str()],
            "destination_container_type": "subjects",
            "conflict_mode": conflict,
        });
        self.send_empty(Method::POST, url, Some(body)).await
    }

    async fn read_view(&self, project: &ContainerId) -> Result<Vec<ViewRow>> {
        let mut url = self.endpoint(&["views", "data"])?;
        url.query_pairs_mut()
            .append_pair("containerId", project.as_str())
            .append_pair("format", "json");
        let view = json!({
            "columns": [
                { "src": "subject.label" },
                { "src": "session.label" },
                { "src": "session.timestamp" },
                { "src": "acquisition.label" },
            ],
            "includeIds": false,
            "includeLabels": false,
            "missingDataStrategy": "none",
        });
        let data: FwViewData = self.send_json(Method::POST, url, Some(view)).await?;
        Ok(data
            .data
            .into_iter()
            .map(|row| ViewRow {
                subject_label: row.subject_label.unwrap_or_default(),
                session_label: row.session_label.unwrap_or_default(),
                session_timestamp: row.session_timestamp,
                acquisition_label: row.acquisition_label,
            })
            .collect())
    }

    async fn start_project_copy(
        &self,
        source: &ContainerId,
        request: &ProjectCopyRequest,
    ) -> Result<ContainerId> {
        let url = self.endpoint(&["projects", source.as_str(), "copy"])?;
        let body = json!({
            "group_id": request.group,
            "project_label": request.label,
            "filter": {
                "exclude_analysis": false,
                "exclude_notes": false,
                "exclude_tags": true,
                "include_rules": [format!("acquisition.tags={}", request.include_tag)],
                "exclude_rules": [],
            },
        });
        let created: FwCreated = self.submit_once(url, body).await?;
        container_id(&created.id)
    }

    async fn lookup_gear(&self, path: &str) -> Result<Option<ContainerId>> {
        self.lookup(path)
            .await?
            .map(|found| container_id(&found.id))
            .transpose()
    }

    async fn submit_job(&self, request: &JobRequest) -> Result<String> {
        let url = self.endpoint(&["jobs", "add"])?;
        let inputs: serde_json::Map<String, Value> = request
            .inputs
            .iter()
            .map(|(name, file)| {
                (
                    name.clone(),
                    json!({
                        "type": file.container_type,
                        "id": file.container_id.as_str(),
                        "name": file.name,
                    }),
                )
            })
            .collect();
        let body = json!({
            "gear_id": request.gear_id.as_str(),
            "inputs": inputs,
            "config": request.config,
            "destination": { "type": "session", "id": request.destination.as_str() },
        });
        let created: FwCreated = self.submit_once(url, body).await?;
        Ok(created.id)
    }
}
