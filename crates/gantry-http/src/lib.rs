pub mod config;

use std::time::Duration;

use async_trait::async_trait;
use gantry_core::error::{Error, Result};
use gantry_core::gateway::{
    FileUpload, Gateway, ListQuery, SubtaskDraft, SubtaskPatch, TaskDraft, TaskPage, TaskPatch,
};
use gantry_core::task::{Attachment, Comment, Project, Subtask, Task, TeamMember};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use uuid::Uuid;

pub use config::GatewayConfig;

pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| Error::Transport(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token,
        })
    }

    fn request(&self, method: Method, path: &str) -> (String, RequestBuilder) {
        let request_id = Uuid::new_v4().to_string();
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-request-id", request_id.clone());
        if let Some(token) = self.token.as_deref() {
            req = req.bearer_auth(token);
        }
        (request_id, req)
    }

    async fn send(&self, req: RequestBuilder, entity: &str, request_id: &str) -> Result<Response> {
        let response = req
            .send()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(request_id, status = status.as_u16(), "request completed");
            return Ok(response);
        }
        debug!(request_id, status = status.as_u16(), entity, "request failed");
        Err(classify_status(status, entity))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, entity: &str) -> Result<T> {
        let (request_id, req) = self.request(Method::GET, path);
        let response = self.send(req, entity, &request_id).await?;
        decode(response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, entity: &str) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let (request_id, req) = self.request(Method::POST, path);
        let response = self.send(req.json(body), entity, &request_id).await?;
        decode(response).await
    }

    async fn patch_json<B, T>(&self, path: &str, body: &B, entity: &str) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let (request_id, req) = self.request(Method::PATCH, path);
        let response = self.send(req.json(body), entity, &request_id).await?;
        decode(response).await
    }

    async fn delete(&self, path: &str, entity: &str) -> Result<()> {
        let (request_id, req) = self.request(Method::DELETE, path);
        self.send(req, entity, &request_id).await?;
        Ok(())
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    #[instrument(skip(self, query), fields(page = query.page, limit = query.limit))]
    async fn list_tasks(&self, query: &ListQuery) -> Result<TaskPage> {
        let (request_id, req) = self.request(Method::GET, "/api/tasks");
        let req = req.query(&list_query_pairs(query));
        let response = self.send(req, "task list", &request_id).await?;
        decode(response).await
    }

    #[instrument(skip(self, draft), fields(title_len = draft.title.len()))]
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task> {
        self.post_json("/api/tasks", draft, "task").await
    }

    #[instrument(skip(self, patch))]
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        self.patch_json(&format!("/api/tasks/{id}"), patch, "task")
            .await
    }

    #[instrument(skip(self))]
    async fn delete_task(&self, id: &str) -> Result<()> {
        self.delete(&format!("/api/tasks/{id}"), "task").await
    }

    async fn list_subtasks(&self, task_id: &str) -> Result<Vec<Subtask>> {
        self.get_json(&format!("/api/tasks/{task_id}/subtasks"), "subtask list")
            .await
    }

    async fn create_subtask(&self, task_id: &str, draft: &SubtaskDraft) -> Result<Value> {
        self.post_json(&format!("/api/tasks/{task_id}/subtasks"), draft, "subtask")
            .await
    }

    async fn update_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
        patch: &SubtaskPatch,
    ) -> Result<Value> {
        self.patch_json(
            &format!("/api/tasks/{task_id}/subtasks/{subtask_id}"),
            patch,
            "subtask",
        )
        .await
    }

    async fn delete_subtask(&self, task_id: &str, subtask_id: &str) -> Result<()> {
        self.delete(
            &format!("/api/tasks/{task_id}/subtasks/{subtask_id}"),
            "subtask",
        )
        .await
    }

    async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>> {
        self.get_json(&format!("/api/tasks/{task_id}/comments"), "comment list")
            .await
    }

    async fn create_comment(&self, task_id: &str, body: &str) -> Result<Value> {
        self.post_json(
            &format!("/api/tasks/{task_id}/comments"),
            &json!({ "body": body }),
            "comment",
        )
        .await
    }

    async fn delete_comment(&self, task_id: &str, comment_id: &str) -> Result<()> {
        self.delete(
            &format!("/api/tasks/{task_id}/comments/{comment_id}"),
            "comment",
        )
        .await
    }

    async fn list_attachments(&self, task_id: &str) -> Result<Vec<Attachment>> {
        self.get_json(
            &format!("/api/tasks/{task_id}/attachments"),
            "attachment list",
        )
        .await
    }

    #[instrument(skip(self, file), fields(file = %file.file_name, size = file.bytes.len()))]
    async fn upload_attachment(&self, task_id: &str, file: &FileUpload) -> Result<Value> {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|err| Error::Transport(format!("invalid mime type: {err}")))?;
        let form = Form::new().part("file", part);

        let (request_id, req) =
            self.request(Method::POST, &format!("/api/tasks/{task_id}/attachments"));
        let response = self
            .send(req.multipart(form), "attachment", &request_id)
            .await?;
        decode(response).await
    }

    async fn delete_attachment(&self, task_id: &str, attachment_id: &str) -> Result<()> {
        self.delete(
            &format!("/api/tasks/{task_id}/attachments/{attachment_id}"),
            "attachment",
        )
        .await
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.get_json("/api/projects", "project list").await
    }

    async fn project_team(&self, project_id: &str) -> Result<Vec<TeamMember>> {
        self.get_json(&format!("/api/projects/{project_id}/team"), "team list")
            .await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|err| Error::Transport(format!("failed decoding response: {err}")))
}

fn classify_status(status: StatusCode, entity: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(format!("server returned {status}"))
        }
        StatusCode::NOT_FOUND => Error::NotFound(entity.to_string()),
        _ => Error::Transport(format!("server returned {status}")),
    }
}

fn list_query_pairs(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("page", query.page.to_string()),
        ("limit", query.limit.to_string()),
    ];

    if let Some(status) = query.filters.status {
        pairs.push(("status", status.as_slug().to_string()));
    }
    if let Some(priority) = query.filters.priority {
        pairs.push(("priority", priority.as_slug().to_string()));
    }
    if let Some(assignee) = query.filters.assignee.as_deref() {
        pairs.push(("assignee", assignee.to_string()));
    }
    if let Some(project) = query.filters.project.as_deref() {
        pairs.push(("project", project.to_string()));
    }
    if let Some(category) = query.filters.category.as_deref() {
        pairs.push(("category", category.to_string()));
    }
    if let Some(search) = query.search.as_deref() {
        pairs.push(("search", search.to_string()));
    }
    if let Some(sort) = query.sort.as_deref() {
        pairs.push(("sort", sort.to_string()));
    }
    if let Some(order) = query.order.as_deref() {
        pairs.push(("order", order.to_string()));
    }
    pairs
}
