use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::task::{
    Attachment, Comment, Priority, Project, Status, Subtask, Task, TeamMember,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerFilters {
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub project: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: ServerFilters,
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl ListQuery {
    pub fn new(limit: u32) -> Self {
        Self {
            filters: ServerFilters::default(),
            page: 1,
            limit,
            search: None,
            sort: None,
            order: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PageInfo {
    pub total: u64,
    pub pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskPage {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub pagination: Option<PageInfo>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee_id: Option<String>,
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskDraft {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn list_tasks(&self, query: &ListQuery) -> Result<TaskPage>;
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task>;
    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task>;
    async fn delete_task(&self, id: &str) -> Result<()>;

    async fn list_subtasks(&self, task_id: &str) -> Result<Vec<Subtask>>;
    async fn create_subtask(&self, task_id: &str, draft: &SubtaskDraft) -> Result<Value>;
    async fn update_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
        patch: &SubtaskPatch,
    ) -> Result<Value>;
    async fn delete_subtask(&self, task_id: &str, subtask_id: &str) -> Result<()>;

    async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>>;
    async fn create_comment(&self, task_id: &str, body: &str) -> Result<Value>;
    async fn delete_comment(&self, task_id: &str, comment_id: &str) -> Result<()>;

    async fn list_attachments(&self, task_id: &str) -> Result<Vec<Attachment>>;
    async fn upload_attachment(&self, task_id: &str, file: &FileUpload) -> Result<Value>;
    async fn delete_attachment(&self, task_id: &str, attachment_id: &str) -> Result<()>;

    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn project_team(&self, project_id: &str) -> Result<Vec<TeamMember>>;
}
