use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
}

impl Status {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersonRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub status: Status,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub assignee: Option<PersonRef>,

    #[serde(default)]
    pub project: Option<ProjectRef>,

    #[serde(default)]
    pub estimated_hours: Option<f64>,

    #[serde(default)]
    pub actual_hours: Option<f64>,

    #[serde(default)]
    pub progress: u8,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub blocked_by: Vec<String>,

    #[serde(default)]
    pub comments_count: u32,

    #[serde(default)]
    pub attachments_count: u32,
}

impl Task {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != Status::Completed && self.due_date.map(|due| due < now).unwrap_or(false)
    }

    pub fn duration(&self) -> Option<TimeDelta> {
        self.completed_at.map(|done| done - self.created_at)
    }

    pub fn priority_badge(&self) -> &'static str {
        match self.priority {
            Priority::Low => "badge-low",
            Priority::Medium => "badge-medium",
            Priority::High => "badge-high",
        }
    }

    pub fn status_badge(&self) -> &'static str {
        match self.status {
            Status::Pending => "status-pending",
            Status::InProgress => "status-in-progress",
            Status::Completed => "status-completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: String,

    #[serde(default)]
    pub task_id: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub completed: bool,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,

    #[serde(default)]
    pub task_id: String,

    pub author: PersonRef,

    pub body: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,

    #[serde(default)]
    pub task_id: String,

    pub file_name: String,

    #[serde(default)]
    pub size: i64,

    #[serde(default)]
    pub mime_type: String,

    #[serde(default)]
    pub storage_path: String,

    #[serde(default)]
    pub uploaded_by: Option<PersonRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}
