use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cache::ResourceCache;
use crate::config::BoardConfig;
use crate::deps::{self, DependencyView};
use crate::envelope;
use crate::error::{Error, Result};
use crate::filter::{self, SortKey, ViewFilter};
use crate::gateway::{
    FileUpload, Gateway, ListQuery, PageInfo, ServerFilters, SubtaskDraft, SubtaskPatch,
    TaskDraft, TaskPatch,
};
use crate::paging::{self, PageItem};
use crate::task::{
    Attachment, Comment, Priority, Project, Status, Subtask, Task, TeamMember,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardChange {
    ListRefreshed,
    ViewChanged,
    TaskUpserted(String),
    TaskRemoved(String),
    DetailChanged(String),
    LookupsChanged,
    DeleteArmed(String),
    DeleteDisarmed,
}

type Subscriber = Arc<dyn Fn(&BoardChange) + Send + Sync>;

#[derive(Debug)]
struct BoardState {
    tasks: Vec<Task>,
    query: ListQuery,
    view: ViewFilter,
    page_info: Option<PageInfo>,
    fetch_seq: u64,
    loading: bool,
    mutating: HashSet<String>,
    open_task: Option<String>,
    pending_delete: Option<String>,
    cache: ResourceCache,
}

pub struct TaskBoard {
    gateway: Arc<dyn Gateway>,
    state: Mutex<BoardState>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl TaskBoard {
    pub fn new(gateway: Arc<dyn Gateway>, config: BoardConfig) -> Self {
        Self {
            gateway,
            state: Mutex::new(BoardState {
                tasks: Vec::new(),
                query: ListQuery::new(config.clamped_limit()),
                view: ViewFilter::default(),
                page_info: None,
                fetch_seq: 0,
                loading: false,
                mutating: HashSet::new(),
                open_task: None,
                pending_delete: None,
                cache: ResourceCache::default(),
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, subscriber: impl Fn(&BoardChange) + Send + Sync + 'static) {
        self.subscribers.lock().push(Arc::new(subscriber));
    }

    fn notify(&self, change: BoardChange) {
        let subscribers: Vec<Subscriber> = self.subscribers.lock().clone();
        for subscriber in subscribers {
            subscriber(&change);
        }
    }

    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let (query, seq) = {
            let mut state = self.state.lock();
            state.loading = true;
            (state.query.clone(), state.fetch_seq)
        };

        debug!(page = query.page, limit = query.limit, "fetching task page");
        let outcome = self.gateway.list_tasks(&query).await;

        let mut state = self.state.lock();
        if state.fetch_seq != seq {
            debug!(
                stale = seq,
                current = state.fetch_seq,
                "discarding response for superseded query"
            );
            return Ok(());
        }
        state.loading = false;

        match outcome {
            Ok(page) => {
                info!(count = page.tasks.len(), "task page applied");
                state.tasks = page.tasks;
                state.page_info = page.pagination;
                drop(state);
                self.notify(BoardChange::ListRefreshed);
                Ok(())
            }
            Err(err) => {
                drop(state);
                Err(err)
            }
        }
    }

    #[instrument(skip(self, filters))]
    pub async fn set_filters(&self, filters: ServerFilters) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.query.filters = filters;
            state.query.page = 1;
            state.fetch_seq += 1;
        }
        self.refresh().await
    }

    #[instrument(skip(self))]
    pub async fn goto_page(&self, page: u32) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.query.page = page.max(1);
            state.fetch_seq += 1;
        }
        self.refresh().await
    }

    pub fn set_search(&self, text: &str) {
        self.state.lock().view.search = text.to_string();
        self.notify(BoardChange::ViewChanged);
    }

    pub fn set_local_status(&self, status: Option<Status>) {
        self.state.lock().view.status = status;
        self.notify(BoardChange::ViewChanged);
    }

    pub fn set_local_priority(&self, priority: Option<Priority>) {
        self.state.lock().view.priority = priority;
        self.notify(BoardChange::ViewChanged);
    }

    pub fn toggle_sort(&self, key: SortKey) {
        self.state.lock().view.toggle_sort(key);
        self.notify(BoardChange::ViewChanged);
    }

    pub fn visible_tasks(&self) -> Vec<Task> {
        let state = self.state.lock();
        filter::visible(&state.tasks, &state.view)
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.state.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn view(&self) -> ViewFilter {
        self.state.lock().view.clone()
    }

    pub fn query(&self) -> ListQuery {
        self.state.lock().query.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn total_count(&self) -> Option<u64> {
        self.state.lock().page_info.as_ref().map(|info| info.total)
    }

    pub fn page_items(&self) -> Vec<PageItem> {
        let state = self.state.lock();
        match state.page_info.as_ref() {
            Some(info) => paging::window(state.query.page, info.pages),
            None => paging::window(1, 1),
        }
    }

    pub fn dependency_view(&self, task_id: &str) -> Option<DependencyView> {
        let state = self.state.lock();
        let task = state.tasks.iter().find(|t| t.id == task_id)?;
        Some(deps::resolve(task, &state.tasks))
    }

    #[instrument(skip(self, draft), fields(title_len = draft.title.len()))]
    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Task> {
        validate_draft(draft, Utc::now())?;

        let task = self.gateway.create_task(draft).await?;
        info!(id = %task.id, "task created");
        {
            let mut state = self.state.lock();
            upsert(&mut state.tasks, task.clone());
        }
        self.notify(BoardChange::TaskUpserted(task.id.clone()));
        Ok(task)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        self.begin_mutation(id)?;
        let outcome = self.gateway.update_task(id, patch).await;
        self.end_mutation(id);

        let task = outcome?;
        {
            let mut state = self.state.lock();
            upsert(&mut state.tasks, task.clone());
        }
        info!(id = %task.id, "task updated");
        self.notify(BoardChange::TaskUpserted(task.id.clone()));
        Ok(task)
    }

    #[instrument(skip(self))]
    pub async fn change_status(&self, id: &str, status: Status) -> Result<Task> {
        let patch = TaskPatch {
            status: Some(status),
            ..TaskPatch::default()
        };
        self.update_task(id, &patch).await
    }

    pub fn request_delete(&self, id: &str) {
        self.state.lock().pending_delete = Some(id.to_string());
        self.notify(BoardChange::DeleteArmed(id.to_string()));
    }

    pub fn cancel_delete(&self) {
        self.state.lock().pending_delete = None;
        self.notify(BoardChange::DeleteDisarmed);
    }

    pub fn pending_delete(&self) -> Option<String> {
        self.state.lock().pending_delete.clone()
    }

    #[instrument(skip(self))]
    pub async fn confirm_delete(&self) -> Result<()> {
        let id = self
            .state
            .lock()
            .pending_delete
            .take()
            .ok_or(Error::NoPendingDelete)?;

        if let Err(err) = self.begin_mutation(&id) {
            self.state.lock().pending_delete = Some(id);
            return Err(err);
        }
        let outcome = self.gateway.delete_task(&id).await;
        self.end_mutation(&id);

        match outcome {
            Ok(()) => self.finish_delete(&id),
            Err(Error::NotFound(_)) => {
                debug!(id = %id, "task already removed server-side, reconciling");
                self.finish_delete(&id)
            }
            Err(err) => Err(err),
        }
    }

    fn finish_delete(&self, id: &str) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.tasks.retain(|t| t.id != id);
            if state.open_task.as_deref() == Some(id) {
                state.open_task = None;
            }
            state.cache.invalidate(id);
        }
        info!(id = %id, "task deleted");
        self.notify(BoardChange::TaskRemoved(id.to_string()));
        Ok(())
    }

    fn begin_mutation(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.mutating.insert(id.to_string()) {
            return Err(Error::MutationInFlight { id: id.to_string() });
        }
        Ok(())
    }

    fn end_mutation(&self, id: &str) {
        self.state.lock().mutating.remove(id);
    }

    pub fn open_task(&self, id: &str) {
        self.state.lock().open_task = Some(id.to_string());
    }

    pub fn close_task(&self) {
        self.state.lock().open_task = None;
    }

    pub fn open_task_id(&self) -> Option<String> {
        self.state.lock().open_task.clone()
    }

    pub fn invalidate_detail(&self, task_id: &str) {
        self.state.lock().cache.invalidate(task_id);
        self.notify(BoardChange::DetailChanged(task_id.to_string()));
    }

    pub fn subtasks(&self, task_id: &str) -> Vec<Subtask> {
        let state = self.state.lock();
        state
            .cache
            .get(task_id)
            .map(|entry| entry.subtasks.items().to_vec())
            .unwrap_or_default()
    }

    pub fn comments(&self, task_id: &str) -> Vec<Comment> {
        let state = self.state.lock();
        state
            .cache
            .get(task_id)
            .map(|entry| entry.comments.items().to_vec())
            .unwrap_or_default()
    }

    pub fn attachments(&self, task_id: &str) -> Vec<Attachment> {
        let state = self.state.lock();
        state
            .cache
            .get(task_id)
            .map(|entry| entry.attachments.items().to_vec())
            .unwrap_or_default()
    }

    #[instrument(skip(self))]
    pub async fn ensure_subtasks(&self, task_id: &str) -> Result<Vec<Subtask>> {
        let fetch = self.state.lock().cache.entry(task_id).subtasks.begin();
        if !fetch {
            return Ok(self.subtasks(task_id));
        }

        match self.gateway.list_subtasks(task_id).await {
            Ok(items) => {
                self.state
                    .lock()
                    .cache
                    .entry(task_id)
                    .subtasks
                    .complete(items.clone());
                debug!(task = task_id, count = items.len(), "subtasks loaded");
                self.notify(BoardChange::DetailChanged(task_id.to_string()));
                Ok(items)
            }
            Err(err) => {
                self.state
                    .lock()
                    .cache
                    .entry(task_id)
                    .subtasks
                    .fail(err.to_string());
                self.notify(BoardChange::DetailChanged(task_id.to_string()));
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn ensure_comments(&self, task_id: &str) -> Result<Vec<Comment>> {
        let fetch = self.state.lock().cache.entry(task_id).comments.begin();
        if !fetch {
            return Ok(self.comments(task_id));
        }

        match self.gateway.list_comments(task_id).await {
            Ok(items) => {
                self.state
                    .lock()
                    .cache
                    .entry(task_id)
                    .comments
                    .complete(items.clone());
                debug!(task = task_id, count = items.len(), "comments loaded");
                self.notify(BoardChange::DetailChanged(task_id.to_string()));
                Ok(items)
            }
            Err(err) => {
                self.state
                    .lock()
                    .cache
                    .entry(task_id)
                    .comments
                    .fail(err.to_string());
                self.notify(BoardChange::DetailChanged(task_id.to_string()));
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn ensure_attachments(&self, task_id: &str) -> Result<Vec<Attachment>> {
        let fetch = self.state.lock().cache.entry(task_id).attachments.begin();
        if !fetch {
            return Ok(self.attachments(task_id));
        }

        match self.gateway.list_attachments(task_id).await {
            Ok(items) => {
                self.state
                    .lock()
                    .cache
                    .entry(task_id)
                    .attachments
                    .complete(items.clone());
                debug!(task = task_id, count = items.len(), "attachments loaded");
                self.notify(BoardChange::DetailChanged(task_id.to_string()));
                Ok(items)
            }
            Err(err) => {
                self.state
                    .lock()
                    .cache
                    .entry(task_id)
                    .attachments
                    .fail(err.to_string());
                self.notify(BoardChange::DetailChanged(task_id.to_string()));
                Err(err)
            }
        }
    }

    #[instrument(skip(self, draft), fields(title_len = draft.title.len()))]
    pub async fn add_subtask(&self, task_id: &str, draft: &SubtaskDraft) -> Result<Subtask> {
        if draft.title.trim().is_empty() {
            return Err(Error::validation("title", "subtask title is required"));
        }

        let raw = self.gateway.create_subtask(task_id, draft).await?;
        let mut subtask: Subtask = envelope::normalize_record(&raw, "subtask")?;
        if subtask.task_id.is_empty() {
            subtask.task_id = task_id.to_string();
        }

        self.state
            .lock()
            .cache
            .entry(task_id)
            .subtasks
            .push(subtask.clone());
        self.notify(BoardChange::DetailChanged(task_id.to_string()));
        Ok(subtask)
    }

    #[instrument(skip(self))]
    pub async fn toggle_subtask(&self, task_id: &str, subtask_id: &str) -> Result<Subtask> {
        let local = self
            .state
            .lock()
            .cache
            .entry(task_id)
            .subtasks
            .modify_where(|s| s.id == subtask_id, |s| s.completed = !s.completed)
            .ok_or_else(|| Error::NotFound(format!("subtask {subtask_id}")))?;
        self.notify(BoardChange::DetailChanged(task_id.to_string()));

        let patch = SubtaskPatch {
            completed: Some(local.completed),
            ..SubtaskPatch::default()
        };
        match self.gateway.update_subtask(task_id, subtask_id, &patch).await {
            Ok(raw) => match envelope::normalize_record::<Subtask>(&raw, "subtask") {
                Ok(mut confirmed) => {
                    if confirmed.task_id.is_empty() {
                        confirmed.task_id = task_id.to_string();
                    }
                    self.state
                        .lock()
                        .cache
                        .entry(task_id)
                        .subtasks
                        .replace_where(|s| s.id == subtask_id, confirmed.clone());
                    self.notify(BoardChange::DetailChanged(task_id.to_string()));
                    Ok(confirmed)
                }
                Err(err) => {
                    // The server applied the toggle; the local value is
                    // already correct even though the body is unusable.
                    warn!(error = %err, "keeping local toggle, response not normalizable");
                    Ok(local)
                }
            },
            Err(err) => {
                self.state
                    .lock()
                    .cache
                    .entry(task_id)
                    .subtasks
                    .modify_where(|s| s.id == subtask_id, |s| s.completed = !s.completed);
                self.notify(BoardChange::DetailChanged(task_id.to_string()));
                Err(err)
            }
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
        patch: &SubtaskPatch,
    ) -> Result<Subtask> {
        let raw = self.gateway.update_subtask(task_id, subtask_id, patch).await?;
        let mut subtask: Subtask = envelope::normalize_record(&raw, "subtask")?;
        if subtask.task_id.is_empty() {
            subtask.task_id = task_id.to_string();
        }

        self.state
            .lock()
            .cache
            .entry(task_id)
            .subtasks
            .replace_where(|s| s.id == subtask_id, subtask.clone());
        self.notify(BoardChange::DetailChanged(task_id.to_string()));
        Ok(subtask)
    }

    #[instrument(skip(self))]
    pub async fn delete_subtask(&self, task_id: &str, subtask_id: &str) -> Result<()> {
        self.gateway.delete_subtask(task_id, subtask_id).await?;
        self.state
            .lock()
            .cache
            .entry(task_id)
            .subtasks
            .remove_where(|s| s.id == subtask_id);
        self.notify(BoardChange::DetailChanged(task_id.to_string()));
        Ok(())
    }

    #[instrument(skip(self, body), fields(body_len = body.len()))]
    pub async fn add_comment(&self, task_id: &str, body: &str) -> Result<Comment> {
        if body.trim().is_empty() {
            return Err(Error::validation("body", "comment body is required"));
        }

        let raw = self.gateway.create_comment(task_id, body).await?;
        let mut comment: Comment = envelope::normalize_record(&raw, "comment")?;
        if comment.task_id.is_empty() {
            comment.task_id = task_id.to_string();
        }

        {
            let mut state = self.state.lock();
            state.cache.entry(task_id).comments.push(comment.clone());
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
                task.comments_count += 1;
            }
        }
        self.notify(BoardChange::DetailChanged(task_id.to_string()));
        self.notify(BoardChange::TaskUpserted(task_id.to_string()));
        Ok(comment)
    }

    #[instrument(skip(self))]
    pub async fn delete_comment(&self, task_id: &str, comment_id: &str) -> Result<()> {
        self.gateway.delete_comment(task_id, comment_id).await?;
        {
            let mut state = self.state.lock();
            let removed = state
                .cache
                .entry(task_id)
                .comments
                .remove_where(|c| c.id == comment_id);
            if removed
                && let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id)
            {
                task.comments_count = task.comments_count.saturating_sub(1);
            }
        }
        self.notify(BoardChange::DetailChanged(task_id.to_string()));
        self.notify(BoardChange::TaskUpserted(task_id.to_string()));
        Ok(())
    }

    #[instrument(skip(self, file), fields(file = %file.file_name, size = file.bytes.len()))]
    pub async fn upload_attachment(&self, task_id: &str, file: &FileUpload) -> Result<Attachment> {
        if file.file_name.trim().is_empty() {
            return Err(Error::validation("file_name", "file name is required"));
        }

        let raw = self.gateway.upload_attachment(task_id, file).await?;
        let mut attachment: Attachment = envelope::normalize_record(&raw, "attachment")?;
        if attachment.task_id.is_empty() {
            attachment.task_id = task_id.to_string();
        }

        {
            let mut state = self.state.lock();
            state
                .cache
                .entry(task_id)
                .attachments
                .push(attachment.clone());
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id) {
                task.attachments_count += 1;
            }
        }
        self.notify(BoardChange::DetailChanged(task_id.to_string()));
        self.notify(BoardChange::TaskUpserted(task_id.to_string()));
        Ok(attachment)
    }

    #[instrument(skip(self))]
    pub async fn delete_attachment(&self, task_id: &str, attachment_id: &str) -> Result<()> {
        self.gateway.delete_attachment(task_id, attachment_id).await?;
        {
            let mut state = self.state.lock();
            let removed = state
                .cache
                .entry(task_id)
                .attachments
                .remove_where(|a| a.id == attachment_id);
            if removed
                && let Some(task) = state.tasks.iter_mut().find(|t| t.id == task_id)
            {
                task.attachments_count = task.attachments_count.saturating_sub(1);
            }
        }
        self.notify(BoardChange::DetailChanged(task_id.to_string()));
        self.notify(BoardChange::TaskUpserted(task_id.to_string()));
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn ensure_projects(&self) -> Result<Vec<Project>> {
        let fetch = self.state.lock().cache.projects.begin();
        if !fetch {
            return Ok(self.state.lock().cache.projects.items().to_vec());
        }

        match self.gateway.list_projects().await {
            Ok(items) => {
                self.state.lock().cache.projects.complete(items.clone());
                debug!(count = items.len(), "projects loaded");
                self.notify(BoardChange::LookupsChanged);
                Ok(items)
            }
            Err(err) => {
                self.state.lock().cache.projects.fail(err.to_string());
                Err(err)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn ensure_project_team(&self, project_id: &str) -> Result<Vec<TeamMember>> {
        let fetch = self.state.lock().cache.team(project_id).begin();
        if !fetch {
            return Ok(self.state.lock().cache.team(project_id).items().to_vec());
        }

        match self.gateway.project_team(project_id).await {
            Ok(items) => {
                self.state
                    .lock()
                    .cache
                    .team(project_id)
                    .complete(items.clone());
                debug!(project = project_id, count = items.len(), "team loaded");
                self.notify(BoardChange::LookupsChanged);
                Ok(items)
            }
            Err(err) => {
                self.state.lock().cache.team(project_id).fail(err.to_string());
                Err(err)
            }
        }
    }
}

fn upsert(tasks: &mut Vec<Task>, task: Task) {
    match tasks.iter_mut().find(|t| t.id == task.id) {
        Some(slot) => *slot = task,
        None => tasks.push(task),
    }
}

fn validate_draft(draft: &TaskDraft, now: DateTime<Utc>) -> Result<()> {
    if draft.title.trim().is_empty() {
        return Err(Error::validation("title", "title is required"));
    }

    let Some(due) = draft.due_date else {
        return Err(Error::validation("due_date", "due date is required"));
    };
    if due < now {
        return Err(Error::validation("due_date", "due date is in the past"));
    }

    if draft
        .assignee_id
        .as_deref()
        .is_none_or(|id| id.trim().is_empty())
    {
        return Err(Error::validation("assignee_id", "assignee is required"));
    }

    if draft
        .project_id
        .as_deref()
        .is_none_or(|id| id.trim().is_empty())
    {
        return Err(Error::validation("project_id", "project is required"));
    }

    if let Some(estimate) = draft.estimated_hours
        && (!estimate.is_finite() || estimate < 0.0)
    {
        return Err(Error::validation(
            "estimated_hours",
            "estimated hours must be a non-negative number",
        ));
    }

    Ok(())
}
