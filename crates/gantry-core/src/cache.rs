use std::collections::HashMap;

use tracing::debug;

use crate::task::{Attachment, Comment, Project, Subtask, TeamMember};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    NotLoaded,
    Loading,
    Loaded(Vec<T>),
    Failed(String),
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        Self::NotLoaded
    }
}

impl<T: Clone> LoadState<T> {
    pub fn begin(&mut self) -> bool {
        match self {
            Self::NotLoaded | Self::Failed(_) => {
                *self = Self::Loading;
                true
            }
            Self::Loading | Self::Loaded(_) => false,
        }
    }

    pub fn complete(&mut self, items: Vec<T>) {
        *self = Self::Loaded(items);
    }

    pub fn fail(&mut self, reason: String) {
        *self = Self::Failed(reason);
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn items(&self) -> &[T] {
        match self {
            Self::Loaded(items) => items,
            _ => &[],
        }
    }

    pub fn push(&mut self, item: T) {
        match self {
            Self::Loaded(items) => items.push(item),
            _ => debug!("dropping append to unloaded collection"),
        }
    }

    pub fn replace_where(&mut self, pred: impl Fn(&T) -> bool, item: T) -> bool {
        if let Self::Loaded(items) = self
            && let Some(idx) = items.iter().position(pred)
        {
            items[idx] = item;
            return true;
        }
        false
    }

    pub fn modify_where(
        &mut self,
        pred: impl Fn(&T) -> bool,
        apply: impl FnOnce(&mut T),
    ) -> Option<T> {
        if let Self::Loaded(items) = self
            && let Some(idx) = items.iter().position(pred)
        {
            apply(&mut items[idx]);
            return Some(items[idx].clone());
        }
        None
    }

    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> bool {
        if let Self::Loaded(items) = self
            && let Some(idx) = items.iter().position(pred)
        {
            items.remove(idx);
            return true;
        }
        false
    }
}

#[derive(Debug, Default)]
pub struct DetailEntry {
    pub subtasks: LoadState<Subtask>,
    pub comments: LoadState<Comment>,
    pub attachments: LoadState<Attachment>,
}

#[derive(Debug, Default)]
pub struct ResourceCache {
    entries: HashMap<String, DetailEntry>,
    pub projects: LoadState<Project>,
    teams: HashMap<String, LoadState<TeamMember>>,
}

impl ResourceCache {
    pub fn entry(&mut self, task_id: &str) -> &mut DetailEntry {
        self.entries.entry(task_id.to_string()).or_default()
    }

    pub fn get(&self, task_id: &str) -> Option<&DetailEntry> {
        self.entries.get(task_id)
    }

    pub fn invalidate(&mut self, task_id: &str) {
        if self.entries.remove(task_id).is_some() {
            debug!(task = task_id, "invalidated detail cache entry");
        }
    }

    pub fn team(&mut self, project_id: &str) -> &mut LoadState<TeamMember> {
        self.teams.entry(project_id.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{LoadState, ResourceCache};
    use crate::task::Subtask;

    fn subtask(id: &str, completed: bool) -> Subtask {
        Subtask {
            id: id.to_string(),
            task_id: "t1".to_string(),
            title: format!("step {id}"),
            description: String::new(),
            completed,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn begin_fetches_once_until_invalidated() {
        let mut state: LoadState<Subtask> = LoadState::NotLoaded;

        assert!(state.begin(), "first begin issues the fetch");
        assert!(!state.begin(), "in-flight begin does not");

        state.complete(vec![subtask("s1", false)]);
        assert!(!state.begin(), "loaded is terminal");
        assert_eq!(state.items().len(), 1);
    }

    #[test]
    fn failed_state_is_retryable() {
        let mut state: LoadState<Subtask> = LoadState::NotLoaded;
        assert!(state.begin());
        state.fail("boom".to_string());
        assert!(state.begin(), "failure resets to a fetchable state");
    }

    #[test]
    fn push_is_dropped_until_first_load() {
        let mut state: LoadState<Subtask> = LoadState::NotLoaded;
        state.push(subtask("s1", false));
        assert!(state.items().is_empty());

        state.complete(vec![]);
        state.push(subtask("s1", false));
        assert_eq!(state.items().len(), 1);
    }

    #[test]
    fn modify_where_returns_the_edited_copy() {
        let mut state = LoadState::Loaded(vec![subtask("s1", false), subtask("s2", false)]);
        let edited = state
            .modify_where(|s| s.id == "s2", |s| s.completed = true)
            .expect("subtask present");
        assert!(edited.completed);
        assert!(!state.items()[0].completed);
        assert!(state.items()[1].completed);
    }

    #[test]
    fn remove_where_only_touches_the_match() {
        let mut state = LoadState::Loaded(vec![subtask("s1", false), subtask("s2", false)]);
        assert!(state.remove_where(|s| s.id == "s1"));
        assert!(!state.remove_where(|s| s.id == "missing"));
        assert_eq!(state.items().len(), 1);
        assert_eq!(state.items()[0].id, "s2");
    }

    #[test]
    fn invalidate_drops_every_kind_for_the_task() {
        let mut cache = ResourceCache::default();
        cache.entry("t1").subtasks.complete(vec![subtask("s1", false)]);
        cache.entry("t1").comments.complete(vec![]);
        assert!(cache.get("t1").is_some());

        cache.invalidate("t1");
        assert!(cache.get("t1").is_none());
        assert!(!cache.entry("t1").subtasks.is_loaded());
    }
}
