use std::collections::HashMap;

use tracing::trace;

use crate::task::{Status, Task};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    pub id: String,
    pub title: String,
    pub status: Status,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyView {
    pub depends_on: Vec<DependencyRef>,
    pub blocks: Vec<DependencyRef>,
    pub is_blocked: bool,
}

pub fn resolve(task: &Task, loaded: &[Task]) -> DependencyView {
    let index: HashMap<&str, &Task> = loaded.iter().map(|t| (t.id.as_str(), t)).collect();

    let depends_on = resolve_ids(&task.dependencies, &index);
    let blocks = resolve_ids(&task.blocked_by, &index);
    let is_blocked = depends_on.iter().any(|dep| dep.status != Status::Completed);

    trace!(
        task = %task.id,
        declared = task.dependencies.len(),
        resolved = depends_on.len(),
        is_blocked,
        "resolved dependencies"
    );

    DependencyView {
        depends_on,
        blocks,
        is_blocked,
    }
}

fn resolve_ids(ids: &[String], index: &HashMap<&str, &Task>) -> Vec<DependencyRef> {
    ids.iter()
        .filter_map(|id| index.get(id.as_str()))
        .map(|task| DependencyRef {
            id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::resolve;
    use crate::task::{Priority, Status, Task};

    fn task(id: &str, status: Status) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: String::new(),
            status,
            priority: Priority::Medium,
            due_date: None,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
            completed_at: None,
            tags: vec![],
            assignee: None,
            project: None,
            estimated_hours: None,
            actual_hours: None,
            progress: 0,
            category: None,
            dependencies: vec![],
            blocked_by: vec![],
            comments_count: 0,
            attachments_count: 0,
        }
    }

    #[test]
    fn incomplete_dependency_blocks() {
        let mut target = task("t", Status::Pending);
        target.dependencies = vec!["dep".to_string()];

        let loaded = vec![target.clone(), task("dep", Status::InProgress)];
        let view = resolve(&target, &loaded);

        assert!(view.is_blocked);
        assert_eq!(view.depends_on.len(), 1);
        assert_eq!(view.depends_on[0].id, "dep");
    }

    #[test]
    fn completed_dependencies_do_not_block() {
        let mut target = task("t", Status::Pending);
        target.dependencies = vec!["dep".to_string()];

        let loaded = vec![target.clone(), task("dep", Status::Completed)];
        assert!(!resolve(&target, &loaded).is_blocked);
    }

    #[test]
    fn unresolved_ids_are_skipped_without_error() {
        let mut target = task("t", Status::Pending);
        target.dependencies = vec!["missing".to_string(), "dep".to_string()];
        target.blocked_by = vec!["also-missing".to_string()];

        let loaded = vec![target.clone(), task("dep", Status::Completed)];
        let view = resolve(&target, &loaded);

        assert_eq!(view.depends_on.len(), 1);
        assert!(view.blocks.is_empty());
        assert!(!view.is_blocked, "unresolved ids never count as blocking");
    }

    #[test]
    fn blocks_lists_tasks_waiting_on_this_one() {
        let mut target = task("t", Status::InProgress);
        target.blocked_by = vec!["waiter".to_string()];

        let loaded = vec![target.clone(), task("waiter", Status::Pending)];
        let view = resolve(&target, &loaded);

        assert_eq!(view.blocks.len(), 1);
        assert_eq!(view.blocks[0].id, "waiter");
        assert!(!view.is_blocked, "blocks never marks the task itself blocked");
    }
}
