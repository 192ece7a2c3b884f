use std::cmp::Ordering;

use tracing::trace;

use crate::task::{Priority, Status, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    DueDate,
    Priority,
    Title,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Ascending,
    Descending,
}

impl SortDir {
    fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ViewFilter {
    pub search: String,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub sort: SortKey,
    pub dir: SortDir,
}

impl Default for ViewFilter {
    fn default() -> Self {
        Self {
            search: String::new(),
            status: None,
            priority: None,
            sort: SortKey::DueDate,
            dir: SortDir::Ascending,
        }
    }
}

impl ViewFilter {
    pub fn toggle_sort(&mut self, key: SortKey) {
        if self.sort == key {
            self.dir = self.dir.flipped();
        } else {
            self.sort = key;
            self.dir = SortDir::Ascending;
        }
    }

    fn admits(&self, task: &Task, needle: &str) -> bool {
        if !needle.is_empty() && !matches_text(task, needle) {
            return false;
        }
        if let Some(status) = self.status
            && task.status != status
        {
            return false;
        }
        if let Some(priority) = self.priority
            && task.priority != priority
        {
            return false;
        }
        true
    }
}

pub fn visible(tasks: &[Task], view: &ViewFilter) -> Vec<Task> {
    let needle = view.search.trim().to_ascii_lowercase();

    let mut out: Vec<Task> = tasks
        .iter()
        .filter(|task| view.admits(task, &needle))
        .cloned()
        .collect();

    out.sort_by(|a, b| compare_on(a, b, view.sort));
    if view.dir == SortDir::Descending {
        out.reverse();
    }

    trace!(
        input = tasks.len(),
        visible = out.len(),
        sort = ?view.sort,
        "recomputed visible subset"
    );
    out
}

fn matches_text(task: &Task, needle: &str) -> bool {
    if task.title.to_ascii_lowercase().contains(needle)
        || task.description.to_ascii_lowercase().contains(needle)
    {
        return true;
    }
    if task
        .tags
        .iter()
        .any(|tag| tag.to_ascii_lowercase().contains(needle))
    {
        return true;
    }
    if let Some(assignee) = task.assignee.as_ref()
        && assignee.name.to_ascii_lowercase().contains(needle)
    {
        return true;
    }
    if let Some(project) = task.project.as_ref()
        && project.name.to_ascii_lowercase().contains(needle)
    {
        return true;
    }
    false
}

fn compare_on(a: &Task, b: &Task, key: SortKey) -> Ordering {
    match key {
        SortKey::DueDate => cmp_optional(a.due_date.as_ref(), b.due_date.as_ref()),
        SortKey::Priority => a.priority.rank().cmp(&b.priority.rank()),
        SortKey::Title => a
            .title
            .to_ascii_lowercase()
            .cmp(&b.title.to_ascii_lowercase()),
        SortKey::Status => a.status.as_slug().cmp(b.status.as_slug()),
    }
}

fn cmp_optional<T: Ord>(left: Option<&T>, right: Option<&T>) -> Ordering {
    match (left, right) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use super::{SortDir, SortKey, ViewFilter, visible};
    use crate::task::{PersonRef, Priority, ProjectRef, Status, Task};

    fn task(id: &str, title: &str) -> Task {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        Task {
            id: id.to_string(),
            title: title.to_string(),
            description: String::new(),
            status: Status::Pending,
            priority: Priority::Medium,
            due_date: None,
            created_at: created,
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

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn search_spans_title_description_tags_and_refs() {
        let mut by_title = task("a", "Quarterly Report");
        by_title.due_date = Some(Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());

        let mut by_tag = task("b", "misc");
        by_tag.tags = vec!["report-q3".to_string()];

        let mut by_assignee = task("c", "misc");
        by_assignee.assignee = Some(PersonRef {
            id: "u1".to_string(),
            name: "Reba Porter".to_string(),
            email: None,
        });

        let mut by_project = task("d", "misc");
        by_project.project = Some(ProjectRef {
            id: "p1".to_string(),
            name: "Reporting".to_string(),
        });

        let unrelated = task("e", "unrelated");

        let tasks = vec![by_title, by_tag, by_assignee, by_project, unrelated];
        let mut view = ViewFilter {
            search: "RePort".to_string(),
            ..ViewFilter::default()
        };
        view.toggle_sort(SortKey::Title);

        let hits = visible(&tasks, &view);
        let mut found = ids(&hits);
        found.sort_unstable();
        assert_eq!(found, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn clearing_the_search_restores_the_original_set() {
        let tasks = vec![task("a", "alpha"), task("b", "beta"), task("c", "gamma")];

        let mut view = ViewFilter::default();
        view.search = "beta".to_string();
        assert_eq!(ids(&visible(&tasks, &view)), vec!["b"]);

        view.search = String::new();
        assert_eq!(visible(&tasks, &view).len(), tasks.len());
    }

    #[test]
    fn local_status_and_priority_are_exact_matches() {
        let mut in_progress = task("a", "one");
        in_progress.status = Status::InProgress;
        let mut high = task("b", "two");
        high.priority = Priority::High;
        let plain = task("c", "three");

        let tasks = vec![in_progress, high, plain];

        let view = ViewFilter {
            status: Some(Status::InProgress),
            ..ViewFilter::default()
        };
        assert_eq!(ids(&visible(&tasks, &view)), vec!["a"]);

        let view = ViewFilter {
            priority: Some(Priority::High),
            ..ViewFilter::default()
        };
        assert_eq!(ids(&visible(&tasks, &view)), vec!["b"]);
    }

    #[test]
    fn due_date_sorts_chronologically_with_undated_last() {
        let base = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        let mut soon = task("soon", "soon");
        soon.due_date = Some(base);
        let mut later = task("later", "later");
        later.due_date = Some(base + TimeDelta::days(3));
        let undated = task("undated", "undated");

        let tasks = vec![undated, later, soon];
        let view = ViewFilter::default();
        assert_eq!(ids(&visible(&tasks, &view)), vec!["soon", "later", "undated"]);
    }

    #[test]
    fn priority_sorts_high_before_medium_before_low() {
        let mut low = task("low", "low");
        low.priority = Priority::Low;
        let mut high = task("high", "high");
        high.priority = Priority::High;
        let medium = task("medium", "medium");

        let tasks = vec![low, medium, high];
        let view = ViewFilter {
            sort: SortKey::Priority,
            ..ViewFilter::default()
        };
        assert_eq!(ids(&visible(&tasks, &view)), vec!["high", "medium", "low"]);
    }

    #[test]
    fn toggling_the_active_key_yields_the_exact_reverse() {
        let mut a = task("a", "alpha");
        a.priority = Priority::High;
        let mut b = task("b", "beta");
        b.priority = Priority::High;
        let mut c = task("c", "gamma");
        c.priority = Priority::Low;

        // a and b tie on priority; the reverse order must swap them too.
        let tasks = vec![a, b, c];
        let mut view = ViewFilter {
            sort: SortKey::Priority,
            ..ViewFilter::default()
        };

        let ascending = visible(&tasks, &view);
        view.toggle_sort(SortKey::Priority);
        assert_eq!(view.dir, SortDir::Descending);
        let descending = visible(&tasks, &view);

        let mut reversed = ascending.clone();
        reversed.reverse();
        assert_eq!(ids(&descending), ids(&reversed));
    }

    #[test]
    fn selecting_a_new_key_resets_to_ascending() {
        let mut view = ViewFilter::default();
        view.toggle_sort(SortKey::DueDate);
        assert_eq!(view.dir, SortDir::Descending);

        view.toggle_sort(SortKey::Title);
        assert_eq!(view.sort, SortKey::Title);
        assert_eq!(view.dir, SortDir::Ascending);
    }
}
