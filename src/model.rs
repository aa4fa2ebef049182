//! Wire model for the quest server
//!
//! Field names mirror the server's JSON exactly (`is_done`, `user`), so these
//! structs serialize straight into request/response bodies.

use serde::{Deserialize, Serialize};

/// A single quest as the server returns it.
///
/// `id` is server-assigned and immutable. The client keeps cached copies of
/// these; a copy may briefly disagree with the server while an optimistic
/// mutation is in flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub is_done: bool,
    pub user: String,
}

/// Body for POST /tasks/.
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Partial body for PATCH /tasks/{id}/. Only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_done: Option<bool>,
}

/// Server-side list orderings. The list is always re-fetched in the requested
/// order; the client never re-sorts locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    NewestFirst,
    OldestFirst,
    Title,
    DoneFirst,
    ActiveFirst,
}

impl SortKey {
    /// Value for the `ordering` query parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            SortKey::NewestFirst => "-created_at",
            SortKey::OldestFirst => "created_at",
            SortKey::Title => "title",
            SortKey::DoneFirst => "-is_done",
            SortKey::ActiveFirst => "is_done",
        }
    }

    /// Short label for status bars and the sort picker.
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::NewestFirst => "Newest",
            SortKey::OldestFirst => "Oldest",
            SortKey::Title => "A-Z",
            SortKey::DoneFirst => "Completed",
            SortKey::ActiveFirst => "Active",
        }
    }

    /// Next key in the TUI's sort cycle.
    pub fn next(self) -> Self {
        match self {
            SortKey::NewestFirst => SortKey::OldestFirst,
            SortKey::OldestFirst => SortKey::Title,
            SortKey::Title => SortKey::DoneFirst,
            SortKey::DoneFirst => SortKey::ActiveFirst,
            SortKey::ActiveFirst => SortKey::NewestFirst,
        }
    }

    /// Parse a CLI value. Accepts both the wire form ("-created_at") and the
    /// friendly form ("newest").
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "-created_at" | "newest" => Some(SortKey::NewestFirst),
            "created_at" | "oldest" => Some(SortKey::OldestFirst),
            "title" | "a-z" => Some(SortKey::Title),
            "-is_done" | "completed" | "done" => Some(SortKey::DoneFirst),
            "is_done" | "active" => Some(SortKey::ActiveFirst),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_deserialization() {
        let json = r#"{
            "id": 7,
            "title": "Defeat 10 slimes",
            "description": null,
            "is_done": false,
            "user": "hero",
            "created_at": "2026-01-12T09:30:00Z"
        }"#;

        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, 7);
        assert_eq!(task.title, "Defeat 10 slimes");
        assert_eq!(task.description, None);
        assert!(!task.is_done);
        assert_eq!(task.user, "hero");
    }

    #[test]
    fn test_task_deserialization_missing_description() {
        // Some serializers omit null fields entirely
        let json = r#"{"id": 1, "title": "t", "is_done": true, "user": "u"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.description, None);
        assert!(task.is_done);
    }

    #[test]
    fn test_new_task_skips_absent_description() {
        let body = serde_json::to_string(&NewTask {
            title: "Find the key".to_string(),
            description: None,
        })
        .unwrap();
        assert_eq!(body, r#"{"title":"Find the key"}"#);
    }

    #[test]
    fn test_task_patch_only_sends_set_fields() {
        let patch = TaskPatch {
            is_done: Some(true),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"is_done":true}"#);
    }

    #[test]
    fn test_sort_key_params() {
        assert_eq!(SortKey::NewestFirst.as_param(), "-created_at");
        assert_eq!(SortKey::OldestFirst.as_param(), "created_at");
        assert_eq!(SortKey::Title.as_param(), "title");
        assert_eq!(SortKey::DoneFirst.as_param(), "-is_done");
        assert_eq!(SortKey::ActiveFirst.as_param(), "is_done");
    }

    #[test]
    fn test_sort_key_cycle_visits_all() {
        let mut key = SortKey::NewestFirst;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(key.as_param());
            key = key.next();
        }
        assert_eq!(key, SortKey::NewestFirst);
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!(SortKey::parse("newest"), Some(SortKey::NewestFirst));
        assert_eq!(SortKey::parse("-is_done"), Some(SortKey::DoneFirst));
        assert_eq!(SortKey::parse("bogus"), None);
    }
}
