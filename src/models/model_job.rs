//! Image-to-3D model jobs as seen by the client.

use serde::Serialize;
use serde_json::Value;

/// Keys that may carry a task identifier, in lookup order.
const TASK_ID_KEYS: [&str; 3] = ["task_id", "id", "taskId"];

/// One status snapshot of an upstream 3D task.
#[derive(Debug, Clone, Serialize)]
pub struct ModelTaskSnapshot {
    /// Upstream status, lower-cased (`pending`, `in_progress`, `succeeded`, ...).
    pub status: String,

    /// Upstream payload, untouched.
    pub task: Value,

    /// Binary glTF download URL, once the upstream has produced one.
    pub glb_url: Option<String>,
}

impl ModelTaskSnapshot {
    pub fn from_payload(task: Value) -> Self {
        let status = task
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let glb_url = extract_glb_url(&task);
        Self {
            status,
            task,
            glb_url,
        }
    }
}

/// Pull the task identifier out of a creation reply.
///
/// Accepts `{"result": "<id>"}`, `{"result": {"task_id"|"id"|"taskId": "<id>"}}`
/// and the same keys at the top level, in that order. Blank strings are skipped.
pub fn extract_task_id(payload: &Value) -> Option<String> {
    let result = payload.get("result");

    let from_result = match result {
        Some(Value::String(id)) => non_blank(id),
        Some(Value::Object(_)) => result.and_then(first_id_key),
        _ => None,
    };

    from_result.or_else(|| first_id_key(payload))
}

/// `model_urls.glb`, if present.
pub fn extract_glb_url(task: &Value) -> Option<String> {
    task.get("model_urls")
        .and_then(|urls| urls.get("glb"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn first_id_key(obj: &Value) -> Option<String> {
    TASK_ID_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_str).and_then(non_blank))
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_id_from_bare_result() {
        assert_eq!(extract_task_id(&json!({"result": "job-42"})).as_deref(), Some("job-42"));
        assert_eq!(extract_task_id(&json!({"result": "  job-7 \n"})).as_deref(), Some("job-7"));
    }

    #[test]
    fn task_id_from_nested_result_follows_key_order() {
        let payload = json!({"result": {"taskId": "c", "id": "b", "task_id": "a"}});
        assert_eq!(extract_task_id(&payload).as_deref(), Some("a"));

        let payload = json!({"result": {"taskId": "c", "id": ""}});
        assert_eq!(extract_task_id(&payload).as_deref(), Some("c"));
    }

    #[test]
    fn task_id_falls_back_to_top_level() {
        assert_eq!(extract_task_id(&json!({"id": "top"})).as_deref(), Some("top"));
        assert_eq!(
            extract_task_id(&json!({"result": "", "taskId": "camel"})).as_deref(),
            Some("camel")
        );
        assert_eq!(
            extract_task_id(&json!({"result": {"other": 1}, "task_id": "t"})).as_deref(),
            Some("t")
        );
    }

    #[test]
    fn task_id_missing_or_non_string() {
        assert_eq!(extract_task_id(&json!({"code": 0})), None);
        assert_eq!(extract_task_id(&json!({"result": 12, "id": 5})), None);
        assert_eq!(extract_task_id(&json!("plain")), None);
    }

    #[test]
    fn snapshot_normalizes_status_and_finds_glb() {
        let snap = ModelTaskSnapshot::from_payload(
            json!({"status": "SUCCEEDED", "model_urls": {"glb": "https://x/y.glb"}}),
        );
        assert_eq!(snap.status, "succeeded");
        assert_eq!(snap.glb_url.as_deref(), Some("https://x/y.glb"));

        let snap = ModelTaskSnapshot::from_payload(json!({"progress": 10}));
        assert_eq!(snap.status, "");
        assert_eq!(snap.glb_url, None);
    }
}
