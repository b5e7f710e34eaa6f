//! Lenient parsing of generator output.
//!
//! Generators sometimes wrap JSON in prose or code fences. Parsing first
//! cuts out the first balanced `{...}` or `[...]` block, then deserializes
//! it. Anything unusable is a [`GenerationError::Parse`].

use serde::Deserialize;

use super::GenerationError;
use crate::types::SmartTask;

/// A task as the generator describes it. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GeneratedTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, rename = "whySmart", alias = "why_smart")]
    pub why_smart: String,
}

#[derive(Debug, Deserialize)]
struct GeneratedGuidance {
    #[serde(default)]
    insight: String,
    #[serde(default)]
    tasks: Vec<GeneratedTask>,
}

/// Find the first balanced JSON object or array in `raw`.
///
/// Brackets inside string literals are ignored.
pub fn extract_json_block(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse guidance output into an insight and fresh tasks.
///
/// Tasks without a title are dropped. The insight is returned as-is (possibly
/// empty); the caller decides on a fallback.
pub fn parse_guidance(raw: &str) -> Result<(String, Vec<SmartTask>), GenerationError> {
    let block = extract_json_block(raw)
        .ok_or_else(|| GenerationError::Parse("no JSON object in response".to_string()))?;
    let parsed: GeneratedGuidance = serde_json::from_str(block)
        .map_err(|e| GenerationError::Parse(format!("guidance: {e}")))?;

    let tasks = parsed
        .tasks
        .into_iter()
        .filter_map(|t| {
            match SmartTask::new(&t.title, &t.description, &t.category, &t.why_smart) {
                Ok(task) => Some(task),
                Err(_) => {
                    log::warn!("Dropping generated task without a title");
                    None
                }
            }
        })
        .collect();

    Ok((parsed.insight.trim().to_string(), tasks))
}

/// Parse a list of generated tasks. Accepts a bare array or `{ "tasks": [...] }`.
/// A malformed array falls back to object-by-object extraction.
pub fn parse_task_list(raw: &str) -> Result<Vec<GeneratedTask>, GenerationError> {
    let block = extract_json_block(raw)
        .ok_or_else(|| GenerationError::Parse("no JSON array in response".to_string()))?;

    if block.starts_with('{') {
        #[derive(Deserialize)]
        struct Wrapped {
            tasks: Vec<GeneratedTask>,
        }
        return serde_json::from_str::<Wrapped>(block)
            .map(|w| w.tasks)
            .map_err(|e| GenerationError::Parse(format!("task list: {e}")));
    }

    match serde_json::from_str::<Vec<GeneratedTask>>(block) {
        Ok(tasks) => Ok(tasks),
        Err(e) => {
            let salvaged = parse_objects_individually(block);
            if salvaged.is_empty() {
                Err(GenerationError::Parse(format!("task list: {e}")))
            } else {
                log::warn!(
                    "Task list was malformed ({e}); salvaged {} entries",
                    salvaged.len()
                );
                Ok(salvaged)
            }
        }
    }
}

/// Pull every top-level `{...}` out of an array body that failed to parse whole.
fn parse_objects_individually(array: &str) -> Vec<GeneratedTask> {
    let inner = array
        .trim()
        .strip_prefix('[')
        .unwrap_or(array)
        .trim_end()
        .strip_suffix(']')
        .unwrap_or(array);

    let mut out = Vec::new();
    let mut rest = inner;
    while let Some(block) = extract_json_block(rest) {
        if block.starts_with('{') {
            if let Ok(task) = serde_json::from_str::<GeneratedTask>(block) {
                out.push(task);
            }
        }
        let Some(pos) = rest.find(block) else { break };
        rest = &rest[pos + block.len()..];
    }
    out
}

/// Overlay simplified text onto the original tasks, index by index.
///
/// The result always has `original.len()` entries. Each keeps its id and
/// schedule, is reset to incomplete, and takes only the non-empty generated
/// fields. Missing entries keep their text; extra entries are ignored.
pub fn merge_simplified(original: &[SmartTask], generated: &[GeneratedTask]) -> Vec<SmartTask> {
    if generated.len() != original.len() {
        log::warn!(
            "Simplify returned {} tasks for {} originals",
            generated.len(),
            original.len()
        );
    }

    fn take(field: &str, fallback: &str) -> String {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            fallback.to_string()
        } else {
            trimmed.to_string()
        }
    }

    original
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let mut next = task.clone();
            next.completed = false;
            if let Some(g) = generated.get(i) {
                next.title = take(&g.title, &task.title);
                next.description = take(&g.description, &task.description);
                next.category = take(&g.category, &task.category);
                next.why_smart = take(&g.why_smart, &task.why_smart);
            }
            next
        })
        .collect()
}
