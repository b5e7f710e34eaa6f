//! Prompt construction and structured-output schemas for the guide.

use serde_json::{json, Value};

use crate::types::{LifeArea, SmartTask};

/// Longest insight the guidance prompt asks for, in characters.
pub const INSIGHT_MAX_CHARS: usize = 200;

/// Longest evolution insight the review prompt asks for, in characters.
pub const EVOLUTION_MAX_CHARS: usize = 300;

/// Number of SMART tasks requested per cycle.
pub const TASKS_PER_CYCLE: usize = 3;

/// Shape the generator is asked to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSchema {
    /// `{ insight, tasks: [task] }`
    Guidance,
    /// `[task]`
    TaskList,
}

fn task_schema(required: bool) -> Value {
    let mut schema = json!({
        "type": "OBJECT",
        "properties": {
            "title": { "type": "STRING" },
            "description": { "type": "STRING" },
            "category": { "type": "STRING" },
            "whySmart": { "type": "STRING" }
        }
    });
    if required {
        schema["required"] = json!(["title", "description", "category", "whySmart"]);
    }
    schema
}

impl ResponseSchema {
    /// Render as a generative-API `responseSchema` object.
    pub fn to_json(self) -> Value {
        match self {
            ResponseSchema::Guidance => json!({
                "type": "OBJECT",
                "properties": {
                    "insight": { "type": "STRING" },
                    "tasks": { "type": "ARRAY", "items": task_schema(true) }
                },
                "required": ["insight", "tasks"]
            }),
            ResponseSchema::TaskList => json!({
                "type": "ARRAY",
                "items": task_schema(false)
            }),
        }
    }
}

/// `Career: 7/10, Health: 4.5/10, ...`
fn wheel_summary(wheel: &[LifeArea], with_max: bool) -> String {
    wheel
        .iter()
        .map(|a| {
            if with_max {
                format!("{}: {}/10", a.name, a.score())
            } else {
                format!("{}: {}", a.name, a.score())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_guidance_prompt(wheel: &[LifeArea]) -> String {
    format!(
        "Analyze the following Wheel of Life: {}.\n\
         1. Provide a short motivational insight (max {INSIGHT_MAX_CHARS} characters).\n\
         2. Generate {TASKS_PER_CYCLE} daily SMART tasks (Specific, Measurable, Achievable, \
         Relevant, Time-bound).\n\
         The tasks must focus on improving the areas with the lowest scores.\n\
         Return ONLY JSON.",
        wheel_summary(wheel, true)
    )
}

pub fn build_evolution_prompt(old: &[LifeArea], new: &[LifeArea]) -> String {
    format!(
        "Compare the previous Wheel of Life [{}] with the new one [{}].\n\
         The user has just completed a cycle of SMART tasks.\n\
         Give a deep insight into their evolution: what the score changes reveal about \
         their recent actions and how they should approach the next cycle.\n\
         Be elegant, direct and inspiring. Max {EVOLUTION_MAX_CHARS} characters.",
        wheel_summary(old, false),
        wheel_summary(new, false)
    )
}

pub fn build_simplify_prompt(tasks: &[SmartTask]) -> String {
    let titles = tasks
        .iter()
        .map(|t| t.title.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Turn these tasks into 2-minute MICRO-ACTIONS, one per task and in the same \
         order: [{titles}]. Return a JSON array."
    )
}
