//! Prompt construction per task type

use serde_json::Value;

use super::Task;

/// Build the prompt sent to the model for `task`.
///
/// Deterministic in the task's content; the declared type selects the
/// template and unknown or absent types send the task prompt unchanged.
pub fn build_prompt(task: &Task) -> String {
    match task.kind.as_deref() {
        Some("numeric") => format!(
            "You are a careful math assistant. Solve the problem step by step.\n\
             Then output ONLY the final numeric answer on its own line.\n\n\
             Problem: {}\n\nFinal answer: ",
            task.prompt
        ),
        Some("json") => {
            let empty = Value::Object(Default::default());
            let schema_hint = task.schema.as_ref().unwrap_or(&empty).to_string();
            format!(
                "Extract the requested fields and reply ONLY with a JSON object matching this schema.\n\
                 Schema (keys and types): {}\n\n\
                 Text: {}\n\nJSON: ",
                schema_hint, task.prompt
            )
        }
        Some("python") => format!(
            "Write the requested Python function and reply with only the code.\n\n\
             Task: {}\n",
            task.prompt
        ),
        _ => task.prompt.clone(),
    }
}
