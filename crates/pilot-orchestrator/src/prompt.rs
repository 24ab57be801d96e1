//! Prompt builder for decision steps
//!
//! Each step's prompt is self-contained. It carries:
//! - The command being carried out
//! - Project context, when a context file was found
//! - The most recent action outcomes
//! - A description of the current screen
//! - The action table and the reply format

use pilot_core::{DecisionHistory, ScreenState};

/// Inputs for one step's prompt
#[derive(Debug, Clone, Copy)]
pub struct StepPrompt<'a> {
    pub goal: &'a str,
    pub step: usize,
    pub max_steps: usize,
    /// Output of `format_context_for_prompt`, possibly empty
    pub context_block: &'a str,
    pub history: &'a DecisionHistory,
    pub history_window: usize,
    pub screen: &'a ScreenState,
    /// Output of `ActionValidator::describe_actions`
    pub action_table: &'a str,
}

/// Build the prompt for one decision step
pub fn build_step_prompt(input: &StepPrompt<'_>) -> String {
    let mut prompt = String::new();

    // Header
    prompt.push_str(&format!(
        "# PILOT - Step {} of {}\n\n",
        input.step, input.max_steps
    ));

    prompt.push_str("## SYSTEM\n\n");
    prompt.push_str(
        "You control a computer one action at a time on behalf of the user. \
You see a screenshot of the current screen and the outcome of your earlier actions. \
Choose the single next action that moves the task forward.\n",
    );
    prompt.push_str(&format!("- Host OS: {}\n\n", std::env::consts::OS));

    // Task section
    prompt.push_str("## TASK\n\n");
    prompt.push_str(input.goal);
    prompt.push_str("\n\n");

    if !input.context_block.is_empty() {
        prompt.push_str(input.context_block.trim_end());
        prompt.push_str("\n\n");
    }

    prompt.push_str("## HISTORY\n\n");
    prompt.push_str(&render_history(input.history, input.history_window));
    prompt.push('\n');

    prompt.push_str("## CURRENT SCREEN\n\n");
    if input.screen.description.trim().is_empty() {
        prompt.push_str("(no description available)\n");
    } else {
        prompt.push_str(input.screen.description.trim_end());
        prompt.push('\n');
    }
    if input.screen.has_image() {
        prompt.push_str("A screenshot of the current screen is attached.\n");
    }
    prompt.push('\n');

    prompt.push_str("## AVAILABLE ACTIONS\n\n");
    prompt.push_str(input.action_table.trim_end());
    prompt.push_str("\n\n");

    prompt.push_str("## RESPONSE FORMAT\n\n");
    prompt.push_str("Reply with one JSON object:\n\n");
    prompt.push_str(
        "{\"kind\": \"<action kind>\", \"description\": \"<what this does>\", \"parameters\": {...}}\n\n",
    );
    prompt.push_str(
        "When the task is complete, reply {\"kind\": \"done\", \"description\": \"<summary>\"}.\n",
    );
    if input.history.last().is_some_and(|o| !o.succeeded) {
        prompt.push_str("The last action failed. Check the screen and try a different approach.\n");
    }

    prompt
}

/// Render the last `window` outcomes, oldest first
pub fn render_history(history: &DecisionHistory, window: usize) -> String {
    if history.is_empty() {
        return "No actions taken yet.\n".to_string();
    }

    let recent = history.recent(window);
    let mut out = String::new();
    if recent.len() < history.len() {
        out.push_str(&format!(
            "(showing the last {} of {} actions)\n",
            recent.len(),
            history.len()
        ));
    }

    for outcome in recent {
        let status = match (&outcome.error, outcome.succeeded) {
            (_, true) => "OK".to_string(),
            (Some(err), false) => format!("FAILED: {}", err),
            (None, false) => "FAILED".to_string(),
        };
        out.push_str(&format!(
            "- Step {}: {} -> {}\n",
            outcome.attempted_at,
            outcome.action.summary(),
            status
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::{Action, ActionCommand, ActionOutcome};
    use serde_json::{json, Map};

    fn click(x: f64, y: f64) -> Action {
        let params = json!({"x": x, "y": y}).as_object().unwrap().clone();
        Action::new(ActionCommand::Click { x, y }, None, params)
    }

    fn prompt_for(history: &DecisionHistory, context: &str) -> String {
        let screen = ScreenState::new(vec![1], "URL: https://shop.test\nTitle: Shop");
        build_step_prompt(&StepPrompt {
            goal: "buy a lamp",
            step: 2,
            max_steps: 15,
            context_block: context,
            history,
            history_window: 10,
            screen: &screen,
            action_table: "- click: x (number), y (number)",
        })
    }

    #[test]
    fn test_prompt_sections() {
        let history = DecisionHistory::new();
        let prompt = prompt_for(&history, "");

        assert!(prompt.starts_with("# PILOT - Step 2 of 15"));
        assert!(prompt.contains("## TASK\n\nbuy a lamp"));
        assert!(prompt.contains("No actions taken yet."));
        assert!(prompt.contains("URL: https://shop.test"));
        assert!(prompt.contains("screenshot of the current screen is attached"));
        assert!(prompt.contains("- click: x (number), y (number)"));
        assert!(prompt.contains("\"kind\": \"done\""));
        assert!(!prompt.contains("PROJECT CONTEXT"));
        assert!(!prompt.contains("last action failed"));
    }

    #[test]
    fn test_prompt_includes_context_block() {
        let history = DecisionHistory::new();
        let prompt = prompt_for(&history, "## PROJECT CONTEXT: shop\n\nUse staging.\n");
        assert!(prompt.contains("## PROJECT CONTEXT: shop\n\nUse staging.\n\n## HISTORY"));
    }

    #[test]
    fn test_prompt_flags_failed_last_action() {
        let mut history = DecisionHistory::new();
        history.record(ActionOutcome::failure(click(1.0, 2.0), 1, "element not found"));
        let prompt = prompt_for(&history, "");

        assert!(prompt.contains("-> FAILED: element not found"));
        assert!(prompt.contains("The last action failed."));
    }

    #[test]
    fn test_history_window_keeps_most_recent() {
        let mut history = DecisionHistory::new();
        for step in 1..=5 {
            history.record(ActionOutcome::success(click(step as f64, 0.0), step));
        }

        let rendered = render_history(&history, 2);
        assert!(rendered.starts_with("(showing the last 2 of 5 actions)"));
        assert!(!rendered.contains("Step 3:"));
        assert!(rendered.contains("- Step 4: click"));
        assert!(rendered.contains("- Step 5: click"));
        assert_eq!(rendered.lines().count(), 3);
    }

    #[test]
    fn test_history_without_parameters() {
        let mut history = DecisionHistory::new();
        history.record(ActionOutcome::success(
            Action::new(ActionCommand::Done, None, Map::new()),
            1,
        ));
        assert_eq!(render_history(&history, 10), "- Step 1: done {} -> OK\n");
    }
}
