//! Prompt text sent to the model.

use mcp::Tool;

/// System prompt used when no tools are available.
pub const PLAIN_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Build the system prompt advertising `tools` and the invocation syntax.
pub fn system_prompt(tools: &[Tool]) -> String {
    if tools.is_empty() {
        return PLAIN_SYSTEM_PROMPT.to_string();
    }

    let catalog = tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a helpful AI assistant with access to the following tools:

{catalog}

When you want to use a tool, respond with a special format:
USE_TOOL: tool_name(parameter1=value1, parameter2=value2)

For example:
- USE_TOOL: get_random_number(min=1, max=10)
- USE_TOOL: get_random_string(length=8, charset=alpha)
- USE_TOOL: get_random_choice(choices=["red", "blue", "green"])

You can use multiple tools in one response if needed. Be helpful and use tools when they would be useful to answer the user's question."#
    )
}

/// Build the follow-up user message carrying tool results.
pub fn results_prompt(lines: &[String]) -> String {
    let results = lines.join("\n");
    format!(
        "Tool results:\n{results}\n\nBased on these results, provide a helpful response to the user."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_invocations;

    #[test]
    fn empty_catalog_gets_plain_prompt() {
        assert_eq!(system_prompt(&[]), PLAIN_SYSTEM_PROMPT);
    }

    #[test]
    fn catalog_is_listed() {
        let tools = [
            Tool::new("get_random_number", "Random integer between min and max"),
            Tool::new("get_random_choice", "Pick one of the choices"),
        ];
        let prompt = system_prompt(&tools);

        assert!(prompt.contains("- get_random_number: Random integer between min and max\n"));
        assert!(prompt.contains("- get_random_choice: Pick one of the choices\n"));
        assert!(prompt.contains("USE_TOOL: tool_name(parameter1=value1, parameter2=value2)"));
    }

    #[test]
    fn prompt_examples_parse() {
        let tools = [Tool::new("x", "y")];
        let calls = parse_invocations(&system_prompt(&tools));
        let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "tool_name",
                "get_random_number",
                "get_random_string",
                "get_random_choice"
            ]
        );
    }

    #[test]
    fn results_are_joined() {
        let lines = vec!["a: 1".to_string(), "Tool b not found".to_string()];
        assert_eq!(
            results_prompt(&lines),
            "Tool results:\na: 1\nTool b not found\n\nBased on these results, provide a helpful response to the user."
        );
    }
}
