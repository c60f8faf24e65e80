pub mod subagent;

pub use subagent::{Subagent, SubagentLoader, SubagentMetadata};

/// Combine subagent instructions with the task prompt.
///
/// An empty (or whitespace-only) subagent body leaves the prompt untouched.
pub fn compose_prompt(subagent_body: &str, prompt: &str) -> String {
    let persona = subagent_body.trim();
    if persona.is_empty() {
        return prompt.to_string();
    }

    let mut out = String::with_capacity(persona.len() + prompt.len() + 16);
    out.push_str(persona);
    out.push_str("\n\n## Task\n\n");
    out.push_str(prompt);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_persona_passes_prompt_through() {
        assert_eq!(compose_prompt("", "fix the bug"), "fix the bug");
        assert_eq!(compose_prompt("  \n", "fix the bug"), "fix the bug");
    }

    #[test]
    fn persona_precedes_task() {
        let out = compose_prompt("You review code.\n", "fix the bug");
        assert_eq!(out, "You review code.\n\n## Task\n\nfix the bug");
    }
}
