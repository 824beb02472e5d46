//! Commit message prompt template
//!
//! The template is embedded at compile time and uses `{{VARIABLE}}`
//! placeholders.

const COMMIT_MESSAGE_PROMPT: &str = include_str!("prompts/commit_message.md");

const EMOJI_RULE: &str = "* Prepend one emoji that expresses the nature of the changes, as specific to their subject or action as possible.\n";

/// Values substituted into the commit message template
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    diffs: String,
    use_emojis: bool,
    custom_instructions: Option<String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-file diff sections
    pub fn with_diffs(mut self, diffs: impl Into<String>) -> Self {
        self.diffs = diffs.into();
        self
    }

    pub fn with_emojis(mut self, use_emojis: bool) -> Self {
        self.use_emojis = use_emojis;
        self
    }

    /// Extra user instructions; blank text counts as none
    pub fn with_custom_instructions(mut self, instructions: Option<&str>) -> Self {
        self.custom_instructions = instructions
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }
}

/// Render the commit message prompt
pub fn render_commit_prompt(context: &PromptContext) -> String {
    let emoji = if context.use_emojis { EMOJI_RULE } else { "" };
    let custom = match &context.custom_instructions {
        Some(text) => format!("# Additional Instructions (Important!)\n\n{}\n\n", text),
        None => String::new(),
    };

    // Diffs last so file contents are never scanned for placeholders
    [
        ("EMOJI_RULE", emoji.to_string()),
        ("CUSTOM_INSTRUCTIONS", custom),
        ("DIFFS", context.diffs.clone()),
    ]
    .iter()
    .fold(COMMIT_MESSAGE_PROMPT.to_string(), |acc, (key, value)| {
        acc.replacen(&format!("{{{{{}}}}}", key), value, 1)
    })
}
