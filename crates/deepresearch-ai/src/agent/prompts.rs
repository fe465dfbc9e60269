//! System prompt loading and placeholder rendering

use std::path::Path;

use chrono::Local;

use crate::agent::context::Source;
use crate::error::{AiError, Result};
use crate::tools::ToolKind;

pub const DEFAULT_SYSTEM_PROMPT_FILE: &str = "system_prompt.txt";

const DEFAULT_SYSTEM_PROMPT_ASSET: &str = include_str!("../../assets/prompts/system_prompt.txt");

const PLACEHOLDERS: [&str; 4] = [
    "current_date",
    "available_tools",
    "user_request",
    "sources_formatted",
];

/// System prompt template with `{name}` placeholders
#[derive(Debug, Clone)]
pub struct PromptLoader {
    template: String,
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptLoader {
    pub fn builtin() -> Self {
        Self {
            template: DEFAULT_SYSTEM_PROMPT_ASSET.trim().to_string(),
        }
    }

    /// Validate a custom template. Unknown placeholders are rejected here
    /// rather than on the first agent step.
    pub fn from_template(template: impl Into<String>) -> Result<Self> {
        let template = template.into().trim().to_string();
        let blanks: Vec<(&str, &str)> = PLACEHOLDERS.iter().map(|name| (*name, "")).collect();
        render_placeholders(&template, &blanks)?;
        Ok(Self { template })
    }

    /// Load `file` from `prompts_dir`, falling back to the built-in template
    /// when no directory is configured or the file does not exist.
    pub async fn load(prompts_dir: Option<&Path>, file: &str) -> Result<Self> {
        let Some(dir) = prompts_dir else {
            return Ok(Self::builtin());
        };
        let path = dir.join(file);
        if !tokio::fs::try_exists(&path).await? {
            tracing::debug!(path = %path.display(), "Prompt file not found, using built-in template");
            return Ok(Self::builtin());
        }
        let content = tokio::fs::read_to_string(&path).await?;
        tracing::info!(path = %path.display(), "Loaded system prompt template");
        Self::from_template(content)
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn system_prompt(
        &self,
        user_request: &str,
        tools: &[ToolKind],
        sources: &[Source],
    ) -> Result<String> {
        let current_date = Local::now().format("%Y-%m-%d-%H:%M:%S").to_string();
        let available_tools = tools
            .iter()
            .enumerate()
            .map(|(i, tool)| format!("{}. {}: {}", i + 1, tool.name(), tool.description()))
            .collect::<Vec<_>>()
            .join("\n");
        let sources_formatted = sources
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");

        render_placeholders(
            &self.template,
            &[
                ("current_date", &current_date),
                ("available_tools", &available_tools),
                ("user_request", user_request),
                ("sources_formatted", &sources_formatted),
            ],
        )
    }
}

/// Substitute `{name}` placeholders in one pass. `{{` and `}}` produce
/// literal braces; any other name is an error.
pub fn render_placeholders(template: &str, values: &[(&str, &str)]) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                rendered.push('{');
            }
            '{' => {
                let rest = &template[i + 1..];
                let end = rest.find('}').ok_or_else(|| {
                    AiError::InvalidFormat("Unclosed placeholder in system prompt template".into())
                })?;
                let name = &rest[..end];
                let value = values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| {
                        AiError::InvalidFormat(format!(
                            "Missing placeholder in system prompt template: '{name}'"
                        ))
                    })?;
                rendered.push_str(value);
                for _ in 0..=name.chars().count() {
                    chars.next();
                }
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                rendered.push('}');
            }
            '}' => {
                return Err(AiError::InvalidFormat(
                    "Single '}' encountered in system prompt template".into(),
                ));
            }
            other => rendered.push(other),
        }
    }

    Ok(rendered)
}
