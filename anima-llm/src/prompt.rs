//! Prompt templates for LLM operations.
//!
//! Templates use `{key}` placeholders filled by [`render_template`]. The
//! extraction prompt is bilingual by design: the instruction body is the
//! product's original Chinese wording, with an English system line pinning
//! the output contract.

/// System prompt for the memory-extraction call.
pub const EXTRACTION_SYSTEM: &str =
    "You are a memory extraction assistant. Output valid JSON only.";

/// User prompt template for the memory-extraction call.
///
/// Placeholders: `{conversation}` — the formatted message window;
/// `{max_per_category}` — cap per output array.
pub const EXTRACTION_USER: &str = r#"分析以下对话，提取关于用户的记忆信息。

对话内容:
{conversation}

请以 JSON 格式输出:
{
  "facts": ["事实性信息..."],
  "preferences": ["用户偏好..."],
  "relationships": ["关系信息..."],
  "events": ["重要事件..."]
}

只提取明确或可合理推断的信息，不要编造。每个类别最多{max_per_category}条。"#;

/// Simple template interpolation: replaces `{key}` with the corresponding
/// value, leaving unknown placeholders untouched.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}
