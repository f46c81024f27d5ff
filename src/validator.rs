//! EDSL code-block detection and validation.
//!
//! Questions sent to the specialized persona may carry fenced code blocks.
//! Untagged fences are assumed to be EDSL and tagged as such before
//! extraction, so users pasting bare ``` blocks still get validation.
//!
//! Validation is advisory: line-level style checks produce warnings and
//! suggestions, never errors, and a block is always reported as valid. The
//! results ride along in the answer so the model's review and the mechanical
//! check can be compared.

use crate::models::ValidationResult;

const FENCE: &str = "```";

/// Rewrite untagged opening fences to ```` ```edsl ````. Closing fences and
/// fences already carrying a language tag are left alone.
pub fn tag_untagged_blocks(text: &str) -> String {
    let mut out = Vec::new();
    let mut inside = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with(FENCE) {
            if !inside && trimmed == FENCE {
                out.push(line.replacen(FENCE, "```edsl", 1));
            } else {
                out.push(line.to_string());
            }
            inside = !inside;
        } else {
            out.push(line.to_string());
        }
    }

    out.join("\n")
}

/// Collect the contents of every ```` ```edsl ```` block, in order.
pub fn extract_edsl_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<String>> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        match &mut current {
            None => {
                if trimmed
                    .strip_prefix(FENCE)
                    .is_some_and(|tag| tag.eq_ignore_ascii_case("edsl"))
                {
                    current = Some(Vec::new());
                }
            }
            Some(lines) => {
                if trimmed == FENCE {
                    blocks.push(lines.join("\n"));
                    current = None;
                } else {
                    lines.push(line.to_string());
                }
            }
        }
    }

    // An unterminated block still counts; users forget closing fences.
    if let Some(lines) = current {
        blocks.push(lines.join("\n"));
    }

    blocks
}

/// Line-level style check of one EDSL block.
///
/// Empty lines and `//` comments are skipped. A statement line that does not
/// end in `;`, `{`, or `}` draws a warning and a suggestion. Nothing here is
/// severe enough to mark the block invalid.
pub fn validate_block(block: &str) -> ValidationResult {
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();

    for (idx, line) in block.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        if !trimmed.ends_with(';') && !trimmed.ends_with('{') && !trimmed.ends_with('}') {
            warnings.push(format!(
                "line {}: statement does not end with ';', '{{' or '}}'",
                idx + 1
            ));
            suggestions.push(format!("line {}: add a terminator, e.g. `{};`", idx + 1, trimmed));
        }
    }

    ValidationResult {
        is_valid: true,
        errors: Vec::new(),
        warnings,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_fence_gets_tagged() {
        let text = "Revisa esto:\n```\nSET x = 1;\n```";
        let tagged = tag_untagged_blocks(text);
        assert!(tagged.contains("```edsl\n"));
        // Closing fence untouched.
        assert!(tagged.ends_with("```"));
    }

    #[test]
    fn existing_language_tag_is_preserved() {
        let text = "```python\nprint(1)\n```";
        assert_eq!(tag_untagged_blocks(text), text);
    }

    #[test]
    fn extracts_multiple_blocks_in_order() {
        let text = "```edsl\nSET a = 1;\n```\ntext\n```edsl\nSET b = 2;\n```";
        let blocks = extract_edsl_blocks(text);
        assert_eq!(blocks, vec!["SET a = 1;", "SET b = 2;"]);
    }

    #[test]
    fn non_edsl_blocks_are_ignored() {
        let text = "```python\nprint(1)\n```";
        assert!(extract_edsl_blocks(text).is_empty());
    }

    #[test]
    fn unterminated_block_is_still_extracted() {
        let text = "```edsl\nSET a = 1;";
        assert_eq!(extract_edsl_blocks(text), vec!["SET a = 1;"]);
    }

    #[test]
    fn clean_block_validates_without_noise() {
        let block = "// setup\nSET x = 1;\nIF x > 0 {\n  SET y = 2;\n}";
        let result = validate_block(block);
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn missing_terminator_warns_but_stays_valid() {
        let block = "IF x > 10 THEN y = 20";
        let result = validate_block(block);
        assert!(result.is_valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("line 1:"));
        assert_eq!(result.suggestions.len(), 1);
    }

    #[test]
    fn tagging_then_extraction_round_trip() {
        let answer = "Aqui tienes el codigo EDSL:\n```\nIF x > 10 THEN y = 20\n```";
        let blocks = extract_edsl_blocks(&tag_untagged_blocks(answer));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0], "IF x > 10 THEN y = 20");
    }
}
