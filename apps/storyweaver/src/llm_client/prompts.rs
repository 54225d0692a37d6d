// Shared prompt constants and prompt-building utilities.
// Each module that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Writer persona prepended to every narrative prompt.
pub const WRITER_PERSONA: &str = "You are a story writer. Your goal is to create an engaging story that will be remembered by the reader.
The story is lived by the reader, so it is told from the reader's perspective in the second person.

The story should be straightforward and concrete. Keep it clear and relatable, and avoid abstract concepts or overly complex ideas such as decisions about feelings. It should be engaging and easy to follow.
The story is lived as a \"story game\" by the reader.

Do not write explicitly that this is a \"story game\" and do not say that the reader's choices will matter. Write the story as if it was a book.
";

/// Closing instruction appended to every prompt that expects a JSON answer.
/// Replace `{format}` with the expected shape.
pub const JSON_ANSWER_INSTRUCTION: &str = "
Your answer must contain a single JSON object in the following format:
{format}
Make sure your answer is valid JSON. Do NOT include any text outside the JSON object.";

/// Builds the JSON answer instruction for a given shape.
pub fn json_answer(format: &str) -> String {
    fill_placeholders(JSON_ANSWER_INSTRUCTION, &[("format", format)])
}

/// Substitutes `{name}` placeholders in a single pass over `template`.
/// Substituted values are never scanned again, and unknown names stay as written.
pub fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut filled = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        filled.push_str(&rest[..open]);
        let tail = &rest[open..];
        let substitution = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (close, *value))
        });
        match substitution {
            Some((close, value)) => {
                filled.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                filled.push('{');
                rest = &tail[1..];
            }
        }
    }

    filled.push_str(rest);
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_answer_embeds_format() {
        let text = json_answer("{\"idea\": \"...\"}");
        assert!(text.contains("{\"idea\": \"...\"}"));
        assert!(!text.contains("{format}"));
    }

    #[test]
    fn test_fill_placeholders_does_not_expand_substituted_values() {
        let filled = fill_placeholders(
            "Overview: {overview}\nStory: {story}",
            &[("overview", "a {story} inside"), ("story", "Once.")],
        );
        assert_eq!(filled, "Overview: a {story} inside\nStory: Once.");
    }

    #[test]
    fn test_fill_placeholders_keeps_unknown_braces() {
        let filled = fill_placeholders("{\"idea\": \"{idea}\"} {missing", &[("idea", "a ship")]);
        assert_eq!(filled, "{\"idea\": \"a ship\"} {missing");
    }
}
