/// Truncate a string to at most `max_bytes` bytes at a character boundary.
pub fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) && end > 0 {
        end -= 1;
    }
    &s[..end]
}

/// Strip a markdown code fence the model wrapped around its JSON.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Cut the outermost `{ ... }` span out of a response that has chatter around
/// it. Falls back to the fence-stripped text.
pub fn json_object_span(response: &str) -> &str {
    let text = strip_code_blocks(response);
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_never_splits_a_character() {
        let text = "slow living 慢生活";
        let truncated = truncate_to_char_boundary(text, 14);
        assert!(truncated.len() <= 14);
        assert!(text.starts_with(truncated));
        assert_eq!(truncate_to_char_boundary("short", 100), "short");
    }

    #[test]
    fn fences_are_removed() {
        assert_eq!(strip_code_blocks("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_blocks("```\n[]\n```"), "[]");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }

    #[test]
    fn object_span_drops_surrounding_prose() {
        let raw = "Here is the matrix:\n{\"core_tags\": [\"visual curator\"]}\nHope this helps.";
        assert_eq!(json_object_span(raw), "{\"core_tags\": [\"visual curator\"]}");
        assert_eq!(json_object_span("no json here"), "no json here");
    }
}
