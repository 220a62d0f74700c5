//! Candidate extraction from raw model output

const FENCE: &str = "```";

/// Trim the raw output; with `code_blocks`, return the body of the first
/// fenced code block when there is one.
pub fn extract_candidate(raw: &str, code_blocks: bool) -> String {
    let trimmed = raw.trim();
    let block = if code_blocks { first_code_block(trimmed) } else { None };
    block.unwrap_or(trimmed).trim().to_string()
}

fn first_code_block(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let after_fence = &text[open + FENCE.len()..];
    // Skip the info string ("json", "rust", ...) up to the end of the line
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find(FENCE)?;
    Some(&body[..close])
}
