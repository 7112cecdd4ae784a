//! Small text helpers shared across nodes.

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn clip(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Extract the first well-formed JSON object from free text.
///
/// Models often wrap JSON in prose or markdown fences; this scans for a
/// fenced block first, then brace-matches from the first `{`, tracking
/// string literals so braces inside values don't unbalance the count.
pub fn extract_json_object(text: &str) -> Option<&str> {
    if let Some(inner) = extract_fenced_block(text) {
        if let Some(obj) = balanced_slice(inner, '{', '}') {
            return Some(obj);
        }
    }
    balanced_slice(text, '{', '}')
}

/// Same as [`extract_json_object`] for a top-level JSON array.
pub fn extract_json_array(text: &str) -> Option<&str> {
    if let Some(inner) = extract_fenced_block(text) {
        if let Some(arr) = balanced_slice(inner, '[', ']') {
            return Some(arr);
        }
    }
    balanced_slice(text, '[', ']')
}

fn extract_fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // skip an optional language tag on the fence line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

fn balanced_slice(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + close.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

/// First four-digit run in a string, for publication years.
pub fn extract_year(date: &str) -> Option<String> {
    let bytes = date.as_bytes();
    bytes
        .windows(4)
        .position(|w| w.iter().all(|b| b.is_ascii_digit()))
        .filter(|&i| {
            // reject runs embedded in longer digit sequences
            (i == 0 || !bytes[i - 1].is_ascii_digit())
                && (i + 4 >= bytes.len() || !bytes[i + 4].is_ascii_digit())
        })
        .map(|i| date[i..i + 4].to_string())
}
