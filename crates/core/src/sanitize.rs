//! Neutralises user-supplied text before it is stored or echoed back.
//!
//! No markup is allowed through. Both sanitizers are idempotent.

const BLOCKED_SCHEMES: &[&str] = &["javascript:", "vbscript:"];
const FILENAME_PLACEHOLDER: char = '_';
const MAX_EXTENSION_LEN: usize = 10;

pub fn sanitize_text(text: &str) -> String {
    let stripped = strip_markup(text);
    let mut cleaned = stripped
        .chars()
        .filter(|ch| !ch.is_control() || matches!(ch, '\n' | '\t'))
        .collect::<String>();

    loop {
        let next = remove_blocked_schemes(&cleaned);
        if next == cleaned {
            break;
        }
        cleaned = next;
    }

    cleaned.trim().to_string()
}

fn strip_markup(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '<' => {
                let opens_tag = chars
                    .peek()
                    .map(|next| next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?'))
                    .unwrap_or(false);
                if opens_tag {
                    for inner in chars.by_ref() {
                        if inner == '>' {
                            break;
                        }
                    }
                }
            }
            '>' => {}
            other => output.push(other),
        }
    }

    output
}

fn remove_blocked_schemes(text: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lowered = text.to_ascii_lowercase();
    for scheme in BLOCKED_SCHEMES {
        if let Some(index) = lowered.find(scheme) {
            let mut output = String::with_capacity(text.len());
            output.push_str(&text[..index]);
            output.push_str(&text[index + scheme.len()..]);
            return output;
        }
    }

    text.to_string()
}

/// Reduces a client-supplied file name to `[A-Za-z0-9._-]`, collapsing runs of
/// separators and keeping the extension when truncating to `max_len`.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let mut output = String::with_capacity(base.len());
    for ch in base.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
            ch
        } else {
            FILENAME_PLACEHOLDER
        };
        let previous = output.chars().last();
        let is_separator = matches!(mapped, '.' | '-' | '_');
        if is_separator && previous == Some(mapped) {
            continue;
        }
        output.push(mapped);
    }

    let trimmed = output.trim_start_matches(['.', '_', '-']).to_string();
    let trimmed = if trimmed.is_empty() { "file".to_string() } else { trimmed };

    truncate_preserving_extension(&trimmed, max_len.max(1))
}

fn truncate_preserving_extension(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }

    match name.rsplit_once('.') {
        Some((stem, extension))
            if !stem.is_empty()
                && extension.len() <= MAX_EXTENSION_LEN
                && extension.len() + 2 <= max_len =>
        {
            let keep = max_len - extension.len() - 1;
            let stem = stem[..keep].trim_end_matches(['.', '_', '-']);
            let stem = if stem.is_empty() { "file" } else { stem };
            format!("{stem}.{extension}")
        }
        _ => name[..max_len].to_string(),
    }
}
