//! ============================================================================
//! Content Preparer - Fit result text into ledger storage limits
//! ============================================================================
//! Strings stored by the contract are paid for per byte, so results are
//! capped at a byte ceiling and a character ceiling. Oversized content is cut
//! at a natural break where possible and annotated with a truncation notice.
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::types::PreparedContent;

/// Maximum characters stored on-ledger
pub const MAX_TEXT_CHARS: usize = 5000;

/// Maximum UTF-8 bytes stored on-ledger (~10KB)
pub const MAX_TEXT_BYTES: usize = 10240;

/// Length of the original-content prefix quoted in the truncation notice
pub const SUMMARY_LENGTH: usize = 100;

/// Fraction of the estimated character budget actually used
const SAFETY_MARGIN: f64 = 0.9;

/// A break must sit at or beyond this fraction of the budget to be used
const MIN_BREAK_FRACTION: f64 = 0.8;

/// Storage limits applied by [`prepare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLimits {
    pub max_chars: usize,
    pub max_bytes: usize,
    pub summary_len: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            max_chars: MAX_TEXT_CHARS,
            max_bytes: MAX_TEXT_BYTES,
            summary_len: SUMMARY_LENGTH,
        }
    }
}

impl StorageLimits {
    pub fn prepare(&self, content: &str) -> PreparedContent {
        prepare(content, self.max_chars, self.max_bytes, self.summary_len)
    }
}

/// Normalize `content` so its UTF-8 size never exceeds `byte_limit`.
///
/// Content already within the byte limit is returned untouched. Otherwise the
/// text is cut to an estimated character budget, moved back to the last
/// paragraph or sentence break when that break is close enough to the budget,
/// and suffixed with a notice quoting the original size and its first
/// `summary_len` characters. The annotated result is re-checked against
/// `byte_limit` and trimmed again if the notice pushed it over.
pub fn prepare(
    content: &str,
    char_limit: usize,
    byte_limit: usize,
    summary_len: usize,
) -> PreparedContent {
    let original_length = content.chars().count();
    let byte_size = content.len();

    if byte_size <= byte_limit {
        return PreparedContent {
            original_length,
            original_byte_size: byte_size,
            truncated: false,
            content: content.to_string(),
            truncated_length: None,
            truncated_byte_size: None,
        };
    }

    let ratio = byte_limit as f64 / byte_size as f64;
    let safe_chars = ((original_length as f64 * ratio * SAFETY_MARGIN) as usize).min(char_limit);

    let window = prefix_chars(content, safe_chars);
    let body = cut_at_natural_break(window, safe_chars);

    let summary = prefix_chars(content, summary_len);
    let notice = format!(
        "\n\n[Content was truncated to fit ledger storage limits. \
         Original length: {} characters / {} bytes. Summary: {}...]",
        original_length, byte_size, summary
    );

    let final_content = fit_within(body, &notice, byte_limit);

    PreparedContent {
        original_length,
        original_byte_size: byte_size,
        truncated: true,
        truncated_length: Some(final_content.chars().count()),
        truncated_byte_size: Some(final_content.len()),
        content: final_content,
    }
}

/// First `n` characters of `s`
fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Cut `window` after the last paragraph or sentence break if that break
/// lies at or beyond `MIN_BREAK_FRACTION` of `budget` characters.
fn cut_at_natural_break(window: &str, budget: usize) -> &str {
    let last_paragraph = window.rfind("\n\n");
    let last_sentence = window.rfind(". ");

    let Some(byte_pos) = last_paragraph.max(last_sentence) else {
        return window;
    };

    let char_pos = window[..byte_pos].chars().count();
    let threshold = (budget as f64 * MIN_BREAK_FRACTION) as usize;

    if char_pos >= threshold {
        // Keep the terminator itself ('.' or the first '\n'), both one byte
        &window[..byte_pos + 1]
    } else {
        window
    }
}

/// Join `body` and `notice`, trimming the body (and, if it is not enough, the
/// notice) at character boundaries until the result fits `byte_limit`.
fn fit_within(body: &str, notice: &str, byte_limit: usize) -> String {
    if body.len() + notice.len() <= byte_limit {
        return format!("{}{}", body, notice);
    }

    if notice.len() <= byte_limit {
        let keep = floor_char_boundary(body, byte_limit - notice.len());
        return format!("{}{}", &body[..keep], notice);
    }

    let keep = floor_char_boundary(notice, byte_limit);
    notice[..keep].to_string()
}

/// Largest char boundary in `s` that is `<= index`
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut idx = index;
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
