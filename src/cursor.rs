//! Cursor and line-context helpers
//!
//! Positions are character offsets, not byte offsets, so multi-byte text
//! (accents, CJK, emoji) never splits a code point.

/// Literal token the assistant is told to look for in bootstrap prompts.
pub const CURSOR_MARKER: &str = "<CURSOR>";

/// Insert [`CURSOR_MARKER`] at `position`.
///
/// Positions past the end of `content` leave it untouched. Callers get the
/// document back either way, so a stale cursor never blocks a query.
pub fn insert_cursor_marker(content: &str, position: usize) -> String {
    let Some(byte_idx) = byte_offset(content, position) else {
        return content.to_string();
    };

    let mut annotated = String::with_capacity(content.len() + CURSOR_MARKER.len());
    annotated.push_str(&content[..byte_idx]);
    annotated.push_str(CURSOR_MARKER);
    annotated.push_str(&content[byte_idx..]);
    annotated
}

/// 0-based line containing `position` (line breaks strictly before it).
pub fn line_number_at(content: &str, position: usize) -> usize {
    content
        .chars()
        .take(position)
        .filter(|&c| c == '\n')
        .count()
}

/// Numbered window of `lines_before` lines above `cursor_line` plus the
/// cursor line itself.
///
/// Always yields at least one line: the cursor clamps to the last line and an
/// empty document renders as a single empty line 1.
pub fn context_window<S: AsRef<str>>(lines: &[S], cursor_line: usize, lines_before: usize) -> String {
    if lines.is_empty() {
        return "1: ".to_string();
    }

    let end = cursor_line.min(lines.len() - 1);
    let start = end.saturating_sub(lines_before);

    lines[start..=end]
        .iter()
        .enumerate()
        .map(|(offset, line)| format!("{}: {}", start + offset + 1, line.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Character offset just past the region that differs between two snapshots.
///
/// Hosts that only see whole-document snapshots (file polling) use this as the
/// cursor: it lands after inserted text and at the seam of deleted text.
pub fn changed_region_end(previous: &str, current: &str) -> usize {
    let prev: Vec<char> = previous.chars().collect();
    let curr: Vec<char> = current.chars().collect();

    let prefix = prev.iter().zip(&curr).take_while(|(a, b)| a == b).count();
    let max_suffix = prev.len().min(curr.len()) - prefix;
    let suffix = prev
        .iter()
        .rev()
        .zip(curr.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    curr.len() - suffix
}

/// Byte index for a character offset; `None` when past the end.
fn byte_offset(content: &str, position: usize) -> Option<usize> {
    if position == 0 {
        return Some(0);
    }
    match content.char_indices().nth(position) {
        Some((idx, _)) => Some(idx),
        None if content.chars().count() == position => Some(content.len()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_inserted_at_every_valid_position() {
        let content = "ab\ncd";
        for p in 0..=content.chars().count() {
            let annotated = insert_cursor_marker(content, p);
            let (before, after) = annotated.split_once(CURSOR_MARKER).unwrap();
            assert_eq!(before.chars().count(), p);
            assert_eq!(format!("{}{}", before, after), content);
        }
    }

    #[test]
    fn test_marker_out_of_range_returns_input() {
        assert_eq!(insert_cursor_marker("hello", 6), "hello");
        assert_eq!(insert_cursor_marker("", 1), "");
    }

    #[test]
    fn test_marker_unicode_safe() {
        assert_eq!(insert_cursor_marker("héllo", 2), "hé<CURSOR>llo");
        assert_eq!(insert_cursor_marker("こんにちは", 5), "こんにちは<CURSOR>");
    }

    #[test]
    fn test_line_number_counts_breaks_before_position() {
        let content = "zero\none\ntwo";
        assert_eq!(line_number_at(content, 0), 0);
        assert_eq!(line_number_at(content, 4), 0);
        // Position 5 is the first char after the first break.
        assert_eq!(line_number_at(content, 5), 1);
        assert_eq!(line_number_at(content, 9), 2);
        assert_eq!(line_number_at(content, 100), 2);
    }

    #[test]
    fn test_context_window_clamps_to_start() {
        let lines = ["a", "b", "c", "d"];
        assert_eq!(context_window(&lines, 0, 2), "1: a");
        assert_eq!(context_window(&lines, 1, 2), "1: a\n2: b");
        assert_eq!(context_window(&lines, 3, 2), "2: b\n3: c\n4: d");
    }

    #[test]
    fn test_changed_region_end() {
        assert_eq!(changed_region_end("hello", "hello world"), 11);
        assert_eq!(changed_region_end("hello world", "hello"), 5);
        assert_eq!(changed_region_end("ab\ncd", "ab\nXcd"), 4);
        assert_eq!(changed_region_end("aaa", "aaaa"), 4);
        assert_eq!(changed_region_end("same", "same"), 4);
    }

    #[test]
    fn test_context_window_never_empty() {
        let empty: [&str; 0] = [];
        assert_eq!(context_window(&empty, 0, 2), "1: ");
        assert_eq!(context_window(&["only"], 7, 2), "1: only");
    }
}
