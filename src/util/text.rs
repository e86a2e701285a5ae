use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: char = '…';

/// Display width of a string in terminal columns (CJK and emoji count 2).
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncates `s` to at most `max_width` columns, ending in `…` when cut.
///
/// Borrows when the string already fits.
///
/// ```
/// use riffle::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 6), "Hello…");
/// assert_eq!(truncate_to_width("Test", 0), "");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width == 0 {
        return Cow::Borrowed("");
    }

    // One column is reserved for the ellipsis.
    let budget = max_width - 1;
    let mut used = 0;
    let mut out = String::with_capacity(s.len().min(max_width * 4));
    for c in s.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push(ELLIPSIS);
    Cow::Owned(out)
}

/// Removes terminal control characters and ANSI escape sequences.
///
/// Item titles and bodies come from arbitrary third-party feeds, so anything
/// that could move the cursor or rewrite the terminal title is dropped before
/// it reaches the renderer. Tab, newline and carriage return survive.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Escape {
        None,
        Start,
        Csi,
        Osc,
        OscEsc,
    }

    let mut out = String::with_capacity(s.len());
    let mut state = Escape::None;
    for c in s.chars() {
        state = match (state, c) {
            (Escape::None, '\x1b') => Escape::Start,
            (Escape::None, c) if is_stripped_control(c) => Escape::None,
            (Escape::None, c) => {
                out.push(c);
                Escape::None
            }
            (Escape::Start, '[') => Escape::Csi,
            (Escape::Start, ']') => Escape::Osc,
            // Bare ESC: drop it and treat the next char normally.
            (Escape::Start, '\x1b') => Escape::Start,
            (Escape::Start, c) => {
                if !is_stripped_control(c) {
                    out.push(c);
                }
                Escape::None
            }
            (Escape::Csi, '\x40'..='\x7e') => Escape::None,
            (Escape::Csi, _) => Escape::Csi,
            (Escape::Osc, '\x07') => Escape::None,
            (Escape::Osc, '\x1b') => Escape::OscEsc,
            (Escape::Osc, _) => Escape::Osc,
            (Escape::OscEsc, '\\') => Escape::None,
            (Escape::OscEsc, _) => Escape::Osc,
        };
    }
    Cow::Owned(out)
}

fn is_stripped_control(c: char) -> bool {
    (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r')) || c == '\x1b'
}

/// Greedy word wrap to `width` columns.
///
/// Words wider than the line are hard-split. Blank input lines are preserved
/// as empty output lines so paragraph breaks survive.
pub fn wrap_to_width(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_width = 0;

        for word in paragraph.split_whitespace() {
            let word_width = display_width(word);
            let sep = usize::from(!line.is_empty());

            if line_width + sep + word_width <= width {
                if sep == 1 {
                    line.push(' ');
                }
                line.push_str(word);
                line_width += sep + word_width;
                continue;
            }

            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
                line_width = 0;
            }

            if word_width <= width {
                line.push_str(word);
                line_width = word_width;
                continue;
            }

            for c in word.chars() {
                let w = UnicodeWidthChar::width(c).unwrap_or(0);
                if line_width + w > width && !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                    line_width = 0;
                }
                line.push(c);
                line_width += w;
            }
        }

        lines.push(line);
    }

    lines
}
