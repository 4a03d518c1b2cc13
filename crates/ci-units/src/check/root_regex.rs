//! The `spec.inputs.units.regex` field of the root pipeline.
//!
//! The root pipeline is hand maintained, so the field is located by
//! indentation alone and only the scalar's own bytes are ever rewritten.
//! Parsing and re-emitting the whole document would reformat everything
//! around it.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

// `key:` optionally followed by an inline value or comment.
static KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent> *)(?P<key>[A-Za-z_][A-Za-z0-9_-]*):(?:[ \t]+(?P<rest>.*))?$")
        .unwrap()
});

/// Regex accepted by the root pipeline's `units` input for the given ids.
///
/// Ids are sorted and deduplicated. The result accepts `all` or a comma
/// separated list of ids.
pub fn expected_units_regex<I, S>(ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let ids: BTreeSet<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
    if ids.is_empty() {
        return "^(all)$".to_string();
    }

    let alternatives = ids.into_iter().collect::<Vec<_>>().join("|");
    format!("^(all|{0}(,{0})*)$", alternatives)
}

/// How the scalar is written in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Plain,
    Single,
    Double,
}

impl QuoteStyle {
    /// Renders `value` in this style. Plain values that YAML would
    /// misread fall back to single quotes.
    pub fn render(self, value: &str) -> String {
        match self {
            QuoteStyle::Plain if is_plain_safe(value) => value.to_string(),
            QuoteStyle::Plain | QuoteStyle::Single => format!("'{}'", value.replace('\'', "''")),
            QuoteStyle::Double => {
                format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
            }
        }
    }
}

fn is_plain_safe(value: &str) -> bool {
    const INDICATORS: &[char] = &[
        '-', '?', ':', ',', '[', ']', '{', '}', '#', '&', '*', '!', '|', '>', '\'', '"', '%', '@',
        '`',
    ];

    !value.is_empty()
        && !value.starts_with(INDICATORS)
        && !value.contains(": ")
        && !value.contains(" #")
        && value.trim() == value
}

/// Location of the units regex inside the root pipeline text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRegex {
    /// Unquoted value.
    pub value: String,
    /// Byte range of the scalar, quotes included.
    pub span: Range<usize>,
    pub style: QuoteStyle,
}

struct Line<'a> {
    start: usize,
    text: &'a str,
}

impl RootRegex {
    /// Finds `spec: / inputs: / units: / regex: <value>`, each key nested
    /// one level below the previous one. Other keys may sit alongside.
    pub fn find(content: &str) -> Option<Self> {
        let lines = split_lines(content);

        // Only a top-level `spec:` opens the header.
        let spec = lines.iter().position(|line| {
            KEY_LINE.captures(line.text).is_some_and(|caps| {
                let rest = caps.name("rest").map(|m| m.as_str().trim()).unwrap_or("");
                caps["indent"].is_empty()
                    && &caps["key"] == "spec"
                    && (rest.is_empty() || rest.starts_with('#'))
            })
        })?;

        let (inputs, inputs_indent) = find_child(&lines, spec, 0, "inputs")?;
        let (units, units_indent) = find_child(&lines, inputs, inputs_indent, "units")?;
        let (regex, _) = find_child(&lines, units, units_indent, "regex")?;

        let line = &lines[regex];
        let caps = KEY_LINE.captures(line.text)?;
        let rest = caps.name("rest")?;
        let (relative, style, value) = parse_scalar(rest.as_str())?;

        let offset = line.start + rest.start();
        Some(Self {
            value,
            span: offset + relative.start..offset + relative.end,
            style,
        })
    }

    /// Returns `content` with only the scalar replaced by `new_value`.
    pub fn replace(&self, content: &str, new_value: &str) -> String {
        let mut out = String::with_capacity(content.len() + new_value.len());
        out.push_str(&content[..self.span.start]);
        out.push_str(&self.style.render(new_value));
        out.push_str(&content[self.span.end..]);
        out
    }
}

fn split_lines(content: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for raw in content.split_inclusive('\n') {
        let text = raw.trim_end_matches('\n').trim_end_matches('\r');
        lines.push(Line { start, text });
        start += raw.len();
    }
    lines
}

/// Indentation of a line carrying content; blank and comment lines have none.
fn content_indent(text: &str) -> Option<usize> {
    let trimmed = text.trim_start_matches(' ');
    if trimmed.trim().is_empty() || trimmed.starts_with('#') {
        None
    } else {
        Some(text.len() - trimmed.len())
    }
}

/// Finds the direct child `key` of the block opened at line `parent`.
fn find_child(
    lines: &[Line<'_>],
    parent: usize,
    parent_indent: usize,
    key: &str,
) -> Option<(usize, usize)> {
    let mut child_indent = None;

    for (i, line) in lines.iter().enumerate().skip(parent + 1) {
        let Some(indent) = content_indent(line.text) else {
            continue;
        };
        if indent <= parent_indent {
            break;
        }

        let level = *child_indent.get_or_insert(indent);
        if indent != level {
            continue;
        }

        if let Some(caps) = KEY_LINE.captures(line.text) {
            if &caps["key"] == key {
                return Some((i, indent));
            }
        }
    }

    None
}

/// Parses the inline scalar at the start of `rest`.
fn parse_scalar(rest: &str) -> Option<(Range<usize>, QuoteStyle, String)> {
    let mut chars = rest.char_indices().peekable();
    match chars.peek().map(|&(_, c)| c)? {
        '\'' => {
            chars.next();
            let mut value = String::new();
            while let Some((i, c)) = chars.next() {
                if c == '\'' {
                    if matches!(chars.peek(), Some(&(_, '\''))) {
                        chars.next();
                        value.push('\'');
                    } else {
                        return Some((0..i + 1, QuoteStyle::Single, value));
                    }
                } else {
                    value.push(c);
                }
            }
            None
        }
        '"' => {
            chars.next();
            let mut value = String::new();
            while let Some((i, c)) = chars.next() {
                match c {
                    '"' => return Some((0..i + 1, QuoteStyle::Double, value)),
                    '\\' => match chars.next()? {
                        (_, '"') => value.push('"'),
                        (_, '\\') => value.push('\\'),
                        (_, other) => {
                            value.push('\\');
                            value.push(other);
                        }
                    },
                    _ => value.push(c),
                }
            }
            None
        }
        '|' | '>' | '#' => None,
        _ => {
            let end = rest.find(" #").unwrap_or(rest.len());
            let value = rest[..end].trim_end();
            if value.is_empty() {
                return None;
            }
            Some((0..value.len(), QuoteStyle::Plain, value.to_string()))
        }
    }
}
