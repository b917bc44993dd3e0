//! Lexical checks and repairs for component code pulled out of model output.
//!
//! Nothing in here executes code. Brackets are tracked outside of string
//! literals (`'…'`, `"…"`, `` `…` ``) and comments (`//…`, `/*…*/`), and the
//! `try`/`catch`/`finally` pairing is keyword counting, nothing more.

use regex::Regex;
use std::sync::OnceLock;

/// How far back from the end of a cut-off code string to look for a `}`.
pub const TRAILING_WINDOW: usize = 500;

static TRY_RE: OnceLock<Regex> = OnceLock::new();
static CATCH_RE: OnceLock<Regex> = OnceLock::new();
static FINALLY_RE: OnceLock<Regex> = OnceLock::new();

pub(crate) fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern"))
}

pub(crate) fn try_re() -> &'static Regex {
    static_regex(&TRY_RE, r"\btry\s*\{")
}

pub(crate) fn catch_re() -> &'static Regex {
    static_regex(&CATCH_RE, r"\bcatch\s*[({]")
}

pub(crate) fn finally_re() -> &'static Regex {
    static_regex(&FINALLY_RE, r"\bfinally\s*\{")
}

/// Where the lexer was when the input ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    Code,
    Str(char),
    LineComment,
    BlockComment,
}

struct Lexed {
    /// Bracket characters found outside strings and comments, with byte offsets.
    brackets: Vec<(usize, char)>,
    tail: Tail,
    /// Input ended right after a backslash inside a string.
    dangling_escape: bool,
}

fn lex(code: &str) -> Lexed {
    let mut brackets = Vec::new();
    let mut state = Tail::Code;
    let mut dangling_escape = false;
    let mut chars = code.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match state {
            Tail::Code => match c {
                '\'' | '"' | '`' => state = Tail::Str(c),
                '/' => match chars.peek() {
                    Some((_, '/')) => {
                        chars.next();
                        state = Tail::LineComment;
                    }
                    Some((_, '*')) => {
                        chars.next();
                        state = Tail::BlockComment;
                    }
                    _ => {}
                },
                '(' | '[' | '{' | ')' | ']' | '}' => brackets.push((i, c)),
                _ => {}
            },
            Tail::Str(quote) => {
                if c == '\\' {
                    dangling_escape = chars.next().is_none();
                } else if c == quote {
                    state = Tail::Code;
                }
            }
            Tail::LineComment => {
                if c == '\n' {
                    state = Tail::Code;
                }
            }
            Tail::BlockComment => {
                if c == '*' && matches!(chars.peek(), Some((_, '/'))) {
                    chars.next();
                    state = Tail::Code;
                }
            }
        }
    }

    Lexed {
        brackets,
        tail: state,
        dangling_escape,
    }
}

/// `code` with the inside of every string literal and comment blanked out,
/// so identifier scans only see code. Offsets and line breaks are preserved.
pub fn mask_literals(code: &str) -> String {
    let mut masked = String::with_capacity(code.len());
    let mut state = Tail::Code;
    let mut chars = code.chars().peekable();

    let blank = |c: char| if c == '\n' { '\n' } else { ' ' };
    let push_blanked = |masked: &mut String, c: char| {
        for _ in 0..c.len_utf8() {
            masked.push(blank(c));
        }
    };

    while let Some(c) = chars.next() {
        match state {
            Tail::Code => {
                masked.push(c);
                match c {
                    '\'' | '"' | '`' => state = Tail::Str(c),
                    '/' if matches!(chars.peek(), Some('/')) => {
                        chars.next();
                        masked.pop();
                        masked.push_str("  ");
                        state = Tail::LineComment;
                    }
                    '/' if matches!(chars.peek(), Some('*')) => {
                        chars.next();
                        masked.pop();
                        masked.push_str("  ");
                        state = Tail::BlockComment;
                    }
                    _ => {}
                }
            }
            Tail::Str(quote) => {
                if c == quote {
                    masked.push(c);
                    state = Tail::Code;
                } else {
                    push_blanked(&mut masked, c);
                    if c == '\\' {
                        if let Some(escaped) = chars.next() {
                            push_blanked(&mut masked, escaped);
                        }
                    }
                }
            }
            Tail::LineComment => {
                push_blanked(&mut masked, c);
                if c == '\n' {
                    state = Tail::Code;
                }
            }
            Tail::BlockComment => {
                push_blanked(&mut masked, c);
                if c == '*' && matches!(chars.peek(), Some('/')) {
                    chars.next();
                    masked.push(' ');
                    state = Tail::Code;
                }
            }
        }
    }
    masked
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn is_opener(c: char) -> bool {
    matches!(c, '(' | '[' | '{')
}

/// Walk the brackets, returning the openers left unclosed and whether any
/// closer failed to match the innermost opener.
fn unclosed(lexed: &Lexed) -> (Vec<char>, bool) {
    let mut stack = Vec::new();
    let mut mismatched = false;
    for &(_, c) in &lexed.brackets {
        if is_opener(c) {
            stack.push(c);
        } else if stack.last().map(|&o| closer_for(o)) == Some(c) {
            stack.pop();
        } else {
            mismatched = true;
        }
    }
    (stack, mismatched)
}

/// Every bracket closed in order, no string or comment left open.
pub fn is_balanced(code: &str) -> bool {
    let lexed = lex(code);
    let (open, mismatched) = unclosed(&lexed);
    !mismatched && open.is_empty() && matches!(lexed.tail, Tail::Code | Tail::LineComment)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TryCounts {
    pub tries: usize,
    pub catches: usize,
    pub finallies: usize,
}

impl TryCounts {
    /// Keywords inside strings and comments are not counted.
    pub fn of(code: &str) -> Self {
        let masked = mask_literals(code);
        Self {
            tries: try_re().find_iter(&masked).count(),
            catches: catch_re().find_iter(&masked).count(),
            finallies: finally_re().find_iter(&masked).count(),
        }
    }

    /// More `try` openings than handlers to pair them with.
    pub fn has_unpaired_try(&self) -> bool {
        self.tries > self.catches + self.finallies
    }
}

/// The envelope invariant: balanced blocks and every `try` paired.
pub fn is_closeable(code: &str) -> bool {
    is_balanced(code) && !TryCounts::of(code).has_unpaired_try()
}

/// Append whatever closes the string, comment and brackets still open at the
/// end of `code`. Mismatched closers are left alone.
pub fn close_open_blocks(code: &str) -> String {
    let lexed = lex(code);
    let (open, _) = unclosed(&lexed);
    let mut closed = code.to_string();

    match lexed.tail {
        Tail::Str(quote) => {
            if lexed.dangling_escape {
                closed.pop();
            }
            closed.push(quote);
        }
        Tail::LineComment => closed.push('\n'),
        Tail::BlockComment => closed.push_str("*/"),
        Tail::Code => {}
    }

    for opener in open.into_iter().rev() {
        closed.push(closer_for(opener));
    }
    closed
}

/// Offset of the bracket closing the opener at byte `open_at`.
pub fn matching_close(code: &str, open_at: usize) -> Option<usize> {
    let lexed = lex(code);
    let start = lexed.brackets.iter().position(|&(i, _)| i == open_at)?;
    if !is_opener(lexed.brackets[start].1) {
        return None;
    }

    let mut depth = 0usize;
    for &(i, c) in &lexed.brackets[start..] {
        if is_opener(c) {
            depth += 1;
        } else {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn skip_ws(code: &str, from: usize) -> usize {
    code[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
        .unwrap_or(code.len())
}

/// Byte offset just past a `{ … }` block opening at `at` (after whitespace).
fn block_after(code: &str, at: usize) -> Option<usize> {
    let brace = skip_ws(code, at);
    if !code[brace..].starts_with('{') {
        return None;
    }
    matching_close(code, brace).map(|close| close + 1)
}

fn keyword_at(code: &str, at: usize, keyword: &str) -> Option<usize> {
    let at = skip_ws(code, at);
    let rest = &code[at..];
    let after = rest.strip_prefix(keyword)?;
    match after.chars().next() {
        Some(c) if c.is_alphanumeric() || c == '_' => None,
        _ => Some(at + keyword.len()),
    }
}

/// End of the `try { … } catch (…) { … } [finally { … }]` starting at `start`,
/// if the whole construct is present and balanced.
fn complete_try_block(code: &str, start: usize) -> Option<usize> {
    let after_try = keyword_at(code, start, "try")?;
    let after_body = block_after(code, after_try)?;
    let after_catch_kw = keyword_at(code, after_body, "catch")?;

    let mut cursor = skip_ws(code, after_catch_kw);
    if code[cursor..].starts_with('(') {
        cursor = matching_close(code, cursor)? + 1;
    }
    let after_handler = block_after(code, cursor)?;

    let end = keyword_at(code, after_handler, "finally")
        .and_then(|after_finally| block_after(code, after_finally))
        .unwrap_or(after_handler);
    Some(end)
}

/// End offset of the last complete try/catch(/finally) construct in `code`.
pub fn last_complete_try_block_end(code: &str) -> Option<usize> {
    try_re()
        .find_iter(&mask_literals(code))
        .filter_map(|m| complete_try_block(code, m.start()))
        .max()
}

/// Cut just past the last `}` within the trailing window, if there is one.
pub fn cut_at_last_brace(code: &str, window: usize) -> Option<&str> {
    let floor = code.len().saturating_sub(window);
    code.char_indices()
        .rev()
        .take_while(|(i, _)| *i >= floor)
        .find(|(_, c)| *c == '}')
        .map(|(i, _)| &code[..=i])
}

/// Truncate a cut-off code string to a point where it can be closed, then
/// close it. `None` when nothing structurally sound is left.
pub fn repair_code(code: &str) -> Option<String> {
    let mut cut = code.trim_end();

    if TryCounts::of(cut).has_unpaired_try() {
        if let Some(end) = last_complete_try_block_end(cut) {
            cut = &cut[..end];
        } else if let Some(shorter) = cut_at_last_brace(cut, TRAILING_WINDOW) {
            cut = shorter;
        }
    }

    let mut repaired = close_open_blocks(cut);

    // Drop trailing `try` openings until every one left has a handler.
    while TryCounts::of(&repaired).has_unpaired_try() {
        let last_try = try_re().find_iter(&mask_literals(&repaired)).last()?.start();
        let head = repaired[..last_try].trim_end().to_string();
        repaired = close_open_blocks(&head);
    }

    if repaired.trim().is_empty() || !is_balanced(&repaired) {
        return None;
    }
    Some(repaired)
}

/// Escape every `"` not already preceded by a backslash.
pub fn escape_bare_quotes(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 16);
    let mut prev = None;
    for c in text.chars() {
        if c == '"' && prev != Some('\\') {
            escaped.push('\\');
        }
        escaped.push(c);
        prev = Some(c);
    }
    escaped
}

/// Drop a dangling backslash or an unfinished `\\uXXXX` escape left at the
/// end of a cut-off JSON string body.
pub fn trim_partial_escape(fragment: &str) -> &str {
    let bytes = fragment.as_bytes();
    let trailing = bytes.iter().rev().take_while(|&&b| b == b'\\').count();
    if trailing % 2 == 1 {
        return &fragment[..fragment.len() - 1];
    }

    let hex_tail = bytes
        .iter()
        .rev()
        .take(4)
        .take_while(|b| b.is_ascii_hexdigit())
        .count();
    let u_at = match fragment.len().checked_sub(hex_tail + 2) {
        Some(at) if hex_tail < 4 => at,
        _ => return fragment,
    };
    if &bytes[u_at..u_at + 2] != b"\\u" {
        return fragment;
    }
    let before = bytes[..u_at].iter().rev().take_while(|&&b| b == b'\\').count();
    if before % 2 == 0 {
        &fragment[..u_at]
    } else {
        fragment
    }
}

/// Byte offset of the last `"` not preceded by a backslash.
pub fn last_unescaped_quote(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    (0..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b'"' && (i == 0 || bytes[i - 1] != b'\\'))
}

/// Largest char boundary not past `max`.
pub fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0)
}
