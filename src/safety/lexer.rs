//! Literal and comment spans
//!
//! A minimal scanner that only knows enough SQL lexing to tell string
//! literals and comments apart from everything else.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Code,
    Literal,
    Comment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub start: usize,
    pub end: usize,
}

/// Split `sql` into code, literal and comment spans covering the whole input.
///
/// Recognised: `'..'`, `".."` and their triple-quoted forms, backslash
/// escapes, raw literals (`r`, `R`, `rb`, `br` prefixes) in which a backslash
/// is an ordinary character, `--` and `#` line comments, `/* */` block
/// comments. A doubled quote is two adjacent literals, not an escape.
/// Backtick identifiers are kept as code. An unterminated literal is left as
/// code.
pub fn scan(sql: &str) -> Vec<Span> {
    let bytes = sql.as_bytes();
    let mut spans: Vec<Span> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let (kind, end) = match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => (SpanKind::Comment, line_end(bytes, i)),
            b'#' => (SpanKind::Comment, line_end(bytes, i)),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = find(bytes, i + 2, b"*/").map(|p| p + 2).unwrap_or(bytes.len());
                (SpanKind::Comment, end)
            }
            quote @ (b'\'' | b'"') => match literal_end(bytes, i, quote, is_raw_prefixed(bytes, i)) {
                Some(end) => (SpanKind::Literal, end),
                None => (SpanKind::Code, i + 1),
            },
            b'`' => {
                let end = find(bytes, i + 1, b"`").map(|p| p + 1).unwrap_or(bytes.len());
                (SpanKind::Code, end)
            }
            _ => (SpanKind::Code, i + 1),
        };

        match spans.last_mut() {
            Some(last) if last.kind == SpanKind::Code && kind == SpanKind::Code => last.end = end,
            _ => spans.push(Span { kind, start: i, end }),
        }
        i = end;
    }

    spans
}

/// Text with every literal replaced by a single space.
pub fn strip_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    for span in scan(sql) {
        match span.kind {
            SpanKind::Literal => out.push(' '),
            _ => out.push_str(&sql[span.start..span.end]),
        }
    }
    out
}

/// Text of every comment outside literals.
pub fn comments(sql: &str) -> Vec<&str> {
    scan(sql)
        .into_iter()
        .filter(|s| s.kind == SpanKind::Comment)
        .map(|s| &sql[s.start..s.end])
        .collect()
}

fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| from + p)
        .unwrap_or(bytes.len())
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// The quote at `quote_at` is preceded by a raw prefix (`r`, `rb`, `br`,
/// any casing) that is not the tail of a longer identifier.
fn is_raw_prefixed(bytes: &[u8], quote_at: usize) -> bool {
    let prefix_start = |len: usize| -> bool {
        quote_at >= len && (quote_at == len || !is_ident_byte(bytes[quote_at - len - 1]))
    };
    let at = |back: usize| bytes[quote_at - back].to_ascii_lowercase();

    if quote_at >= 1 && at(1) == b'r' {
        if prefix_start(1) {
            return true;
        }
        return quote_at >= 2 && at(2) == b'b' && prefix_start(2);
    }
    quote_at >= 2 && at(1) == b'b' && at(2) == b'r' && prefix_start(2)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn literal_end(bytes: &[u8], start: usize, quote: u8, raw: bool) -> Option<usize> {
    let triple = [quote, quote, quote];
    let (mut j, closing): (usize, &[u8]) = if bytes[start..].starts_with(&triple) {
        (start + 3, &triple[..])
    } else {
        (start + 1, &triple[..1])
    };

    while j < bytes.len() {
        if bytes[j] == b'\\' && !raw {
            j += 2;
        } else if bytes[j..].starts_with(closing) {
            return Some(j + closing.len());
        } else {
            j += 1;
        }
    }
    None
}
