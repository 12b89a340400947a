//! Line tokenizer for the text exposition format.
//!
//! Grammar of a single line (surrounding whitespace ignored):
//!
//! ```text
//! line      = "" | comment | sample
//! comment   = "#" <anything>
//! sample    = name [ "{" [ label { "," label } [ "," ] ] "}" ] ws value [ ws timestamp ]
//! label     = label_name "=" '"' escaped_string '"'
//! name      = [a-zA-Z_:][a-zA-Z0-9_:]*
//! value     = float | "NaN" | "+Inf" | "-Inf"
//! timestamp = integer (milliseconds)
//! ```

use thiserror::Error;

/// Why a line could not be tokenized or used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    #[error("invalid metric name")]
    InvalidName,

    #[error("invalid label at column {0}")]
    InvalidLabel(usize),

    #[error("unterminated label set")]
    UnterminatedLabels,

    #[error("missing sample value")]
    MissingValue,

    #[error("invalid sample value `{0}`")]
    InvalidValue(String),

    #[error("invalid timestamp `{0}`")]
    InvalidTimestamp(String),

    #[error("unexpected trailing content `{0}`")]
    TrailingContent(String),

    #[error("missing `{0}` label")]
    MissingLabel(&'static str),
}

/// One sample line.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<'a> {
    pub name: &'a str,
    pub labels: Vec<(&'a str, String)>,
    pub value: f64,
    pub timestamp: Option<i64>,
}

impl Sample<'_> {
    /// Value of the named label; the last one wins if repeated
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .rev()
            .find(|(label, _)| *label == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A tokenized line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line<'a> {
    Empty,
    Comment(&'a str),
    Sample(Sample<'a>),
}

/// Tokenize a single line of exposition text.
pub fn tokenize_line(line: &str) -> Result<Line<'_>, LineError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Line::Empty);
    }
    if let Some(comment) = trimmed.strip_prefix('#') {
        return Ok(Line::Comment(comment.trim_start()));
    }

    let mut cursor = Cursor::new(trimmed);

    let name = cursor.take_while(is_name_char);
    if name.is_empty() || name.as_bytes()[0].is_ascii_digit() {
        return Err(LineError::InvalidName);
    }

    let labels = match cursor.peek() {
        Some(b'{') => {
            cursor.bump();
            parse_labels(&mut cursor)?
        }
        Some(b' ' | b'\t') => Vec::new(),
        None => return Err(LineError::MissingValue),
        _ => return Err(LineError::InvalidName),
    };

    cursor.skip_ws();
    let raw_value = cursor.take_while(|b| !is_ws(b));
    if raw_value.is_empty() {
        return Err(LineError::MissingValue);
    }
    let value = parse_value(raw_value)?;

    cursor.skip_ws();
    let timestamp = if cursor.at_end() {
        None
    } else {
        let raw = cursor.take_while(|b| !is_ws(b));
        Some(
            raw.parse::<i64>()
                .map_err(|_| LineError::InvalidTimestamp(raw.to_string()))?,
        )
    };

    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(LineError::TrailingContent(cursor.rest().to_string()));
    }

    Ok(Line::Sample(Sample {
        name,
        labels,
        value,
        timestamp,
    }))
}

fn parse_labels<'a>(cursor: &mut Cursor<'a>) -> Result<Vec<(&'a str, String)>, LineError> {
    let mut labels = Vec::new();
    loop {
        cursor.skip_ws();
        if cursor.eat(b'}') {
            return Ok(labels);
        }
        if cursor.at_end() {
            return Err(LineError::UnterminatedLabels);
        }

        let label_start = cursor.pos;
        let label = cursor.take_while(is_label_char);
        if label.is_empty() || label.as_bytes()[0].is_ascii_digit() {
            return Err(LineError::InvalidLabel(label_start));
        }
        cursor.skip_ws();
        if !cursor.eat(b'=') {
            return Err(LineError::InvalidLabel(cursor.pos));
        }
        cursor.skip_ws();
        if !cursor.eat(b'"') {
            return Err(LineError::InvalidLabel(cursor.pos));
        }
        let value = cursor
            .take_quoted()
            .ok_or(LineError::UnterminatedLabels)?;
        labels.push((label, value));

        cursor.skip_ws();
        if cursor.eat(b',') {
            continue;
        }
        if cursor.eat(b'}') {
            return Ok(labels);
        }
        if cursor.at_end() {
            return Err(LineError::UnterminatedLabels);
        }
        return Err(LineError::InvalidLabel(cursor.pos));
    }
}

fn parse_value(raw: &str) -> Result<f64, LineError> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw
            .parse::<f64>()
            .map_err(|_| LineError::InvalidValue(raw.to_string())),
    }
}

fn is_ws(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b':'
}

fn is_label_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(is_ws) {
            self.bump();
        }
    }

    // Only called with ASCII predicates, so the slice stays on char boundaries.
    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    /// Read an escaped string up to and including the closing quote.
    fn take_quoted(&mut self) -> Option<String> {
        let mut value = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += offset + 1;
                    return Some(value);
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => return None,
                },
                c => value.push(c),
            }
        }
        None
    }
}
