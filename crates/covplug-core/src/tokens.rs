//! Syntax tokens for highlighted source rendering

use facet::Facet;
use std::fmt;

/// The closed set of token classes a reporter may emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
#[repr(u8)]
pub enum TokenClass {
    /// A comment
    Comment,
    /// A keyword
    Keyword,
    /// A name or identifier
    Name,
    /// A numeric literal
    Number,
    /// An operator or punctuation
    Operator,
    /// A string literal
    String,
    /// Whitespace
    Whitespace,
    /// Anything else
    Text,
}

impl TokenClass {
    /// Parse a class from its short code
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "com" => Some(TokenClass::Comment),
            "key" => Some(TokenClass::Keyword),
            "nam" => Some(TokenClass::Name),
            "num" => Some(TokenClass::Number),
            "op" => Some(TokenClass::Operator),
            "str" => Some(TokenClass::String),
            "ws" => Some(TokenClass::Whitespace),
            "txt" => Some(TokenClass::Text),
            _ => None,
        }
    }

    /// Short code used as the CSS class in rendered reports
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenClass::Comment => "com",
            TokenClass::Keyword => "key",
            TokenClass::Name => "nam",
            TokenClass::Number => "num",
            TokenClass::Operator => "op",
            TokenClass::String => "str",
            TokenClass::Whitespace => "ws",
            TokenClass::Text => "txt",
        }
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified run of source text
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Token {
    pub class: TokenClass,
    pub text: String,
}

impl Token {
    pub fn new(class: TokenClass, text: impl Into<String>) -> Self {
        Self {
            class,
            text: text.into(),
        }
    }
}

/// All tokens of one source line, without the line terminator
pub type TokenLine = Vec<Token>;

/// Lazily tags each line of `source` wholly as [`TokenClass::Text`].
///
/// Lines are split on `\n` only, so a `\r` stays with its line and a trailing
/// newline yields a final empty line. Joining the token texts with `\n`
/// gives back `source` byte for byte.
#[derive(Debug, Clone)]
pub struct PlainTokenLines {
    source: String,
    pos: Option<usize>,
}

impl PlainTokenLines {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            pos: Some(0),
        }
    }
}

impl Iterator for PlainTokenLines {
    type Item = TokenLine;

    fn next(&mut self) -> Option<TokenLine> {
        let start = self.pos?;
        let rest = &self.source[start..];
        let line = match rest.find('\n') {
            Some(idx) => {
                self.pos = Some(start + idx + 1);
                &rest[..idx]
            }
            None => {
                self.pos = None;
                rest
            }
        };
        Some(vec![Token::new(TokenClass::Text, line)])
    }
}

/// Rebuild source text from token lines.
pub fn join_token_lines(lines: impl IntoIterator<Item = TokenLine>) -> String {
    lines
        .into_iter()
        .map(|line| line.into_iter().map(|t| t.text).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_codes() {
        for class in [
            TokenClass::Comment,
            TokenClass::Keyword,
            TokenClass::Name,
            TokenClass::Number,
            TokenClass::Operator,
            TokenClass::String,
            TokenClass::Whitespace,
            TokenClass::Text,
        ] {
            assert_eq!(TokenClass::parse(class.as_str()), Some(class));
        }
        assert_eq!(TokenClass::parse("xyz"), None);
        assert_eq!(TokenClass::Keyword.to_string(), "key");
    }

    #[test]
    fn test_plain_lines() {
        let lines: Vec<_> = PlainTokenLines::new("a = 1\nb = 2").collect();
        assert_eq!(
            lines,
            vec![
                vec![Token::new(TokenClass::Text, "a = 1")],
                vec![Token::new(TokenClass::Text, "b = 2")],
            ]
        );
    }

    #[test]
    fn test_round_trip_edge_shapes() {
        for source in [
            "",
            "\n",
            "one line",
            "trailing\n",
            "crlf\r\nlines\r\n",
            "\n\nblank lines\n\n",
            "unicode: héllo ✓\n",
        ] {
            let rebuilt = join_token_lines(PlainTokenLines::new(source));
            assert_eq!(rebuilt, source, "round trip failed for {source:?}");
        }
    }

    #[test]
    fn test_trailing_newline_yields_empty_line() {
        let lines: Vec<_> = PlainTokenLines::new("x\n").collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1][0].text, "");
    }
}
