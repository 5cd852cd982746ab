//! Splits a line of Claro source into tokens.
//!
//! The grammar is tiny: tokens are separated by whitespace, and a run wrapped in double quotes is
//! a single string literal token (quotes removed, no escapes). A literal that is never closed
//! runs to the end of the line. A bare word may contain quotes after its first character.

use std::fmt;
use std::iter::FromIterator;

use pom::parser::{end, is_a, none_of, one_of, sym, Parser};

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Word(String),
    Literal(String),
}

impl Token {
    /// Token text with any quoting removed
    pub fn text(&self) -> &str {
        match self {
            Token::Word(w) => w,
            Token::Literal(s) => s,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Token::Literal(_))
    }

    /// Case-insensitive keyword comparison. Literals never match keywords.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        match self {
            Token::Word(w) => w.eq_ignore_ascii_case(keyword),
            Token::Literal(_) => false,
        }
    }
}

/// Renders the token back into source form, so a joined span of tokens re-tokenizes to the same
/// tokens
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{}", w),
            Token::Literal(s) => write!(f, "\"{}\"", s),
        }
    }
}

fn space<'a>() -> Parser<'a, char, ()> {
    one_of(" \t\r\n").repeat(0..).discard()
}

fn literal<'a>() -> Parser<'a, char, Token> {
    let body = none_of("\"").repeat(0..).map(String::from_iter);

    (sym('"') * body - sym('"').opt()).map(Token::Literal)
}

fn word<'a>() -> Parser<'a, char, Token> {
    let first = is_a(|c: char| !c.is_whitespace() && c != '"');
    let rest = is_a(|c: char| !c.is_whitespace()).repeat(0..);

    (first + rest)
        .collect()
        .map(String::from_iter)
        .map(Token::Word)
}

fn tokens<'a>() -> Parser<'a, char, Vec<Token>> {
    space() * ((literal() | word()) - space()).repeat(0..) - end()
}

pub fn tokenize(line: &str) -> Vec<Token> {
    let input: Vec<char> = line.chars().collect();

    let tokens = tokens().parse(&input).unwrap_or_default();
    tokens
}

/// Join `tokens` back into one line of source
pub fn join(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<String>>()
        .join(" ")
}

#[test]
fn test_words() {
    let data = vec![
        ("", vec![]),
        ("   ", vec![]),
        ("print", vec![Token::Word("print".to_string())]),
        (
            "  SET x   =\t3 ",
            vec![
                Token::Word("SET".to_string()),
                Token::Word("x".to_string()),
                Token::Word("=".to_string()),
                Token::Word("3".to_string()),
            ],
        ),
        (
            "a\"b c",
            vec![
                Token::Word("a\"b".to_string()),
                Token::Word("c".to_string()),
            ],
        ),
    ];

    for (input, expected) in data {
        assert_eq!(tokenize(input), expected);
    }
}

#[test]
fn test_literals() {
    let data = vec![
        (
            r#"PRINT "hello world" x"#,
            vec![
                Token::Word("PRINT".to_string()),
                Token::Literal("hello world".to_string()),
                Token::Word("x".to_string()),
            ],
        ),
        (
            r#""""#,
            vec![Token::Literal("".to_string())],
        ),
        (
            r#""a\n""b""#,
            vec![
                Token::Literal("a\\n".to_string()),
                Token::Literal("b".to_string()),
            ],
        ),
        (
            r#"PRINT "never closed  "#,
            vec![
                Token::Word("PRINT".to_string()),
                Token::Literal("never closed  ".to_string()),
            ],
        ),
    ];

    for (input, expected) in data {
        assert_eq!(tokenize(input), expected);
    }
}

#[test]
fn test_join() {
    let line = r#"PRINT "a  b" $x"#;
    let tokens = tokenize(line);
    assert_eq!(join(&tokens), r#"PRINT "a  b" $x"#);
    assert_eq!(tokenize(&join(&tokens)), tokens);
    assert!(tokens[0].is_keyword("print"));
    assert!(!tokens[1].is_keyword("a  b"));
    assert!(tokens[1].is_literal());
    assert_eq!(tokens[1].text(), "a  b");
}
