use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;

/// Something that hands out program lines one at a time
///
/// Block constructs (`WHILE`, `FOR`, `FUNCTION`, `TRY`) pull their bodies from the source that is
/// feeding the interpreter, and `INPUT` reads from the console source. `None` means the source
/// is exhausted.
pub trait LineSource {
    /// `prompt` is a hint for interactive sources; non-interactive sources ignore it
    fn next_line(&mut self, prompt: &str) -> Option<String>;
}

/// Lines of a script held in memory (a program file, an imported file or a test program)
pub struct Script {
    lines: Vec<String>,
    next: usize,
}

impl Script {
    pub fn new(text: &str) -> Self {
        Script {
            lines: text.lines().map(|l| l.to_string()).collect(),
            next: 0,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Could not open file {}", path.display()))?;

        Ok(Script::new(&text))
    }

    /// 1-based number of the line most recently handed out
    pub fn line_number(&self) -> usize {
        self.next
    }
}

impl LineSource for Script {
    fn next_line(&mut self, _prompt: &str) -> Option<String> {
        let line = self.lines.get(self.next).cloned();
        if line.is_some() {
            self.next += 1;
        }

        line
    }
}

/// Walks the lines of a collected block while it executes, so nested blocks can take their
/// bodies from the rest of it
pub struct BlockCursor<'b> {
    lines: &'b [String],
    next: usize,
}

impl<'b> BlockCursor<'b> {
    pub fn new(lines: &'b [String]) -> Self {
        BlockCursor { lines, next: 0 }
    }
}

impl<'b> LineSource for BlockCursor<'b> {
    fn next_line(&mut self, _prompt: &str) -> Option<String> {
        let line = self.lines.get(self.next).cloned();
        if line.is_some() {
            self.next += 1;
        }

        line
    }
}

/// Reads answers for `INPUT` from stdin
pub struct Stdin;

impl LineSource for Stdin {
    fn next_line(&mut self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        if let Err(e) = io::stdout().flush() {
            debug!("Failed to flush prompt: {}", e);
        }

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(&['\n', '\r'][..]).to_string()),
        }
    }
}

/// Blank lines and lines starting with `#` carry no command
pub fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

#[test]
fn test_script() {
    let mut script = Script::new("SET x = 1\r\n\nPRINT x\n");
    assert_eq!(script.next_line(""), Some("SET x = 1".to_string()));
    assert_eq!(script.line_number(), 1);
    assert_eq!(script.next_line(""), Some("".to_string()));
    assert_eq!(script.next_line(""), Some("PRINT x".to_string()));
    assert_eq!(script.line_number(), 3);
    assert_eq!(script.next_line(""), None);
    assert_eq!(script.line_number(), 3);
}

#[test]
fn test_block_cursor() {
    let lines = vec!["a".to_string(), "b".to_string()];
    let mut cursor = BlockCursor::new(&lines);
    assert_eq!(cursor.next_line("... "), Some("a".to_string()));
    assert_eq!(cursor.next_line("... "), Some("b".to_string()));
    assert_eq!(cursor.next_line("... "), None);
}

#[test]
fn test_comments() {
    let data = vec![
        ("", true),
        ("   ", true),
        ("# a comment", true),
        ("   #indented", true),
        ("PRINT \"#not\"", false),
        ("SET x = 1 # trailing", false),
    ];

    for (input, expected) in data {
        assert_eq!(is_blank_or_comment(input), expected, "{:?}", input);
    }
}
