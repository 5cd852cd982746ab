use rustyline::completion::Completer;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper, Highlighter, Hinter, Result};

use crate::input::LineSource;
use crate::lang::eval::keywords;

/// Helper that extends editor
///
/// Currently only implements `Completer`, completing the command keyword at the start of a line.
#[derive(Helper, Highlighter, Hinter)]
pub struct ReplHelper {
    keywords: Vec<&'static str>,
}

impl ReplHelper {
    pub fn new() -> Self {
        ReplHelper {
            keywords: keywords(),
        }
    }

    fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<String>) {
        let before = &line[..pos];
        let start = before.len() - before.trim_start().len();
        let word = &before[start..];
        if word.contains(char::is_whitespace) {
            return (pos, Vec::new());
        }

        let word = word.to_ascii_uppercase();
        let matches = self
            .keywords
            .iter()
            .filter(|k| k.starts_with(&word))
            .map(|k| k.to_string())
            .collect();

        (start, matches)
    }
}

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Result<(usize, Vec<String>)> {
        Ok(self.candidates(line, pos))
    }
}

/// Claro has no line continuation; every line is complete
impl Validator for ReplHelper {}

pub type ReplEditor = Editor<ReplHelper, DefaultHistory>;

/// Feeds block bodies typed at the REPL to the interpreter
pub struct EditorSource<'e> {
    editor: &'e mut ReplEditor,
}

impl<'e> EditorSource<'e> {
    pub fn new(editor: &'e mut ReplEditor) -> Self {
        EditorSource { editor }
    }
}

impl<'e> LineSource for EditorSource<'e> {
    fn next_line(&mut self, prompt: &str) -> Option<String> {
        self.editor.readline(prompt).ok()
    }
}

#[test]
fn test_complete_keyword() {
    let helper = ReplHelper::new();
    assert_eq!(
        helper.candidates("pr", 2),
        (0, vec!["PRINT".to_string()])
    );
    assert_eq!(
        helper.candidates("  ENDF", 6),
        (2, vec!["ENDFOR".to_string(), "ENDFUNCTION".to_string()])
    );
    assert_eq!(helper.candidates("PRINT x", 7), (7, Vec::new()));

    let (start, all) = helper.candidates("", 0);
    assert_eq!(start, 0);
    assert!(all.contains(&"TRY".to_string()));
    assert!(all.contains(&"VARIABLE".to_string()));
}
