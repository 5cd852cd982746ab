use std::io::Write;

use crate::input::{LineSource, Script};
use crate::lang::error::Fault;
use crate::lang::eval::{Eval, EvalResult};
#[cfg(test)]
use crate::lang::value::Value;

/// Capacity bounds of the interpreter's registries
#[derive(Clone, Copy, Debug)]
pub struct Limits {
    pub variables: usize,
    pub functions: usize,
    pub call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            variables: 100,
            functions: 100,
            call_depth: 100,
        }
    }
}

pub struct Runtime<'a> {
    eval: Eval<'a>,
}

impl<'a> Runtime<'a> {
    /// Create a new `Runtime` instance
    ///
    /// `sink` is where output should be written. eg. result of `PRINT` statements
    ///
    /// `console` answers `INPUT` statements
    ///
    /// `interactive` sets whether assignments and definitions are echoed back (useful when human
    /// is at a REPL)
    pub fn new(
        sink: &'a mut dyn Write,
        console: &'a mut dyn LineSource,
        interactive: bool,
        limits: Limits,
    ) -> Self {
        let eval = Eval::new(sink, console, interactive, limits);

        Self { eval }
    }

    /// Run one line typed or read at the top level
    ///
    /// Block bodies started on this line are read from `source`.
    pub fn eval(&mut self, line: &str, source: &mut dyn LineSource) -> EvalResult {
        self.eval.eval(line, source)
    }

    /// Run a whole script
    ///
    /// Faults abandon the line they happen on; `on_fault` is told about each along with its line
    /// number. Returns `false` if the script ended with `EXIT`.
    pub fn run(&mut self, script: &mut Script, mut on_fault: impl FnMut(usize, &Fault)) -> bool {
        while let Some(line) = script.next_line("") {
            let line_number = script.line_number();
            match self.eval.eval(&line, script) {
                EvalResult::Ok => (),
                EvalResult::Quit => return false,
                EvalResult::Err(fault) => on_fault(line_number, &fault),
            }
        }

        true
    }

    #[cfg(test)]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.eval.variable(name)
    }
}

#[test]
fn test_run_script() {
    use crate::lang::error::FaultKind;

    let mut output = Vec::new();
    let mut console = Script::new("");
    let mut faults = Vec::new();
    let finished = {
        let mut runtime = Runtime::new(&mut output, &mut console, false, Limits::default());
        let mut script = Script::new(
            "SET total = 0\nFOR i = 1 TO 4 BEGIN\nSET total = total + i\nENDFOR\nSET bad = 1 / 0\nPRINT $total\nSET s = \"done\"",
        );
        let finished = runtime.run(&mut script, |n, f| faults.push((n, f.kind())));

        assert_eq!(runtime.variable("total"), Some(&Value::Float(10.0)));
        assert_eq!(runtime.variable("s"), Some(&Value::String("done".to_string())));
        assert_eq!(runtime.variable("bad"), None);
        finished
    };

    assert!(finished);
    assert_eq!(faults, vec![(5, FaultKind::Evaluation)]);
    assert_eq!(String::from_utf8(output).expect("Output not utf-8"), "10\n");
}

#[test]
fn test_run_stops_at_exit() {
    let mut output = Vec::new();
    let mut console = Script::new("");
    let finished = {
        let mut runtime = Runtime::new(&mut output, &mut console, false, Limits::default());
        let mut script = Script::new("PRINT a\nEXIT\nPRINT b");
        runtime.run(&mut script, |_, _| ())
    };

    assert!(!finished);
    assert_eq!(String::from_utf8(output).expect("Output not utf-8"), "a\n");
}

#[test]
fn test_eval_with_separate_block_source() {
    let mut output = Vec::new();
    let mut console = Script::new("");
    let mut body = Script::new("PRINT tick\nSET n = n + 1\nENDWHILE\nPRINT after");
    {
        let mut runtime = Runtime::new(&mut output, &mut console, false, Limits::default());
        match runtime.eval("SET n = 0", &mut Script::new("")) {
            EvalResult::Ok => (),
            _ => panic!("SET failed"),
        }
        match runtime.eval("WHILE n < 1 BEGIN", &mut body) {
            EvalResult::Ok => (),
            _ => panic!("WHILE failed"),
        }
        assert_eq!(runtime.variable("n"), Some(&Value::Float(1.0)));
    }

    // The body was read up to its sentinel and no further
    assert_eq!(body.next_line(""), Some("PRINT after".to_string()));
    assert_eq!(String::from_utf8(output).expect("Output not utf-8"), "tick\n");
}
