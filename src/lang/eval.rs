use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use lazy_static::lazy_static;
use log::{debug, LevelFilter};

use crate::input::{is_blank_or_comment, BlockCursor, LineSource, Script};
use crate::lang::error::{syntax, Fault};
use crate::lang::expr::evaluate;
use crate::lang::functions::{CallStack, Function, Functions};
use crate::lang::lex::{join, tokenize, Token};
use crate::lang::runtime::Limits;
use crate::lang::value::{format_number, leading_integer, Value};
use crate::lang::variables::Variables;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Command {
    Set,
    Print,
    Get,
    Input,
    Repeat,
    If,
    While,
    For,
    Function,
    Try,
    Call,
    Return,
    Stack,
    Trace,
    Import,
    Concat,
    Debug,
    Help,
    Exit,
}

lazy_static! {
    static ref COMMANDS: HashMap<&'static str, Command> = {
        let mut m = HashMap::new();
        m.insert("SET", Command::Set);
        m.insert("VARIABLE", Command::Set);
        m.insert("PRINT", Command::Print);
        m.insert("GET", Command::Get);
        m.insert("INPUT", Command::Input);
        m.insert("REPEAT", Command::Repeat);
        m.insert("IF", Command::If);
        m.insert("WHILE", Command::While);
        m.insert("FOR", Command::For);
        m.insert("FUNCTION", Command::Function);
        m.insert("TRY", Command::Try);
        m.insert("CALL", Command::Call);
        m.insert("RETURN", Command::Return);
        m.insert("STACK", Command::Stack);
        m.insert("TRACE", Command::Trace);
        m.insert("IMPORT", Command::Import);
        m.insert("CONCAT", Command::Concat);
        m.insert("DEBUG", Command::Debug);
        m.insert("HELP", Command::Help);
        m.insert("EXIT", Command::Exit);
        m.insert("QUIT", Command::Exit);
        m
    };
}

/// Words that end a block body when they appear alone on a line
const SENTINELS: &[&str] = &["ENDFUNCTION", "ENDWHILE", "ENDFOR", "CATCH", "ENDTRY"];

/// Every word that can start a line, for completion
pub fn keywords() -> Vec<&'static str> {
    let mut words: Vec<&'static str> = COMMANDS.keys().copied().collect();
    words.extend_from_slice(SENTINELS);
    words.sort_unstable();

    words
}

const HELP: &str = "\
Available commands:
  SET/VARIABLE <name> = <expr>       Create or update a variable (quote strings)
  PRINT <items...>                   Print text and variables ($name forces a variable)
  GET <name>                         Show the value of a variable
  INPUT <name> <prompt...>           Read a line into a variable
  CONCAT <dest> <var1> <var2>        Join two variables into a string
  REPEAT <count> <command>           Run a command several times
  IF <cond> THEN <cmd> [ELSE <cmd>] ENDIF
  WHILE <cond> BEGIN ... ENDWHILE
  FOR <var> = <start> TO <end> [STEP <step>] BEGIN ... ENDFOR
  FUNCTION <name> [params...] ... ENDFUNCTION
  CALL <name> [args...]              Call a function and show its result
  RETURN <expr>                      Return from the current function
  TRY ... CATCH ... ENDTRY           Run the CATCH lines if the TRY lines fail
  IMPORT <file>                      Run every line of a file
  STACK                              Show the function call stack
  TRACE                              Show all variables and functions
  DEBUG ON|OFF                       Toggle debug logging
  HELP                               Show this message
  EXIT                               Leave the interpreter";

pub enum EvalResult {
    Ok,
    Quit,
    Err(Fault),
}

/// How a dispatched line finished, when it didn't fault
///
/// A fault travels as the `Err` side of `Result<Flow, Fault>`. Every construct that runs nested
/// lines hands anything other than `Normal` straight back to its caller, so `TRY` and the
/// per-line boundary only ever see faults and a function call only ever sees `Return`.
#[derive(Debug, PartialEq)]
enum Flow {
    Normal,
    Return(f64),
    Exit,
}

#[derive(Clone, Copy)]
enum Block {
    Function,
    While,
    For,
    Try,
    Catch,
}

impl Block {
    /// Command that opens a nested block of the same kind
    fn opener(self) -> &'static str {
        match self {
            Block::Function => "FUNCTION",
            Block::While => "WHILE",
            Block::For => "FOR",
            Block::Try | Block::Catch => "TRY",
        }
    }

    /// Sentinel that ends a nested block of the same kind
    fn closer(self) -> &'static str {
        match self {
            Block::Function => "ENDFUNCTION",
            Block::While => "ENDWHILE",
            Block::For => "ENDFOR",
            Block::Try | Block::Catch => "ENDTRY",
        }
    }

    /// Sentinel that ends this block
    fn terminator(self) -> &'static str {
        match self {
            Block::Try => "CATCH",
            b => b.closer(),
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Block::Try => "TRY> ",
            Block::Catch => "CATCH> ",
            _ => "... ",
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::Function => write!(f, "FUNCTION"),
            Block::While => write!(f, "WHILE"),
            Block::For => write!(f, "FOR"),
            Block::Try => write!(f, "TRY"),
            Block::Catch => write!(f, "CATCH"),
        }
    }
}

fn io_fault(e: std::io::Error) -> Fault {
    Fault::Resource(format!("Failed to write output: {}", e))
}

fn find_keyword(tokens: &[Token], keyword: &str) -> Option<usize> {
    tokens.iter().position(|t| t.is_keyword(keyword))
}

pub struct Eval<'a> {
    sink: &'a mut dyn Write,
    console: &'a mut dyn LineSource,
    interactive: bool,
    variables: Variables,
    functions: Functions,
    calls: CallStack,
}

impl<'a> Eval<'a> {
    /// Create a new `Eval` instance
    ///
    /// `sink` is where output should be written. eg. result of `PRINT` statements
    ///
    /// `console` answers `INPUT`
    ///
    /// `interactive` sets whether assignments, definitions and `TRY` outcomes are confirmed on
    /// the sink (useful when human is at a REPL)
    pub fn new(
        sink: &'a mut dyn Write,
        console: &'a mut dyn LineSource,
        interactive: bool,
        limits: Limits,
    ) -> Self {
        Self {
            sink,
            console,
            interactive,
            variables: Variables::new(limits.variables),
            functions: Functions::new(limits.functions),
            calls: CallStack::new(limits.call_depth),
        }
    }

    fn emit(&mut self, args: fmt::Arguments<'_>) -> Result<(), Fault> {
        self.sink.write_fmt(args).map_err(io_fault)?;
        self.sink.write_all(b"\n").map_err(io_fault)
    }

    fn confirm(&mut self, args: fmt::Arguments<'_>) -> Result<(), Fault> {
        if self.interactive {
            self.emit(args)?;
        }

        Ok(())
    }

    /// Report a fault that doesn't unwind
    fn report(&mut self, fault: &Fault) -> Result<(), Fault> {
        debug!("{} fault reported: {}", fault.kind(), fault);
        self.emit(format_args!("Oops! Error: {}", fault))
    }

    /// Store a variable, reporting a full store instead of unwinding
    ///
    /// Returns whether the variable was stored.
    fn assign(&mut self, name: &str, val: Value) -> Result<bool, Fault> {
        debug!("{} ({}) <- {}", name, val.ty(), val);
        match self.variables.set(name, val) {
            Ok(()) => Ok(true),
            Err(fault) => {
                self.report(&fault)?;
                Ok(false)
            }
        }
    }

    /// Pull a block body from `source`, up to the block's sentinel or the end of the source
    fn collect_block(&mut self, source: &mut dyn LineSource, block: Block) -> Vec<String> {
        let mut lines = Vec::new();
        let mut depth = 0usize;

        while let Some(line) = source.next_line(block.prompt()) {
            let trimmed = line.trim();
            if depth == 0 && trimmed.eq_ignore_ascii_case(block.terminator()) {
                break;
            }

            let first = trimmed.split_whitespace().next().unwrap_or("");
            if first.eq_ignore_ascii_case(block.opener()) {
                depth += 1;
            } else if depth > 0 && trimmed.eq_ignore_ascii_case(block.closer()) {
                depth -= 1;
            }

            lines.push(line);
        }

        debug!("Collected {} line(s) for {} block", lines.len(), block);
        lines
    }

    /// Run collected lines in order
    ///
    /// Nested blocks take their bodies from the lines that follow them.
    fn run_block(&mut self, lines: &[String]) -> Result<Flow, Fault> {
        let mut cursor = BlockCursor::new(lines);
        while let Some(line) = cursor.next_line("") {
            match self.dispatch(&line, &mut cursor)? {
                Flow::Normal => (),
                flow => return Ok(flow),
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_set(&mut self, args: &[Token]) -> Result<Flow, Fault> {
        if args.len() < 3 || !args[1].is_keyword("=") {
            syntax!("Usage: SET <name> = <expression>");
        }

        let name = args[0].text();
        let val = match &args[2..] {
            [Token::Literal(s)] => Value::String(s.clone()),
            expr => Value::Float(evaluate(&join(expr), &self.variables)?),
        };

        let shown = val.to_string();
        if self.assign(name, val)? {
            self.confirm(format_args!("Variable '{}' set to '{}'", name, shown))?;
        }

        Ok(Flow::Normal)
    }

    fn exec_print(&mut self, args: &[Token]) -> Result<Flow, Fault> {
        let items: Vec<String> = args
            .iter()
            .map(|token| match token {
                Token::Literal(s) => s.clone(),
                Token::Word(w) => match w.strip_prefix('$') {
                    Some(name) => self
                        .variables
                        .get(name)
                        .map_or_else(|| "[undefined]".to_string(), |v| v.to_string()),
                    None => self
                        .variables
                        .get(w)
                        .map_or_else(|| w.clone(), |v| v.to_string()),
                },
            })
            .collect();

        self.emit(format_args!("{}", items.join(" ")))?;

        Ok(Flow::Normal)
    }

    fn exec_get(&mut self, args: &[Token]) -> Result<Flow, Fault> {
        let name = match args.first() {
            Some(t) => t.text(),
            None => syntax!("Usage: GET <name>"),
        };

        let val = self.variables.get(name).map(|v| v.to_string());
        match val {
            Some(v) => self.emit(format_args!("Variable '{}' = '{}'", name, v))?,
            None => self.emit(format_args!("Variable '{}' is not defined.", name))?,
        }

        Ok(Flow::Normal)
    }

    fn exec_input(&mut self, args: &[Token]) -> Result<Flow, Fault> {
        let name = match args.first() {
            Some(t) => t.text(),
            None => syntax!("Usage: INPUT <variable> <prompt>"),
        };
        let prompt = args[1..]
            .iter()
            .map(|t| t.text())
            .collect::<Vec<&str>>()
            .join(" ");
        let prompt = format!("{} ", prompt.trim());

        match self.console.next_line(&prompt) {
            Some(line) => {
                let line = line.trim().to_string();
                if self.assign(name, Value::String(line.clone()))? {
                    self.confirm(format_args!("Variable '{}' set to '{}'", name, line))?;
                }
            }
            None => self.report(&Fault::Resource("Failed to read input".to_string()))?,
        }

        Ok(Flow::Normal)
    }

    fn exec_concat(&mut self, args: &[Token]) -> Result<Flow, Fault> {
        if args.len() < 3 {
            syntax!("Usage: CONCAT <dest> <var1> <var2>");
        }

        let mut joined = String::new();
        for token in &args[1..3] {
            if let Some(v) = self.variables.get(token.text()) {
                joined += &v.to_string();
            }
        }

        let dest = args[0].text();
        if self.assign(dest, Value::String(joined))? {
            self.confirm(format_args!("Concatenated value stored in '{}'.", dest))?;
        }

        Ok(Flow::Normal)
    }

    fn exec_repeat(&mut self, args: &[Token], source: &mut dyn LineSource) -> Result<Flow, Fault> {
        if args.len() < 2 {
            syntax!("Usage: REPEAT <count> <command>");
        }

        let count = leading_integer(args[0].text());
        if count <= 0 {
            syntax!("REPEAT count must be a positive integer");
        }

        let cmd = join(&args[1..]);
        for i in 0..count {
            debug!("REPEAT iteration {}: {}", i + 1, cmd);
            match self.dispatch(&cmd, source)? {
                Flow::Normal => (),
                flow => return Ok(flow),
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_if(&mut self, args: &[Token], source: &mut dyn LineSource) -> Result<Flow, Fault> {
        const USAGE: &str = "IF syntax error. Usage: IF <cond> THEN <cmd> [ELSE <cmd>] ENDIF";

        let then_idx = match find_keyword(args, "THEN") {
            Some(i) => i,
            None => syntax!("{}", USAGE),
        };

        // First ELSE and first ENDIF after THEN; the scan stops at ENDIF
        let mut else_idx = None;
        let mut endif_idx = None;
        for (i, token) in args.iter().enumerate().skip(then_idx + 1) {
            if token.is_keyword("ENDIF") {
                endif_idx = Some(i);
                break;
            } else if token.is_keyword("ELSE") && else_idx.is_none() {
                else_idx = Some(i);
            }
        }
        let endif_idx = match endif_idx {
            Some(i) => i,
            None => syntax!("{}", USAGE),
        };

        let cond = evaluate(&join(&args[..then_idx]), &self.variables)?;
        let branch = if cond != 0.0 {
            &args[then_idx + 1..else_idx.unwrap_or(endif_idx)]
        } else {
            match else_idx {
                Some(e) => &args[e + 1..endif_idx],
                None => return Ok(Flow::Normal),
            }
        };

        self.dispatch(&join(branch), source)
    }

    fn exec_while(&mut self, args: &[Token], source: &mut dyn LineSource) -> Result<Flow, Fault> {
        let begin = match find_keyword(args, "BEGIN") {
            Some(i) => i,
            None => syntax!("WHILE syntax error. Missing BEGIN"),
        };
        let cond = join(&args[..begin]);
        let body = self.collect_block(source, Block::While);

        while evaluate(&cond, &self.variables)? != 0.0 {
            debug!("WHILE {} holds", cond);
            match self.run_block(&body)? {
                Flow::Normal => (),
                flow => return Ok(flow),
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, args: &[Token], source: &mut dyn LineSource) -> Result<Flow, Fault> {
        if args.len() < 6 {
            syntax!("Usage: FOR <var> = <start> TO <end> [STEP <step>] BEGIN");
        }
        if !args[1].is_keyword("=") {
            syntax!("Expected '=' in FOR loop declaration");
        }
        let start = evaluate(&args[2].to_string(), &self.variables)?;
        if !args[3].is_keyword("TO") {
            syntax!("Expected 'TO' in FOR loop declaration");
        }
        let end = evaluate(&args[4].to_string(), &self.variables)?;

        let mut idx = 5;
        let mut step = 1.0;
        if args[idx].is_keyword("STEP") {
            match args.get(idx + 1) {
                Some(t) => step = evaluate(&t.to_string(), &self.variables)?,
                None => syntax!("Missing step value in FOR loop"),
            }
            idx += 2;
        }
        if !args.get(idx).map_or(false, |t| t.is_keyword("BEGIN")) {
            syntax!("Missing BEGIN in FOR loop declaration");
        }

        let var = args[0].text();
        let body = self.collect_block(source, Block::For);
        if !self.assign(var, Value::Float(start))? {
            return Ok(Flow::Normal);
        }

        loop {
            let current = self.variables.get(var).map_or(0.0, |v| v.as_number());
            let more = if step > 0.0 {
                current <= end
            } else {
                current >= end
            };
            if !more {
                break;
            }

            debug!("FOR {} = {}", var, format_number(current));
            match self.run_block(&body)? {
                Flow::Normal => (),
                flow => return Ok(flow),
            }

            // The body may have changed the loop variable
            let current = self.variables.get(var).map_or(0.0, |v| v.as_number());
            if !self.assign(var, Value::Float(current + step))? {
                break;
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_function(&mut self, args: &[Token], source: &mut dyn LineSource) -> Result<Flow, Fault> {
        let name = match args.first() {
            Some(t) => t.text().to_string(),
            None => syntax!("Usage: FUNCTION <name> [params...]"),
        };
        let params: Vec<String> = args[1..].iter().map(|t| t.text().to_string()).collect();
        let body = self.collect_block(source, Block::Function);

        let summary = format!(
            "Function '{}' defined with {} parameter(s) and {} code line(s).",
            name,
            params.len(),
            body.len()
        );
        match self.functions.define(Function { name, params, body }) {
            Ok(()) => self.confirm(format_args!("{}", summary))?,
            Err(fault) => self.report(&fault)?,
        }

        Ok(Flow::Normal)
    }

    /// Bind arguments and run the body of `func`
    ///
    /// The result comes back as `Flow::Return`; a body that runs off its end returns 0.
    fn invoke(&mut self, func: &Function, args: &[Token]) -> Result<Flow, Fault> {
        if args.len() != func.params.len() {
            self.emit(format_args!(
                "Error: Function '{}' expects {} arguments, got {}.",
                func.name,
                func.params.len(),
                args.len()
            ))?;
            return Ok(Flow::Return(0.0));
        }
        if let Err(fault) = self.calls.push(&func.name) {
            self.report(&fault)?;
            return Ok(Flow::Return(0.0));
        }

        debug!("Calling {} with {} argument(s)", func, args.len());
        let mut scope = self.variables.enter_scope();
        let mut bound = Ok(());
        for (param, arg) in func.params.iter().zip(args) {
            // Arguments are taken literally, as numbers
            let val = Value::Float(Value::String(arg.text().to_string()).as_number());
            if let Err(fault) = self.variables.bind(&mut scope, param, val) {
                bound = Err(fault);
                break;
            }
        }

        let result = match bound {
            Ok(()) => self.run_block(&func.body),
            Err(fault) => self.report(&fault).map(|_| Flow::Normal),
        };

        self.variables.exit_scope(scope);
        self.calls.pop();

        match result? {
            Flow::Normal => Ok(Flow::Return(0.0)),
            flow => Ok(flow),
        }
    }

    fn exec_call(&mut self, args: &[Token]) -> Result<Flow, Fault> {
        let name = match args.first() {
            Some(t) => t.text(),
            None => syntax!("Usage: CALL <name> [args...]"),
        };

        let func = match self.functions.lookup(name) {
            Some(f) => f,
            None => {
                self.emit(format_args!("Function '{}' not defined.", name))?;
                return Ok(Flow::Normal);
            }
        };

        match self.invoke(&func, &args[1..])? {
            Flow::Return(v) => {
                self.emit(format_args!(
                    "Function '{}' returned {}",
                    func.name,
                    format_number(v)
                ))?;
                Ok(Flow::Normal)
            }
            flow => Ok(flow),
        }
    }

    fn exec_return(&mut self, args: &[Token]) -> Result<Flow, Fault> {
        if args.is_empty() {
            syntax!("Usage: RETURN <expression>");
        }
        if self.calls.is_empty() {
            syntax!("RETURN can only be used inside a function");
        }

        let val = evaluate(&join(args), &self.variables)?;

        Ok(Flow::Return(val))
    }

    fn exec_try(&mut self, source: &mut dyn LineSource) -> Result<Flow, Fault> {
        let try_lines = self.collect_block(source, Block::Try);

        match self.run_block(&try_lines) {
            Ok(Flow::Normal) => {
                self.confirm(format_args!(
                    "TRY block executed successfully; skipping CATCH."
                ))?;
                // The CATCH lines still belong to this statement
                self.collect_block(source, Block::Catch);
                Ok(Flow::Normal)
            }
            Ok(flow) => Ok(flow),
            Err(fault) => {
                debug!("TRY caught {} fault: {}", fault.kind(), fault);
                self.confirm(format_args!(
                    "Error in TRY block ({}); executing CATCH block.",
                    fault
                ))?;
                let catch_lines = self.collect_block(source, Block::Catch);
                self.run_block(&catch_lines)
            }
        }
    }

    fn exec_import(&mut self, args: &[Token]) -> Result<Flow, Fault> {
        if args.is_empty() {
            syntax!("Usage: IMPORT <filename>");
        }

        let path = args
            .iter()
            .map(|t| t.text())
            .collect::<Vec<&str>>()
            .join(" ");
        let mut script = match Script::from_file(&path) {
            Ok(s) => s,
            Err(e) => {
                self.report(&Fault::Resource(format!(
                    "Could not open import file: {:#}",
                    e
                )))?;
                return Ok(Flow::Normal);
            }
        };

        // Each imported line gets its own fault boundary, like a top level line
        while let Some(line) = script.next_line("") {
            let line_number = script.line_number();
            debug!("{}:{}: {}", path, line_number, line);
            match self.dispatch(&line, &mut script) {
                Ok(Flow::Normal) => (),
                Ok(flow) => return Ok(flow),
                Err(fault) => self.emit(format_args!(
                    "Oops! Error ({}:{}): {}",
                    path, line_number, fault
                ))?,
            }
        }

        Ok(Flow::Normal)
    }

    fn exec_stack(&mut self) -> Result<Flow, Fault> {
        let mut s = format!("Call Stack (depth {}):", self.calls.depth());
        for frame in self.calls.frames() {
            s += &format!("\n  {}", frame);
        }
        self.emit(format_args!("{}", s))?;

        Ok(Flow::Normal)
    }

    fn exec_trace(&mut self) -> Result<Flow, Fault> {
        let mut s = String::new();

        s += "---- TRACE ----\n";
        s += &format!("Variables ({}):\n", self.variables.len());
        for (name, val) in self.variables.iter() {
            s += &format!("  {} = {}\n", name, val);
        }
        s += &format!("Functions ({}):\n", self.functions.len());
        for func in self.functions.iter() {
            s += &format!("  {} with {} lines\n", func, func.body.len());
        }
        s += "---- END TRACE ----";
        self.emit(format_args!("{}", s))?;

        Ok(Flow::Normal)
    }

    fn exec_debug(&mut self, args: &[Token]) -> Result<Flow, Fault> {
        match args.first() {
            Some(t) if t.is_keyword("ON") => {
                log::set_max_level(LevelFilter::Debug);
                self.emit(format_args!("Debug mode enabled."))?;
            }
            Some(t) if t.is_keyword("OFF") => {
                log::set_max_level(LevelFilter::Error);
                self.emit(format_args!("Debug mode disabled."))?;
            }
            _ => syntax!("Usage: DEBUG ON|OFF"),
        }

        Ok(Flow::Normal)
    }

    /// Interpret one line
    ///
    /// `source` supplies the bodies of block constructs started on this line.
    fn dispatch(&mut self, line: &str, source: &mut dyn LineSource) -> Result<Flow, Fault> {
        if is_blank_or_comment(line) {
            return Ok(Flow::Normal);
        }

        let tokens = tokenize(line);
        let (first, args) = match tokens.split_first() {
            Some(split) => split,
            None => return Ok(Flow::Normal),
        };
        let command = if first.is_literal() {
            None
        } else {
            COMMANDS.get(first.text().to_ascii_uppercase().as_str()).copied()
        };
        debug!("Executing command: {}", first.text().to_ascii_uppercase());

        match command {
            Some(Command::Set) => self.exec_set(args),
            Some(Command::Print) => self.exec_print(args),
            Some(Command::Get) => self.exec_get(args),
            Some(Command::Input) => self.exec_input(args),
            Some(Command::Concat) => self.exec_concat(args),
            Some(Command::Repeat) => self.exec_repeat(args, source),
            Some(Command::If) => self.exec_if(args, source),
            Some(Command::While) => self.exec_while(args, source),
            Some(Command::For) => self.exec_for(args, source),
            Some(Command::Function) => self.exec_function(args, source),
            Some(Command::Try) => self.exec_try(source),
            Some(Command::Call) => self.exec_call(args),
            Some(Command::Return) => self.exec_return(args),
            Some(Command::Import) => self.exec_import(args),
            Some(Command::Stack) => self.exec_stack(),
            Some(Command::Trace) => self.exec_trace(),
            Some(Command::Debug) => self.exec_debug(args),
            Some(Command::Help) => {
                self.emit(format_args!("{}", HELP))?;
                Ok(Flow::Normal)
            }
            Some(Command::Exit) => Ok(Flow::Exit),
            None => syntax!("Unknown command: {}", first.text()),
        }
    }

    /// Run one top level line
    ///
    /// This is the per-line fault boundary: a fault abandons this line only.
    pub fn eval(&mut self, line: &str, source: &mut dyn LineSource) -> EvalResult {
        match self.dispatch(line, source) {
            Ok(Flow::Normal) => EvalResult::Ok,
            Ok(Flow::Exit) => EvalResult::Quit,
            Ok(Flow::Return(_)) => EvalResult::Err(Fault::Dispatch(
                "RETURN can only be used inside a function".to_string(),
            )),
            Err(fault) => EvalResult::Err(fault),
        }
    }

    #[cfg(test)]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
}

#[cfg(test)]
fn run_with(
    program: &str,
    input: &str,
    interactive: bool,
    limits: Limits,
) -> (String, Vec<Fault>) {
    let mut output = Vec::new();
    let mut console = Script::new(input);
    let mut faults = Vec::new();
    {
        let mut eval = Eval::new(&mut output, &mut console, interactive, limits);
        let mut script = Script::new(program);
        while let Some(line) = script.next_line("") {
            match eval.eval(&line, &mut script) {
                EvalResult::Ok => (),
                EvalResult::Quit => break,
                EvalResult::Err(e) => faults.push(e),
            }
        }
    }

    (
        String::from_utf8(output).expect("Output not utf-8"),
        faults,
    )
}

#[cfg(test)]
fn run_with_input(program: &str, input: &str, interactive: bool) -> (String, Vec<Fault>) {
    run_with(program, input, interactive, Limits::default())
}

#[cfg(test)]
fn run(program: &str) -> (String, Vec<Fault>) {
    run_with_input(program, "", false)
}

#[cfg(test)]
fn assert_output(program: &str, expected: &str) {
    let (output, faults) = run(program);
    pretty_assertions::assert_eq!(output, expected, "program:\n{}", program);
    assert!(faults.is_empty(), "unexpected faults: {:?}", faults);
}

#[test]
fn test_set_and_print() {
    let tests = vec![
        ("SET x = 3.5\nPRINT $x", "3.5\n"),
        ("SET s = \"hi\"\nPRINT $s", "hi\n"),
        ("SET n = \"42\"\nPRINT $n", "42\n"),
        ("VARIABLE x = 2 + 3 * 4\nPRINT x", "14\n"),
        ("set x = (2+3)*4\nprint $x", "20\n"),
        ("SET x = 10/4\nPRINT $x", "2.5\n"),
        ("SET x = 1000000\nPRINT $x", "1e+06\n"),
        ("SET x = 1 / 3\nPRINT $x", "0.333333\n"),
        ("SET x = 2\nSET x = x * x\nPRINT \"x is\" x", "x is 4\n"),
        ("PRINT hello \"big world\" $nope nope", "hello big world [undefined] nope\n"),
        ("PRINT", "\n"),
        ("SET t = true\nPRINT $t", "1\n"),
    ];

    for (input, expected) in tests {
        assert_output(input, expected);
    }
}

#[test]
fn test_get() {
    assert_output(
        "SET x = 7\nGET x\nGET unknown",
        "Variable 'x' = '7'\nVariable 'unknown' is not defined.\n",
    );
}

#[test]
fn test_faults_abandon_only_their_line() {
    let (output, faults) = run("PRINT before\nSET x = 5/0\nSET y = (1+2\nPRINT after $x");
    assert_eq!(output, "before\nafter [undefined]\n");
    assert_eq!(faults.len(), 2);
    assert!(faults.iter().all(|f| matches!(f, Fault::Evaluation(_))));

    let (output, faults) = run("FROB x\nSET x\nIF 1 PRINT x\nRETURN 1\nPRINT ok");
    assert_eq!(output, "ok\n");
    assert_eq!(faults.len(), 4);
    assert!(faults.iter().all(|f| matches!(f, Fault::Dispatch(_))));
}

#[test]
fn test_if() {
    let tests = vec![
        ("SET x = 3\nIF x > 2 THEN PRINT \"High\" ELSE PRINT \"Low\" ENDIF", "High\n"),
        ("SET x = 1\nIF x > 2 THEN PRINT \"High\" ELSE PRINT \"Low\" ENDIF", "Low\n"),
        ("IF 0 THEN PRINT yes ENDIF\nPRINT done", "done\n"),
        ("if $x == 0 then print zero endif", "zero\n"),
        ("IF 1 THEN PRINT \"a  b\" ENDIF", "a  b\n"),
        // Keywords match first come, first served
        ("IF 1 THEN PRINT what if ENDIF", "what if\n"),
        ("IF 1 THEN PRINT a IF ENDIF PRINT b ENDIF", "a IF\n"),
        ("IF 0 THEN PRINT a ENDIF ELSE PRINT b", ""),
        ("IF 0 THEN PRINT a ELSE PRINT b ELSE PRINT c ENDIF", "b ELSE PRINT c\n"),
    ];

    for (input, expected) in tests {
        assert_output(input, expected);
    }

    let (_, faults) = run("IF 1 THEN PRINT x");
    assert!(matches!(faults.as_slice(), [Fault::Dispatch(_)]));
}

#[test]
fn test_repeat() {
    assert_output(
        "SET n = 0\nREPEAT 3 SET n = n + 1\nPRINT $n",
        "3\n",
    );
    assert_output("REPEAT 2 PRINT \"hi there\"", "hi there\nhi there\n");

    let (output, faults) = run("REPEAT 0 PRINT x\nREPEAT -2 PRINT x");
    assert_eq!(output, "");
    assert_eq!(faults.len(), 2);
}

#[test]
fn test_while() {
    assert_output(
        "SET i = 0\nWHILE i < 3 BEGIN\nPRINT i\nSET i = i + 1\nENDWHILE\nPRINT done",
        "0\n1\n2\ndone\n",
    );
    assert_output(
        "SET i = 5\nWHILE i < 3 BEGIN\nPRINT i\nENDWHILE\nPRINT done",
        "done\n",
    );

    let (_, faults) = run("WHILE 1\nPRINT x");
    assert!(matches!(faults.as_slice(), [Fault::Dispatch(_)]));
}

#[test]
fn test_for() {
    assert_output(
        "FOR i = 1 TO 3 BEGIN\nPRINT i\nENDFOR",
        "1\n2\n3\n",
    );
    assert_output(
        "FOR i = 1 TO 3 STEP -1 BEGIN\nPRINT i\nENDFOR\nPRINT done",
        "done\n",
    );
    assert_output(
        "FOR i = 10 TO 4 STEP -3 BEGIN\nPRINT i\nendfor\nPRINT $i",
        "10\n7\n4\n1\n",
    );
    assert_output(
        "FOR i = 0 TO 1 STEP 0.5 BEGIN\nPRINT i\nENDFOR",
        "0\n0.5\n1\n",
    );
    // The body may move the loop variable
    assert_output(
        "FOR i = 1 TO 10 BEGIN\nPRINT i\nSET i = i * 4\nENDFOR",
        "1\n5\n",
    );

    let (_, faults) = run("FOR i = 1 UNTIL 3 BEGIN\nFOR i = 1 TO 3\nFOR i 1 TO 3 BEGIN");
    assert_eq!(faults.len(), 3);
}

#[test]
fn test_nested_blocks() {
    assert_output(
        "FOR i = 1 TO 2 BEGIN\nFOR j = 1 TO 2 BEGIN\nPRINT i j\nENDFOR\nENDFOR\nPRINT done",
        "1 1\n1 2\n2 1\n2 2\ndone\n",
    );
    assert_output(
        "SET i = 0\nWHILE i < 2 BEGIN\nSET j = 0\nWHILE j < 2 BEGIN\nSET j = j + 1\nENDWHILE\nSET i = i + 1\nPRINT i j\nENDWHILE",
        "1 2\n2 2\n",
    );
}

#[test]
fn test_functions() {
    assert_output(
        "FUNCTION add a b\nRETURN a + b\nENDFUNCTION\nCALL add 2 3",
        "Function 'add' returned 5\n",
    );
    assert_output(
        "FUNCTION nothing\nPRINT inside\nENDFUNCTION\nCALL nothing",
        "inside\nFunction 'nothing' returned 0\n",
    );
    assert_output("CALL ghost 1", "Function 'ghost' not defined.\n");
    assert_output(
        "FUNCTION f a\nRETURN a\nENDFUNCTION\nCALL f 1 2",
        "Error: Function 'f' expects 1 arguments, got 2.\nFunction 'f' returned 0\n",
    );
    // First definition wins
    assert_output(
        "FUNCTION f\nRETURN 1\nENDFUNCTION\nFUNCTION f\nRETURN 2\nENDFUNCTION\nCALL f",
        "Function 'f' returned 1\n",
    );
    // Quoted arguments are bound as numbers
    assert_output(
        "FUNCTION show s\nPRINT $s\nENDFUNCTION\nCALL show \"word\"",
        "0\nFunction 'show' returned 0\n",
    );
}

#[test]
fn test_function_scope() {
    assert_output(
        "SET x = 10\nFUNCTION f x\nSET extra = x * 2\nPRINT $x $extra\nRETURN extra\nENDFUNCTION\nCALL f 5\nPRINT $x $extra",
        "5 10\nFunction 'f' returned 10\n10 [undefined]\n",
    );
    // Globals written by the body keep the write
    assert_output(
        "SET g = 1\nFUNCTION bump\nSET g = g + 1\nENDFUNCTION\nCALL bump\nPRINT $g",
        "Function 'bump' returned 0\n2\n",
    );
}

#[test]
fn test_return_unwinds_nested_constructs() {
    assert_output(
        "FUNCTION f n\nIF n > 1 THEN RETURN n * 10 ENDIF\nPRINT unreachable\nENDFUNCTION\nCALL f 3",
        "Function 'f' returned 30\n",
    );
    assert_output(
        "FUNCTION g\nSET k = 0\nREPEAT 5 IF k == 2 THEN RETURN k ELSE SET k = k + 1 ENDIF\nPRINT unreachable\nENDFUNCTION\nCALL g",
        "Function 'g' returned 2\n",
    );
    assert_output(
        "FUNCTION h\nFOR i = 1 TO 100 BEGIN\nIF i == 4 THEN RETURN i ENDIF\nENDFOR\nRETURN 0\nENDFUNCTION\nCALL h\nSTACK",
        "Function 'h' returned 4\nCall Stack (depth 0):\n",
    );
    // RETURN passes through TRY rather than being caught by it
    assert_output(
        "FUNCTION t\nTRY\nRETURN 7\nCATCH\nPRINT caught\nENDTRY\nRETURN 1\nENDFUNCTION\nCALL t",
        "Function 't' returned 7\n",
    );
}

#[test]
fn test_fault_inside_function() {
    let (output, faults) = run(
        "SET x = 1\nFUNCTION f x\nPRINT $x\nSET y = 1/0\nENDFUNCTION\nCALL f 9\nPRINT $x\nSTACK",
    );
    assert_eq!(output, "9\n1\nCall Stack (depth 0):\n");
    assert!(matches!(faults.as_slice(), [Fault::Evaluation(_)]));
}

#[test]
fn test_try() {
    assert_output(
        "TRY\nPRINT before\nSET x = 1/0\nPRINT skipped\nCATCH\nPRINT recovered\nENDTRY\nPRINT after",
        "before\nrecovered\nafter\n",
    );
    assert_output(
        "TRY\nPRINT fine\nCATCH\nPRINT never\nSET x = 1\nENDTRY\nPRINT $x",
        "fine\n[undefined]\n",
    );
    assert_output(
        "FUNCTION bad\nBOGUS\nENDFUNCTION\nTRY\nCALL bad\nCATCH\nPRINT caught\nENDTRY",
        "caught\n",
    );
    assert_output(
        "TRY\nTRY\nSET a = 1/0\nCATCH\nPRINT inner\nENDTRY\nSET b = 1/0\nCATCH\nPRINT outer\nENDTRY",
        "inner\nouter\n",
    );

    // A fault in the CATCH block reaches the line boundary
    let (output, faults) = run("TRY\nSET a = 1/0\nCATCH\nSET b = (1\nENDTRY\nPRINT next");
    assert_eq!(output, "next\n");
    assert_eq!(faults.len(), 1);
}

#[test]
fn test_source_ends_inside_block() {
    let (output, faults) = run("SET i = 0\nWHILE i < 2 BEGIN\nSET i = i + 1\nPRINT i");
    assert_eq!(output, "1\n2\n");
    assert!(faults.is_empty());

    // Runs out before CATCH: the fault is caught by an empty CATCH block
    let (output, faults) = run("TRY\nPRINT before\nSET x = 1/0\nPRINT skipped");
    assert_eq!(output, "before\n");
    assert!(faults.is_empty());

    let (output, faults) = run("TRY\nPRINT fine\nCATCH\nPRINT never");
    assert_eq!(output, "fine\n");
    assert!(faults.is_empty());
}

#[test]
fn test_capacity() {
    let mut output = Vec::new();
    let mut console = Script::new("");
    let limits = Limits {
        variables: 2,
        functions: 1,
        call_depth: 2,
    };
    {
        let mut eval = Eval::new(&mut output, &mut console, false, limits);
        let mut script = Script::new(
            "SET a = 1\nSET b = 2\nSET c = 3\nSET a = 4\nPRINT $a $c\nFUNCTION f\nENDFUNCTION\nFUNCTION g\nENDFUNCTION\nCALL g",
        );
        while let Some(line) = script.next_line("") {
            assert!(matches!(eval.eval(&line, &mut script), EvalResult::Ok));
        }
    }

    let output = String::from_utf8(output).expect("Output not utf-8");
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("Oops! Error: Maximum variable limit"));
    assert_eq!(lines[1], "4 [undefined]");
    assert!(lines[2].starts_with("Oops! Error: Maximum function limit"));
    assert_eq!(lines[3], "Function 'g' not defined.");
}

#[test]
fn test_recursion_limit() {
    let limits = Limits {
        call_depth: 8,
        ..Limits::default()
    };
    let (output, faults) = run_with("FUNCTION r\nCALL r\nENDFUNCTION\nCALL r", "", false, limits);
    assert!(faults.is_empty());

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 10);
    assert_eq!(
        lines[0],
        "Oops! Error: Maximum call stack depth reached (8); 'r' was not called"
    );
    assert!(lines[1..].iter().all(|l| *l == "Function 'r' returned 0"));
}

#[test]
fn test_input_and_concat() {
    let (output, faults) = run_with_input(
        "INPUT name What is your name?\nINPUT age \"Age:\"\nSET greeting = \"Hello, \"\nCONCAT msg greeting name\nPRINT $msg\nSET older = age + 1\nPRINT $older\nINPUT gone prompt",
        "  Ada  \n36\n",
        false,
    );
    assert_eq!(output, "Hello, Ada\n37\nOops! Error: Failed to read input\n");
    assert!(faults.is_empty());
}

#[test]
fn test_interactive_confirmations() {
    let (output, _) = run_with_input(
        "SET x = 1.5\nFUNCTION f a\nRETURN a\nENDFUNCTION\nTRY\nPRINT ok\nCATCH\nENDTRY",
        "",
        true,
    );
    assert_eq!(
        output,
        "Variable 'x' set to '1.5'\n\
         Function 'f' defined with 1 parameter(s) and 1 code line(s).\n\
         ok\n\
         TRY block executed successfully; skipping CATCH.\n"
    );
}

#[test]
fn test_trace_and_stack() {
    assert_output(
        "SET x = 2\nSET s = \"txt\"\nFUNCTION f a b\nSTACK\nENDFUNCTION\nTRACE\nCALL f 1 2",
        "---- TRACE ----\n\
         Variables (2):\n  x = 2\n  s = txt\n\
         Functions (1):\n  f(a, b) with 1 lines\n\
         ---- END TRACE ----\n\
         Call Stack (depth 1):\n  f\n\
         Function 'f' returned 0\n",
    );
}

#[test]
fn test_exit_and_comments() {
    assert_output(
        "# setup\n\n   \nPRINT one\nFUNCTION f\nEXIT\nENDFUNCTION\nCALL f\nPRINT two",
        "one\n",
    );
}

#[test]
fn test_import() {
    let path = std::env::temp_dir().join(format!("claro-import-{}.claro", std::process::id()));
    std::fs::write(
        &path,
        "SET imported = 5\nBOGUS\nFOR i = 1 TO 2 BEGIN\nPRINT i\nENDFOR\n",
    )
    .expect("write import file");

    let program = format!("IMPORT {}\nPRINT $imported\nIMPORT /nonexistent/claro/file", path.display());
    let (output, faults) = run(&program);
    std::fs::remove_file(&path).expect("remove import file");

    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("Oops! Error ("));
    assert!(lines[0].ends_with(":2): Unknown command: BOGUS"));
    assert_eq!(&lines[1..4], &["1", "2", "5"]);
    assert!(lines[4].starts_with("Oops! Error: Could not open import file"));
    assert!(faults.is_empty());
}
