use std::io;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use rustyline::config::Config as EditorConfig;
use rustyline::error::ReadlineError;
use simplelog::{Config as LogConfig, SimpleLogger};

mod input;
mod lang;
mod repl;

use input::{Script, Stdin};
use lang::eval::EvalResult;
use lang::runtime::{Limits, Runtime};
use repl::{EditorSource, ReplEditor, ReplHelper};

const HISTORY_FILE: &str = ".claro_history";
const PROMPT: &str = "Claro> ";

#[derive(Parser)]
#[command(version, about = "Interpreter for the Claro scripting language")]
struct Opt {
    /// Program to run. Starts an interactive session when omitted
    file: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long)]
    debug: bool,

    /// Don't echo assignments and definitions in an interactive session
    #[arg(short, long)]
    quiet: bool,

    /// Most variables that can exist at once
    #[arg(long, default_value_t = 100)]
    max_variables: usize,

    /// Most functions that can be defined
    #[arg(long, default_value_t = 100)]
    max_functions: usize,

    /// Deepest function call nesting
    #[arg(long, default_value_t = 100)]
    max_call_depth: usize,
}

impl Opt {
    fn limits(&self) -> Limits {
        Limits {
            variables: self.max_variables,
            functions: self.max_functions,
            call_depth: self.max_call_depth,
        }
    }
}

fn init_logging(debug: bool) -> Result<()> {
    // The logger lets everything through; `DEBUG ON|OFF` moves the global max level
    match SimpleLogger::init(LevelFilter::Debug, LogConfig::default()) {
        Ok(_) => (),
        Err(e) => bail!("Failed to init logger: {}", e),
    };

    log::set_max_level(if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    });

    Ok(())
}

fn init_editor() -> Result<ReplEditor> {
    let config = EditorConfig::builder().auto_add_history(true).build();
    let mut editor = ReplEditor::with_config(config).context("Failed to create line editor")?;
    editor.set_helper(Some(ReplHelper::new()));

    Ok(editor)
}

fn init_history(editor: &mut ReplEditor) {
    let _ = editor.load_history(HISTORY_FILE);
}

fn save_history(editor: &mut ReplEditor) -> Result<()> {
    match editor.save_history(HISTORY_FILE) {
        Ok(_) => Ok(()),
        Err(e) => bail!("Failed to save history: {}", e),
    }
}

fn welcome() {
    println!("Claro interpreter v{}", env!("CARGO_PKG_VERSION"));
    println!("Type HELP for commands, EXIT to quit");
    println!();
}

fn run_file(path: &Path, limits: Limits) -> Result<()> {
    let mut script = Script::from_file(path)?;
    let mut stdout = io::stdout();
    let mut console = Stdin;
    let mut runtime = Runtime::new(&mut stdout, &mut console, false, limits);

    runtime.run(&mut script, |line, fault| {
        eprintln!("Oops! Error (line {}): {}", line, fault);
    });

    Ok(())
}

fn run_repl(interactive: bool, limits: Limits) -> Result<()> {
    let mut editor = init_editor()?;
    init_history(&mut editor);
    welcome();

    let mut stdout = io::stdout();
    let mut console = Stdin;
    let mut runtime = Runtime::new(&mut stdout, &mut console, interactive, limits);

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                info!("read: {}", &line);

                match runtime.eval(&line, &mut EditorSource::new(&mut editor)) {
                    EvalResult::Ok => (),
                    EvalResult::Quit => {
                        println!("Exiting interpreter.");
                        break;
                    }
                    EvalResult::Err(e) => {
                        eprintln!("Oops! Error: {}", e);
                        continue;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("Press Ctrl-D or type 'EXIT' to quit");
            }
            Err(ReadlineError::Eof) => {
                println!("EXIT");
                break;
            }
            Err(e) => {
                error!("Unexpected error: {}", e);
                println!("EXIT");
                break;
            }
        }
    }

    save_history(&mut editor)?;

    Ok(())
}

fn main() {
    let opts = Opt::parse();

    let result = init_logging(opts.debug).and_then(|_| match &opts.file {
        Some(path) => run_file(path, opts.limits()),
        None => run_repl(!opts.quiet, opts.limits()),
    });

    if let Err(e) = result {
        eprintln!("Oops! Error: {:#}", e);
        process::exit(1);
    }
}
