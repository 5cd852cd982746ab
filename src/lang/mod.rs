pub mod error;
pub mod eval;
pub mod expr;
pub mod functions;
pub mod lex;
pub mod runtime;
pub mod value;
pub mod variables;
