//! Recursive descent evaluator for Claro expressions.
//!
//! Expressions are evaluated straight from their text; nothing is cached. The precedence ladder,
//! lowest first:
//!
//! ```text
//!     comparison  <- additive (('==' | '!=' | '<=' | '>=' | '<' | '>') additive)*
//!     additive    <- term (('+' | '-') term)*
//!     term        <- factor (('*' | '/') factor)*
//!     factor      <- ('-' | '+') factor | 'true' | 'false' | number | '(' comparison ')'
//!                  | '$'? identifier
//! ```
//!
//! Every level folds left to right. Comparisons and booleans produce 1 or 0. An identifier that
//! doesn't name a variable is 0. Evaluation stops quietly at the first character that doesn't
//! continue the expression; anything after it is ignored.

use crate::lang::error::Fault;
use crate::lang::value::leading_number;
use crate::lang::variables::Variables;

struct Evaluator<'a> {
    src: &'a str,
    pos: usize,
    variables: &'a Variables,
}

impl<'a> Evaluator<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_space(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    /// Consume `op` if the input continues with it
    fn eat(&mut self, op: &str) -> bool {
        if self.rest().starts_with(op) {
            self.pos += op.len();
            true
        } else {
            false
        }
    }

    /// Consume a case-insensitive keyword that isn't the prefix of a longer word
    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = self.rest().as_bytes();
        if rest.len() < keyword.len() || !rest[..keyword.len()].eq_ignore_ascii_case(keyword.as_bytes())
        {
            return false;
        }
        match rest.get(keyword.len()) {
            Some(c) if c.is_ascii_alphanumeric() || *c == b'_' => false,
            _ => {
                self.pos += keyword.len();
                true
            }
        }
    }

    fn comparison(&mut self) -> Result<f64, Fault> {
        let mut left = self.additive()?;
        loop {
            self.skip_space();
            let op: fn(f64, f64) -> bool = if self.eat("==") {
                |l, r| l == r
            } else if self.eat("!=") {
                |l, r| l != r
            } else if self.eat("<=") {
                |l, r| l <= r
            } else if self.eat(">=") {
                |l, r| l >= r
            } else if self.eat("<") {
                |l, r| l < r
            } else if self.eat(">") {
                |l, r| l > r
            } else {
                break;
            };

            let right = self.additive()?;
            left = if op(left, right) { 1.0 } else { 0.0 };
        }

        Ok(left)
    }

    fn additive(&mut self) -> Result<f64, Fault> {
        let mut result = self.term()?;
        loop {
            self.skip_space();
            if self.eat("+") {
                result += self.term()?;
            } else if self.eat("-") {
                result -= self.term()?;
            } else {
                break;
            }
        }

        Ok(result)
    }

    fn term(&mut self) -> Result<f64, Fault> {
        let mut result = self.factor()?;
        loop {
            self.skip_space();
            if self.eat("*") {
                result *= self.factor()?;
            } else if self.eat("/") {
                let rhs = self.factor()?;
                if rhs == 0.0 {
                    return Err(Fault::Evaluation(
                        "Division by zero is not allowed.".to_string(),
                    ));
                }
                result /= rhs;
            } else {
                break;
            }
        }

        Ok(result)
    }

    fn factor(&mut self) -> Result<f64, Fault> {
        self.skip_space();

        if self.eat_keyword("true") {
            return Ok(1.0);
        }
        if self.eat_keyword("false") {
            return Ok(0.0);
        }

        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let result = self.comparison()?;
                self.skip_space();
                if !self.eat(")") {
                    return Err(Fault::Evaluation(
                        "It looks like you forgot a closing parenthesis.".to_string(),
                    ));
                }
                Ok(result)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => match leading_number(self.rest()) {
                Some((n, len)) => {
                    self.pos += len;
                    Ok(n)
                }
                None => Ok(0.0),
            },
            _ => {
                self.eat("$");
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if !(c.is_ascii_alphanumeric() || c == b'_') {
                        break;
                    }
                    self.pos += 1;
                }
                let name = &self.src[start..self.pos];

                Ok(self.variables.get(name).map_or(0.0, |v| v.as_number()))
            }
        }
    }
}

/// Evaluate `expr` against the variables currently in scope
pub fn evaluate(expr: &str, variables: &Variables) -> Result<f64, Fault> {
    let mut evaluator = Evaluator {
        src: expr,
        pos: 0,
        variables,
    };

    evaluator.comparison()
}

#[cfg(test)]
fn test_variables() -> Variables {
    use crate::lang::value::Value;

    let mut vars = Variables::new(16);
    vars.set("x", Value::Float(3.0)).expect("set x");
    vars.set("y_2", Value::Float(0.5)).expect("set y_2");
    vars.set("s", Value::String("12abc".to_string())).expect("set s");
    vars
}

#[test]
fn test_arithmetic() {
    let vars = test_variables();
    let data = vec![
        ("2 + 3 * 4", 14.0),
        ("(2+3)*4", 20.0),
        ("10/4", 2.5),
        ("10 - 4 - 3", 3.0),
        ("16 / 4 / 2", 2.0),
        ("  7  ", 7.0),
        (".5 + 1.", 1.5),
        ("1e3 / 10", 100.0),
        // No unary operators: a sign where a factor belongs reads as 0
        ("-5", -5.0),
        ("2 * -3", -3.0),
        ("10 - -3", 7.0),
        ("-(1 + 2) * 2", -6.0),
        ("((((4))))", 4.0),
    ];

    for (input, expected) in data {
        assert_eq!(evaluate(input, &vars), Ok(expected), "evaluating {}", input);
    }
}

#[test]
fn test_comparison_and_booleans() {
    let vars = test_variables();
    let data = vec![
        ("1 == 1", 1.0),
        ("1 != 1", 0.0),
        ("3 <= 3", 1.0),
        ("3 >= 4", 0.0),
        ("2 < 3", 1.0),
        ("2 > 3", 0.0),
        ("1 + 1 == 2", 1.0),
        ("1 < 2 == 1", 1.0),
        ("true", 1.0),
        ("FALSE", 0.0),
        ("True + true", 2.0),
        ("truex", 0.0),
    ];

    for (input, expected) in data {
        assert_eq!(evaluate(input, &vars), Ok(expected), "evaluating {}", input);
    }
}

#[test]
fn test_variable_references() {
    let vars = test_variables();
    let data = vec![
        ("x * 2", 6.0),
        ("$x * 2", 6.0),
        ("y_2 + x", 3.5),
        ("s + 1", 13.0),
        ("unknown", 0.0),
        ("unknown + 4", 4.0),
        ("$x > 2", 1.0),
    ];

    for (input, expected) in data {
        assert_eq!(evaluate(input, &vars), Ok(expected), "evaluating {}", input);
    }
}

#[test]
fn test_trailing_input_ignored() {
    let vars = test_variables();
    assert_eq!(evaluate("3 apples", &vars), Ok(3.0));
    assert_eq!(evaluate("1 + 2)", &vars), Ok(3.0));
    assert_eq!(evaluate("", &vars), Ok(0.0));
}

#[test]
fn test_faults() {
    let vars = test_variables();
    let data = vec!["5/0", "1 + 10 / (x - 3)", "(1+2", "((1)", "2 * (3 + (4)"];

    for input in data {
        match evaluate(input, &vars) {
            Err(Fault::Evaluation(_)) => (),
            r => panic!("expected evaluation fault for {}, got {:?}", input, r),
        }
    }
}
