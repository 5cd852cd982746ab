use std::fmt;
use std::rc::Rc;

use crate::lang::error::Fault;

/// A user defined function
///
/// The body is kept as raw source lines and re-dispatched on every call.
#[derive(Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<String>,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

/// Registry of defined functions, in definition order
pub struct Functions {
    inner: Vec<Rc<Function>>,
    limit: usize,
}

impl Functions {
    pub fn new(limit: usize) -> Self {
        Functions {
            inner: Vec::new(),
            limit,
        }
    }

    pub fn define(&mut self, func: Function) -> Result<(), Fault> {
        if self.inner.len() >= self.limit {
            return Err(Fault::Capacity(format!(
                "Maximum function limit reached ({}); '{}' was not defined",
                self.limit, func.name
            )));
        }
        self.inner.push(Rc::new(func));

        Ok(())
    }

    /// First function registered under `name`
    ///
    /// Redefining a name does not replace the earlier definition.
    pub fn lookup(&self, name: &str) -> Option<Rc<Function>> {
        self.inner.iter().find(|f| f.name == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Function> {
        self.inner.iter().map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Names of the functions currently executing, outermost first
pub struct CallStack {
    frames: Vec<String>,
    limit: usize,
}

impl CallStack {
    pub fn new(limit: usize) -> Self {
        CallStack {
            frames: Vec::new(),
            limit,
        }
    }

    pub fn push(&mut self, name: &str) -> Result<(), Fault> {
        if self.frames.len() >= self.limit {
            return Err(Fault::Capacity(format!(
                "Maximum call stack depth reached ({}); '{}' was not called",
                self.limit, name
            )));
        }
        self.frames.push(name.to_string());

        Ok(())
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }
}

#[cfg(test)]
fn function(name: &str, params: &[&str], body: &[&str]) -> Function {
    Function {
        name: name.to_string(),
        params: params.iter().map(|p| p.to_string()).collect(),
        body: body.iter().map(|l| l.to_string()).collect(),
    }
}

#[test]
fn test_first_definition_wins() {
    let mut funcs = Functions::new(10);
    funcs.define(function("f", &["a"], &["RETURN a"])).unwrap();
    funcs.define(function("g", &[], &[])).unwrap();
    funcs.define(function("f", &["a", "b"], &["RETURN b"])).unwrap();

    let f = funcs.lookup("f").unwrap();
    assert_eq!(f.params, vec!["a".to_string()]);
    assert_eq!(f.to_string(), "f(a)");
    assert_eq!(funcs.len(), 3);
    assert!(funcs.lookup("h").is_none());
}

#[test]
fn test_function_limit() {
    let mut funcs = Functions::new(1);
    funcs.define(function("f", &[], &[])).unwrap();
    match funcs.define(function("g", &[], &[])) {
        Err(Fault::Capacity(_)) => (),
        r => panic!("expected capacity fault, got {:?}", r),
    }
    assert!(funcs.lookup("g").is_none());
}

#[test]
fn test_call_stack() {
    let mut stack = CallStack::new(2);
    assert!(stack.is_empty());
    stack.push("a").unwrap();
    stack.push("b").unwrap();
    assert!(stack.push("c").is_err());
    assert_eq!(stack.frames(), &["a".to_string(), "b".to_string()]);
    stack.pop();
    assert_eq!(stack.depth(), 1);
}
