use crate::lang::error::Fault;
use crate::lang::value::Value;

/// Ordered variable store
///
/// Variables keep the position they were created at. Function calls scope their locals by
/// position: everything created past the call's watermark is dropped when the call ends.
pub struct Variables {
    inner: Vec<(String, Value)>,
    limit: usize,
}

/// A function call's dynamic scope
///
/// Created by `Variables::enter_scope` and handed back to `Variables::exit_scope` on every exit
/// path of the call.
pub struct Scope {
    watermark: usize,
    /// Slots below the watermark that a parameter took over, with the value to put back
    shadowed: Vec<(usize, Value)>,
}

impl Variables {
    pub fn new(limit: usize) -> Self {
        Variables {
            inner: Vec::new(),
            limit,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.inner.iter().position(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inner.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Update `name` in place, or append it
    ///
    /// Fails without touching the store if appending would go past the limit.
    pub fn set(&mut self, name: &str, val: Value) -> Result<(), Fault> {
        if let Some(i) = self.position(name) {
            self.inner[i].1 = val;
            return Ok(());
        }

        if self.inner.len() >= self.limit {
            return Err(Fault::Capacity(format!(
                "Maximum variable limit reached ({}); '{}' was not created",
                self.limit, name
            )));
        }
        self.inner.push((name.to_string(), val));

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn enter_scope(&self) -> Scope {
        Scope {
            watermark: self.inner.len(),
            shadowed: Vec::new(),
        }
    }

    /// Bind a parameter inside `scope`
    ///
    /// A parameter named like a variable that already existed when the scope was entered takes
    /// over that variable's slot; the old value is remembered and put back by `exit_scope`.
    pub fn bind(&mut self, scope: &mut Scope, name: &str, val: Value) -> Result<(), Fault> {
        match self.position(name) {
            Some(i) if i < scope.watermark => {
                if !scope.shadowed.iter().any(|(s, _)| *s == i) {
                    let old = std::mem::replace(&mut self.inner[i].1, val);
                    scope.shadowed.push((i, old));
                } else {
                    self.inner[i].1 = val;
                }
                Ok(())
            }
            _ => self.set(name, val),
        }
    }

    /// Drop everything created since `scope` was entered and restore shadowed variables
    pub fn exit_scope(&mut self, scope: Scope) {
        self.inner.truncate(scope.watermark);
        for (i, val) in scope.shadowed.into_iter().rev() {
            self.inner[i].1 = val;
        }
    }
}

#[test]
fn test_set_get() {
    let mut vars = Variables::new(10);
    vars.set("a", Value::Float(1.0)).unwrap();
    vars.set("b", Value::String("two".to_string())).unwrap();
    vars.set("a", Value::Float(3.0)).unwrap();

    assert_eq!(vars.get("a"), Some(&Value::Float(3.0)));
    assert_eq!(vars.get("b"), Some(&Value::String("two".to_string())));
    assert_eq!(vars.get("c"), None);

    // Updating keeps the original position
    let names: Vec<&str> = vars.iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_capacity() {
    let mut vars = Variables::new(2);
    vars.set("a", Value::Float(1.0)).unwrap();
    vars.set("b", Value::Float(2.0)).unwrap();

    match vars.set("c", Value::Float(3.0)) {
        Err(Fault::Capacity(_)) => (),
        r => panic!("expected capacity fault, got {:?}", r),
    }
    assert_eq!(vars.len(), 2);
    assert_eq!(vars.get("c"), None);

    // Updates still work at the limit
    vars.set("a", Value::Float(5.0)).unwrap();
    assert_eq!(vars.get("a"), Some(&Value::Float(5.0)));
}

#[test]
fn test_scope() {
    let mut vars = Variables::new(10);
    vars.set("x", Value::Float(10.0)).unwrap();
    vars.set("g", Value::Float(1.0)).unwrap();

    let mut scope = vars.enter_scope();
    vars.bind(&mut scope, "x", Value::Float(5.0)).unwrap();
    vars.bind(&mut scope, "p", Value::Float(7.0)).unwrap();
    vars.set("local", Value::Float(9.0)).unwrap();
    vars.set("g", Value::Float(2.0)).unwrap();
    vars.set("x", Value::Float(6.0)).unwrap();

    assert_eq!(vars.get("x"), Some(&Value::Float(6.0)));
    assert_eq!(vars.get("p"), Some(&Value::Float(7.0)));
    vars.exit_scope(scope);

    assert_eq!(vars.get("x"), Some(&Value::Float(10.0)));
    assert_eq!(vars.get("p"), None);
    assert_eq!(vars.get("local"), None);
    // Globals the body wrote to keep the write
    assert_eq!(vars.get("g"), Some(&Value::Float(2.0)));
    assert_eq!(vars.len(), 2);
}

#[test]
fn test_nested_scopes() {
    let mut vars = Variables::new(10);
    vars.set("n", Value::Float(0.0)).unwrap();

    let mut outer = vars.enter_scope();
    vars.bind(&mut outer, "n", Value::Float(1.0)).unwrap();
    let mut inner = vars.enter_scope();
    vars.bind(&mut inner, "n", Value::Float(2.0)).unwrap();
    assert_eq!(vars.get("n"), Some(&Value::Float(2.0)));

    vars.exit_scope(inner);
    assert_eq!(vars.get("n"), Some(&Value::Float(1.0)));
    vars.exit_scope(outer);
    assert_eq!(vars.get("n"), Some(&Value::Float(0.0)));
}
