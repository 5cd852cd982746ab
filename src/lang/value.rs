use std::fmt;

/// Type tag of a stored variable
///
/// `Integer` is part of the language's type vocabulary but no command ever produces it; numbers
/// are always `Float`.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Type {
    Integer,
    Float,
    String,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Integer => write!(f, "integer"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Float(f64),
    String(String),
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::Float(_) => Type::Float,
            Value::String(_) => Type::String,
        }
    }

    /// Numeric view of the value
    ///
    /// Strings convert the way `atof` does: the longest numeric prefix, or 0 if there is none.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Float(f) => *f,
            Value::String(s) => leading_number(s.trim_start()).map_or(0.0, |(n, _)| n),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

/// Format a number the way C's `%g` does
///
/// Six significant digits, trailing zeros removed, and scientific notation when the decimal
/// exponent is below -4 or at least 6.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // Rounding to 6 significant digits can bump the exponent (eg. 999999.5), so take the
    // exponent from the rounded scientific form
    let sci = format!("{:.5e}", n);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };

    if exp < -4 || exp >= 6 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", strip_zeros(&mantissa), sign, exp.abs())
    } else {
        let precision = (5 - exp) as usize;
        strip_zeros(&format!("{:.*}", precision, n)).to_string()
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Parse the longest decimal floating point prefix of `s`
///
/// Returns the value and the number of bytes consumed, or `None` if `s` does not start with a
/// number. Accepts `12`, `1.5`, `.5`, `3.` and an optional exponent (`1e3`, `2.5E-2`). A sign is
/// accepted in front.
pub fn leading_number(s: &str) -> Option<(f64, usize)> {
    let bytes = s.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }

    if digits == 0 {
        return None;
    }

    // Only take the exponent if at least one digit follows it
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok().map(|n| (n, end))
}

/// Integer prefix of `s`, `atoi` style: 0 when there is no leading integer
pub fn leading_integer(s: &str) -> i64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }

    s[..end].parse::<i64>().unwrap_or(0)
}

#[test]
fn test_format_number() {
    let data = vec![
        (0.0, "0"),
        (3.0, "3"),
        (3.5, "3.5"),
        (-2.25, "-2.25"),
        (2.5, "2.5"),
        (14.0, "14"),
        (1.0 / 3.0, "0.333333"),
        (100000.0, "100000"),
        (1000000.0, "1e+06"),
        (1234567.0, "1.23457e+06"),
        (999999.5, "1e+06"),
        (0.0001, "0.0001"),
        (0.00001, "1e-05"),
        (123.456789, "123.457"),
        (-1e-10, "-1e-10"),
    ];

    for (input, expected) in data {
        assert_eq!(format_number(input), expected, "formatting {}", input);
    }
}

#[test]
fn test_leading_number() {
    let data = vec![
        ("12", Some((12.0, 2))),
        ("1.5+2", Some((1.5, 3))),
        (".5", Some((0.5, 2))),
        ("3.", Some((3.0, 2))),
        ("1e3", Some((1000.0, 3))),
        ("2.5E-2)", Some((0.025, 6))),
        ("7e", Some((7.0, 1))),
        ("-4abc", Some((-4.0, 2))),
        ("abc", None),
        (".", None),
        ("", None),
    ];

    for (input, expected) in data {
        assert_eq!(leading_number(input), expected, "parsing {:?}", input);
    }
}

#[test]
fn test_string_as_number() {
    assert_eq!(Value::String("42 apples".to_string()).as_number(), 42.0);
    assert_eq!(Value::String("hi".to_string()).as_number(), 0.0);
    assert_eq!(Value::Float(2.5).as_number(), 2.5);
    assert_eq!(leading_integer("3"), 3);
    assert_eq!(leading_integer("2.9"), 2);
    assert_eq!(leading_integer("-1"), -1);
    assert_eq!(leading_integer("x"), 0);
}
