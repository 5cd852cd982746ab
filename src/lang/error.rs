use std::fmt;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FaultKind {
    Evaluation,
    Dispatch,
    Capacity,
    Resource,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Evaluation => write!(f, "evaluation"),
            FaultKind::Dispatch => write!(f, "dispatch"),
            FaultKind::Capacity => write!(f, "capacity"),
            FaultKind::Resource => write!(f, "resource"),
        }
    }
}

/// Everything that can go wrong while running a line
///
/// `Evaluation` and `Dispatch` unwind to the nearest fault boundary (an enclosing `TRY` or the
/// per-line boundary). `Capacity` and `Resource` are reported where they happen and never unwind.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Fault {
    #[error("{0}")]
    Evaluation(String),
    #[error("{0}")]
    Dispatch(String),
    #[error("{0}")]
    Capacity(String),
    #[error("{0}")]
    Resource(String),
}

impl Fault {
    pub fn kind(&self) -> FaultKind {
        match self {
            Fault::Evaluation(_) => FaultKind::Evaluation,
            Fault::Dispatch(_) => FaultKind::Dispatch,
            Fault::Capacity(_) => FaultKind::Capacity,
            Fault::Resource(_) => FaultKind::Resource,
        }
    }
}

/// Bail out of the current function with a `Fault::Dispatch`
macro_rules! syntax {
    ($($arg:tt)*) => {
        return Err($crate::lang::error::Fault::Dispatch(format!($($arg)*)))
    };
}

pub(crate) use syntax;
