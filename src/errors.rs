//! Error types raised by the compiler and the virtual machine.

use thiserror::Error;

/// Top-level error returned by `compile`, `evaluate`, and `search`.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum JmespathError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Raised during `compile`. Carries the source text, offending position, and
/// a human-readable message, rendered with a line/column caret pointer.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{message}")]
pub struct SyntaxError {
    message: String,
    pub line: usize,
    pub col: usize,
}

impl SyntaxError {
    pub fn new(expr: &str, pos: usize, msg: &str, hint: &str) -> SyntaxError {
        let mut line = 0usize;
        let mut col = 0usize;
        let mut buff = String::new();
        for l in expr.lines() {
            buff.push_str(l);
            buff.push('\n');
            if buff.len() > pos {
                col = match line {
                    0 => pos,
                    _ => buff.len().checked_sub(2 + pos).unwrap_or(0),
                };
                inject_err_pointer(&mut buff, col);
                break;
            }
            line += 1;
        }
        if !hint.is_empty() {
            buff.push_str(&format!("Hint: {}", hint));
        }
        SyntaxError {
            message: format!("Parse error at line {}, col {}; {}\n{}", line, col, msg, buff),
            line,
            col,
        }
    }
}

fn inject_err_pointer(buf: &mut String, col: usize) {
    buf.extend(std::iter::repeat(' ').take(col));
    buf.push_str("^\n");
}

/// Raised during `evaluate`, exclusively by function calls.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("not enough arguments, expected at least {expected}, got {actual}")]
    NotEnoughArguments { expected: usize, actual: usize },
    #[error("too many arguments, expected at most {expected}, got {actual}")]
    TooManyArguments { expected: usize, actual: usize },
    #[error("argument {position} expected type {expected}, got {actual}")]
    InvalidType {
        expected: String,
        actual: String,
        position: usize,
    },
}
