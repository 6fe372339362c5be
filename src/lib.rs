//! Compiles and evaluates JMESPath expressions against `serde_json::Value` data.
//!
//! ```
//! use jmespath;
//!
//! let data = serde_json::json!({"foo": {"bar": {"baz": 42}}});
//! let result = jmespath::search("foo.bar.baz", &data).unwrap();
//! assert_eq!(*result, serde_json::json!(42));
//! ```
//!
//! The pipeline is `compile` (text → bytecode `Program`) followed by
//! `evaluate`/`search` (`Program` + value → value). A `Program` is reusable
//! and registry-agnostic: the same compiled expression can be evaluated
//! against different `FnRegistry`s.

mod bytecode;
mod compiler;
mod errors;
mod functions;
mod lexer;
mod value;
mod vm;

use std::rc::Rc;

pub use bytecode::{Arg, ContainerKind, Instruction, Program};
pub use errors::{JmespathError, RuntimeError, SyntaxError};
pub use functions::{ArgSpec, ArgumentType, FnRegistry, Function, OnMismatch, Signature};
pub use value::Rcvar;
pub use vm::Context;

pub use serde_json::Value;

/// Compiles `expression` into a reusable bytecode `Program`.
pub fn compile(expression: &str) -> Result<Program, JmespathError> {
    compiler::compile(expression)
}

/// Evaluates `program` against `input` using `registry` for function calls.
pub fn evaluate(program: &Program, input: Rcvar, registry: &FnRegistry) -> Result<Rcvar, JmespathError> {
    vm::evaluate(program, input, registry)
}

/// Compiles `expression` and evaluates it against `value` using the default
/// function registry. Convenience composition of `compile` + `Program::search`.
pub fn search(expression: &str, value: &Value) -> Result<Rcvar, JmespathError> {
    let program = compile(expression)?;
    program.search(Rc::new(value.clone()))
}

impl Program {
    /// Evaluates this program against `input` using the default function
    /// registry (built fresh on each call; callers evaluating many programs
    /// against the same custom registry should prefer `search_with_registry`
    /// with a registry they hold onto).
    pub fn search(&self, input: Rcvar) -> Result<Rcvar, JmespathError> {
        let registry = FnRegistry::from_defaults();
        self.search_with_registry(input, &registry)
    }

    /// Evaluates this program against `input` using a caller-supplied registry.
    pub fn search_with_registry(&self, input: Rcvar, registry: &FnRegistry) -> Result<Rcvar, JmespathError> {
        evaluate(self, input, registry)
    }
}

/// A compiled expression paired with its original source text, for callers
/// that want to retain the text alongside the bytecode (e.g. for logging a
/// failed evaluation against the expression that produced it).
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    source: String,
    program: Program,
}

impl Expression {
    /// Compiles `expression` into an `Expression` retaining the source text.
    pub fn new(expression: &str) -> Result<Expression, JmespathError> {
        let program = compile(expression)?;
        Ok(Expression {
            source: expression.to_string(),
            program,
        })
    }

    /// The original expression text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The underlying compiled bytecode program.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Evaluates against `input` using the default function registry.
    pub fn search(&self, input: Rcvar) -> Result<Rcvar, JmespathError> {
        self.program.search(input)
    }

    /// Evaluates against `input` using a caller-supplied registry.
    pub fn search_with_registry(&self, input: Rcvar, registry: &FnRegistry) -> Result<Rcvar, JmespathError> {
        self.program.search_with_registry(input, registry)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_end_to_end() {
        let data = json!({"foo": {"bar": {"baz": 42}}});
        assert_eq!(*search("foo.bar.baz", &data).unwrap(), json!(42));
    }

    #[test]
    fn search_reports_syntax_errors() {
        assert!(search("foo[", &json!(null)).is_err());
    }

    #[test]
    fn program_reusable_across_inputs() {
        let program = compile("a.b").unwrap();
        assert_eq!(*program.search(Rc::new(json!({"a": {"b": 1}}))).unwrap(), json!(1));
        assert_eq!(*program.search(Rc::new(json!({"a": {"b": 2}}))).unwrap(), json!(2));
    }

    #[test]
    fn program_evaluates_against_custom_registry() {
        let program = compile("length(`[1,2,3]`)").unwrap();
        let mut registry = FnRegistry::from_defaults();
        registry.deregister_function("length");
        assert!(program.search_with_registry(Rc::new(Value::Null), &registry).is_err());
    }

    #[test]
    fn expression_retains_source_text() {
        let expr = Expression::new("a.b").unwrap();
        assert_eq!(expr.as_str(), "a.b");
        assert_eq!(*expr.search(Rc::new(json!({"a": {"b": 7}}))).unwrap(), json!(7));
    }
}
