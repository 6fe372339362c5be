//! The stack machine that interprets a compiled `Program` against a value.
//!
//! Execution keeps three pieces of state: a `current` register holding the
//! value presently in focus, a `value_stack` of operands waiting to be
//! consumed by a comparison/multi-select/function call, and a `mark_stack`
//! of saved `current` snapshots so sibling operands can restart from the
//! same base. `each`/`filter` are compound instructions: rather than the
//! bytecode looping back on itself, the VM runs their body instruction
//! range once per element directly, in Rust, collecting results.

use std::rc::Rc;

use log::trace;
use serde_json::Value;

use crate::bytecode::{Arg, ContainerKind, Instruction, Program};
use crate::errors::{JmespathError, RuntimeError};
use crate::functions::FnRegistry;
use crate::value::{self, Rcvar};

/// Threaded through function evaluation so a higher-order function (`map`,
/// `sort_by`, `max_by`, `min_by`) can re-enter the VM to apply a stored
/// expref `Program` to one of its own elements.
pub struct Context<'a> {
    pub registry: &'a FnRegistry,
}

impl<'a> Context<'a> {
    pub fn new(registry: &'a FnRegistry) -> Context<'a> {
        Context { registry }
    }

    /// Applies a compiled expref to `value`, returning its result.
    pub fn interpret(&self, expr: &Program, value: &Rcvar) -> Result<Rcvar, RuntimeError> {
        let mut vm = Vm::new(expr, self.registry, value.clone());
        vm.run(0, expr.len()).map_err(|e| match e {
            JmespathError::Runtime(r) => r,
            JmespathError::Syntax(_) => {
                unreachable!("expref programs are already compiled")
            }
        })?;
        Ok(vm.current)
    }
}

/// Runs `program` against `input` using `registry` for function calls.
pub fn evaluate(program: &Program, input: Rcvar, registry: &FnRegistry) -> Result<Rcvar, JmespathError> {
    let mut vm = Vm::new(program, registry, input);
    vm.run(0, program.len())?;
    Ok(vm.current)
}

struct Vm<'a> {
    program: &'a Program,
    registry: &'a FnRegistry,
    current: Rcvar,
    value_stack: Vec<Arg>,
    mark_stack: Vec<Rcvar>,
}

fn null() -> Rcvar {
    Rc::new(Value::Null)
}

impl<'a> Vm<'a> {
    fn new(program: &'a Program, registry: &'a FnRegistry, input: Rcvar) -> Vm<'a> {
        Vm {
            program,
            registry,
            current: input,
            value_stack: Vec::new(),
            mark_stack: Vec::new(),
        }
    }

    fn pop_value(&mut self) -> Result<Rcvar, JmespathError> {
        match self.value_stack.pop() {
            Some(Arg::Value(v)) => Ok(v),
            Some(Arg::Expr(_)) => Ok(null()),
            None => Ok(null()),
        }
    }

    fn pop_arg(&mut self) -> Result<Arg, JmespathError> {
        Ok(self.value_stack.pop().unwrap_or_else(|| Arg::Value(null())))
    }

    fn pop_bool(&mut self) -> Result<bool, JmespathError> {
        let value = self.pop_value()?;
        Ok(matches!(&*value, Value::Bool(true)))
    }

    fn push_bool(&mut self, b: bool) {
        self.value_stack.push(Arg::Value(Rc::new(Value::Bool(b))));
    }

    /// Executes instructions `[start, stop)` against the current VM state.
    fn run(&mut self, start: usize, stop: usize) -> Result<(), JmespathError> {
        let mut ip = start;
        while ip < stop {
            match &self.program.instructions[ip] {
                Instruction::Stop => return Ok(()),
                Instruction::Nop => {}
                Instruction::SaveCurrent => self.mark_stack.push(self.current.clone()),
                Instruction::RestoreCurrent => {
                    self.current = self.mark_stack.pop().unwrap_or_else(null);
                }
                Instruction::Commit => self.value_stack.push(Arg::Value(self.current.clone())),
                Instruction::Adopt => self.current = self.pop_value()?,
                Instruction::Pop => {
                    self.value_stack.pop();
                }
                Instruction::Push(v) => self.value_stack.push(Arg::Value(Rc::new(v.clone()))),
                Instruction::Field(name) => {
                    self.current = match &*self.current {
                        Value::Object(map) => map.get(name).cloned().map(Rc::new).unwrap_or_else(null),
                        _ => null(),
                    };
                }
                Instruction::Index(n) => {
                    self.current = match &*self.current {
                        Value::Array(arr) => value::array_index(arr, *n).map(Rc::new).unwrap_or_else(null),
                        _ => null(),
                    };
                }
                Instruction::Slice(start, stop, step) => {
                    self.current = match &*self.current {
                        Value::Array(arr) => Rc::new(Value::Array(value::slice(arr, *start, *stop, *step))),
                        _ => null(),
                    };
                }
                Instruction::StoreKey(key) => {
                    let elem = self.pop_value()?;
                    match self.value_stack.last_mut() {
                        Some(Arg::Value(container)) => {
                            let container = Rc::make_mut(container);
                            match (container, key) {
                                (Value::Array(arr), None) => arr.push((*elem).clone()),
                                (Value::Object(map), Some(k)) => {
                                    map.insert(k.clone(), (*elem).clone());
                                }
                                (other, _) => {
                                    panic!("StoreKey target {:?} doesn't match key shape", other)
                                }
                            }
                        }
                        _ => panic!("StoreKey with no container on the value stack"),
                    }
                }
                Instruction::Merge => {
                    if let Value::Array(outer) = &*self.current {
                        let mut flat = Vec::new();
                        for item in outer {
                            if let Value::Array(inner) = item {
                                flat.extend(inner.iter().cloned());
                            }
                        }
                        self.current = Rc::new(Value::Array(flat));
                    }
                }
                Instruction::Each(body_end, kind) => {
                    let (body_end, kind) = (*body_end, *kind);
                    self.exec_each(ip + 1, body_end, kind)?;
                    ip = body_end;
                    continue;
                }
                Instruction::Filter(predicate_end, body_end) => {
                    let (predicate_end, body_end) = (*predicate_end, *body_end);
                    self.exec_filter(ip + 1, predicate_end, body_end)?;
                    ip = body_end;
                    continue;
                }
                Instruction::JumpIfFalse(target) => {
                    let target = *target;
                    if !self.pop_bool()? {
                        ip = target;
                        continue;
                    }
                }
                Instruction::IsNull => {
                    let is_null = self.current.is_null();
                    self.push_bool(is_null);
                }
                Instruction::IsArray => {
                    let not_null = !self.current.is_null();
                    self.push_bool(not_null);
                }
                Instruction::Eq => {
                    let rhs = self.pop_value()?;
                    let eq = *self.current == *rhs;
                    self.current = Rc::new(Value::Bool(eq));
                }
                Instruction::Ne => {
                    let rhs = self.pop_value()?;
                    let ne = *self.current != *rhs;
                    self.current = Rc::new(Value::Bool(ne));
                }
                Instruction::Gt | Instruction::Gte | Instruction::Lt | Instruction::Lte => {
                    let op = self.program.instructions[ip].clone();
                    let rhs = self.pop_value()?;
                    self.current = compare(op, &self.current, &rhs);
                }
                Instruction::And => {
                    let rhs = self.pop_value()?;
                    if value::is_truthy(&self.current) {
                        self.current = rhs;
                    }
                }
                Instruction::Negate => {
                    let operand = self.pop_value()?;
                    self.current = Rc::new(Value::Bool(!value::is_truthy(&operand)));
                }
                Instruction::Expref(program) => {
                    self.value_stack.push(Arg::Expr(program.clone()));
                }
                Instruction::Call(name, argc) => {
                    let argc = *argc;
                    let mut args = Vec::with_capacity(argc);
                    for _ in 0..argc {
                        args.push(self.pop_arg()?);
                    }
                    args.reverse();
                    trace!("call: {}/{}", name, args.len());
                    let ctx = Context::new(self.registry);
                    self.current = self.registry.call(name, &args, &ctx)?;
                }
            }
            ip += 1;
        }
        Ok(())
    }

    /// Runs `each`: projects over `current`'s elements (per `kind`),
    /// running `[body_start, body_end)` once per element, keeping non-null
    /// results.
    fn exec_each(&mut self, body_start: usize, body_end: usize, kind: ContainerKind) -> Result<(), JmespathError> {
        let elements: Option<Vec<Value>> = match (&*self.current, kind) {
            (Value::Array(arr), ContainerKind::Array) => Some(arr.clone()),
            (Value::Object(map), ContainerKind::Object) => Some(map.values().cloned().collect()),
            _ => None,
        };
        match elements {
            None => self.current = null(),
            Some(elems) => {
                let mut results = Vec::with_capacity(elems.len());
                for elem in elems {
                    self.current = Rc::new(elem);
                    self.run(body_start, body_end)?;
                    if !self.current.is_null() {
                        results.push((*self.current).clone());
                    }
                }
                self.current = Rc::new(Value::Array(results));
            }
        }
        Ok(())
    }

    /// Runs `filter`: for each element of `current` (an array), evaluates
    /// the predicate range; if truthy, rebinds `current` to the element
    /// and runs the transform range, keeping non-null results.
    fn exec_filter(&mut self, predicate_start: usize, predicate_end: usize, body_end: usize) -> Result<(), JmespathError> {
        let elements: Option<Vec<Value>> = match &*self.current {
            Value::Array(arr) => Some(arr.clone()),
            _ => None,
        };
        match elements {
            None => self.current = null(),
            Some(elems) => {
                let mut results = Vec::with_capacity(elems.len());
                for elem in elems {
                    self.current = Rc::new(elem.clone());
                    self.run(predicate_start, predicate_end)?;
                    if value::is_truthy(&self.current) {
                        self.current = Rc::new(elem);
                        self.run(predicate_end, body_end)?;
                        if !self.current.is_null() {
                            results.push((*self.current).clone());
                        }
                    }
                }
                self.current = Rc::new(Value::Array(results));
            }
        }
        Ok(())
    }
}

fn compare(op: Instruction, lhs: &Value, rhs: &Value) -> Rcvar {
    match value::compare_ordered(lhs, rhs) {
        None => null(),
        Some(ordering) => {
            let result = match op {
                Instruction::Gt => ordering.is_gt(),
                Instruction::Gte => ordering.is_ge(),
                Instruction::Lt => ordering.is_lt(),
                Instruction::Lte => ordering.is_le(),
                _ => unreachable!("compare() only called for ordering instructions"),
            };
            Rc::new(Value::Bool(result))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::compile;
    use crate::functions::FnRegistry;
    use serde_json::json;

    fn run(expr: &str, input: Value) -> Value {
        let program = compile(expr).unwrap();
        let registry = FnRegistry::from_defaults();
        let result = evaluate(&program, Rc::new(input), &registry).unwrap();
        (*result).clone()
    }

    #[test]
    fn dotted_path() {
        assert_eq!(run("a.b.c", json!({"a": {"b": {"c": 1}}})), json!(1));
    }

    #[test]
    fn missing_field_is_null() {
        assert_eq!(run("a.b", json!({"a": {}})), Value::Null);
    }

    #[test]
    fn star_projection() {
        assert_eq!(
            run("foo[*].bar", json!({"foo": [{"bar": 1}, {"bar": 2}, {}]})),
            json!([1, 2])
        );
    }

    #[test]
    fn filter_expression() {
        assert_eq!(
            run("foo[?bar>`1`].baz", json!({"foo": [{"bar": 1, "baz": "a"}, {"bar": 2, "baz": "b"}]})),
            json!(["b"])
        );
    }

    #[test]
    fn multi_select_hash() {
        assert_eq!(
            run("{first: a, rest: b[1:]}", json!({"a": 1, "b": [1, 2, 3]})),
            json!({"first": 1, "rest": [2, 3]})
        );
    }

    #[test]
    fn multi_select_hash_on_null_is_null() {
        assert_eq!(run("foo.{a: b}", json!({})), Value::Null);
    }

    #[test]
    fn or_fallback() {
        assert_eq!(run("a || b", json!({"a": null, "b": 2})), json!(2));
        assert_eq!(run("a || b", json!({"a": 1, "b": 2})), json!(1));
    }

    #[test]
    fn length_function() {
        assert_eq!(run("length(items)", json!({"items": [1, 2, 3]})), json!(3));
    }

    #[test]
    fn flatten() {
        assert_eq!(run("foo[]", json!({"foo": [[1, 2], [3]]})), json!([1, 2, 3]));
    }

    #[test]
    fn identity_is_idempotent_for_scalars() {
        assert_eq!(run("@", json!(5)), json!(5));
    }

    #[test]
    fn comparison_on_mismatched_types_is_null() {
        assert_eq!(run("a > b", json!({"a": 1, "b": "x"})), Value::Null);
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(run("a == b", json!({"a": [1, 2], "b": [1, 2]})), json!(true));
    }

    #[test]
    fn negation() {
        assert_eq!(run("!foo", json!({"foo": []})), json!(true));
        assert_eq!(run("!foo", json!({"foo": [1]})), json!(false));
    }
}
