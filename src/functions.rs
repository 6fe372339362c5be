//! The built-in function registry: argument validation and the default set
//! of functions a compiled `Program` can `call`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Number, Value};

use crate::bytecode::Arg;
use crate::errors::RuntimeError;
use crate::value::{self, Rcvar};
use crate::vm::Context;

/// The type (or union of types) an argument position accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgumentType {
    Any,
    Null,
    String,
    Number,
    Boolean,
    Object,
    Array,
    ArrayString,
    ArrayNumber,
    Expref,
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgumentType::Any => "any",
            ArgumentType::Null => "null",
            ArgumentType::String => "string",
            ArgumentType::Number => "number",
            ArgumentType::Boolean => "boolean",
            ArgumentType::Object => "object",
            ArgumentType::Array => "array",
            ArgumentType::ArrayString => "array[string]",
            ArgumentType::ArrayNumber => "array[number]",
            ArgumentType::Expref => "expref",
        };
        write!(f, "{}", name)
    }
}

impl ArgumentType {
    fn accepts(&self, arg: &Arg) -> bool {
        match (self, arg) {
            (ArgumentType::Expref, Arg::Expr(_)) => true,
            (ArgumentType::Expref, Arg::Value(_)) => false,
            (_, Arg::Expr(_)) => false,
            (ArgumentType::Any, Arg::Value(_)) => true,
            (ArgumentType::Null, Arg::Value(v)) => v.is_null(),
            (ArgumentType::String, Arg::Value(v)) => v.is_string(),
            (ArgumentType::Number, Arg::Value(v)) => v.is_number(),
            (ArgumentType::Boolean, Arg::Value(v)) => v.is_boolean(),
            (ArgumentType::Object, Arg::Value(v)) => v.is_object(),
            (ArgumentType::Array, Arg::Value(v)) => v.is_array(),
            (ArgumentType::ArrayString, Arg::Value(v)) => {
                matches!(&**v, Value::Array(a) if a.iter().all(|e| e.is_string()))
            }
            (ArgumentType::ArrayNumber, Arg::Value(v)) => {
                matches!(&**v, Value::Array(a) if a.iter().all(|e| e.is_number()))
            }
        }
    }
}

/// Whether a type mismatch for a given argument position raises or is
/// silently substituted with `null`. The teacher's `Signature` always
/// raises; this crate's function contract (SPEC_FULL.md §4.3) allows
/// per-argument opt-out, used by functions like `not_null` and `merge`
/// whose variadic arguments are meant to tolerate odd shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnMismatch {
    Raise,
    Null,
}

/// One required or variadic argument position.
#[derive(Clone, Debug)]
pub struct ArgSpec {
    pub types: Vec<ArgumentType>,
    pub on_mismatch: OnMismatch,
}

/// Shorthand for a single-type, raise-on-mismatch argument, the common case.
pub fn arg(ty: ArgumentType) -> ArgSpec {
    ArgSpec { types: vec![ty], on_mismatch: OnMismatch::Raise }
}

/// Shorthand for a union-of-types argument (e.g. `max`'s `array[number] or
/// array[string]`).
pub fn arg_union(types: &[ArgumentType]) -> ArgSpec {
    ArgSpec { types: types.to_vec(), on_mismatch: OnMismatch::Raise }
}

/// Shorthand for an argument that's replaced with `null` rather than
/// raising when the type doesn't match.
pub fn arg_or_null(ty: ArgumentType) -> ArgSpec {
    ArgSpec { types: vec![ty], on_mismatch: OnMismatch::Null }
}

/// A function's arity and per-position type contract.
pub struct Signature {
    pub inputs: Vec<ArgSpec>,
    pub variadic: Option<ArgSpec>,
}

impl Signature {
    fn validate_arity(&self, argc: usize) -> Result<(), RuntimeError> {
        if argc < self.inputs.len() {
            return Err(RuntimeError::NotEnoughArguments { expected: self.inputs.len(), actual: argc });
        }
        if self.variadic.is_none() && argc > self.inputs.len() {
            return Err(RuntimeError::TooManyArguments { expected: self.inputs.len(), actual: argc });
        }
        Ok(())
    }

    fn spec_for(&self, position: usize) -> Option<&ArgSpec> {
        self.inputs.get(position).or(self.variadic.as_ref())
    }

    /// Validates arity and per-position types, substituting `null` for
    /// positions whose `on_mismatch` is `Null` rather than raising.
    fn validate(&self, args: &[Arg]) -> Result<Vec<Arg>, RuntimeError> {
        self.validate_arity(args.len())?;
        let mut out = Vec::with_capacity(args.len());
        for (i, a) in args.iter().enumerate() {
            let spec = self.spec_for(i).expect("arity already validated");
            if spec.types.iter().any(|t| t.accepts(a)) {
                out.push(a.clone());
            } else {
                match spec.on_mismatch {
                    OnMismatch::Null => out.push(Arg::Value(Rc::new(Value::Null))),
                    OnMismatch::Raise => {
                        let expected = spec
                            .types
                            .iter()
                            .map(|t| t.to_string())
                            .collect::<Vec<_>>()
                            .join(" or ");
                        return Err(RuntimeError::InvalidType {
                            expected,
                            actual: describe(a),
                            position: i,
                        });
                    }
                }
            }
        }
        Ok(out)
    }
}

fn describe(arg: &Arg) -> String {
    match arg {
        Arg::Value(v) => value::type_name(v).to_string(),
        Arg::Expr(_) => "expref".to_string(),
    }
}

/// A callable registered under a name in an `FnRegistry`.
pub trait Function {
    fn signature(&self) -> &Signature;
    fn call(&self, args: &[Arg], ctx: &Context) -> Result<Rcvar, RuntimeError>;
}

/// The set of functions a `Program`'s `call` instructions can dispatch to.
/// Kept separate from `Program` so callers can register custom functions
/// without recompiling the expressions that use them.
pub struct FnRegistry {
    functions: HashMap<String, Box<dyn Function>>,
}

impl FnRegistry {
    pub fn new() -> FnRegistry {
        FnRegistry { functions: HashMap::new() }
    }

    /// A registry pre-populated with every built-in function.
    pub fn from_defaults() -> FnRegistry {
        let mut registry = FnRegistry::new();
        registry.register_function("abs", Box::new(AbsFn));
        registry.register_function("avg", Box::new(AvgFn));
        registry.register_function("ceil", Box::new(CeilFn));
        registry.register_function("contains", Box::new(ContainsFn));
        registry.register_function("ends_with", Box::new(EndsWithFn));
        registry.register_function("floor", Box::new(FloorFn));
        registry.register_function("join", Box::new(JoinFn));
        registry.register_function("keys", Box::new(KeysFn));
        registry.register_function("length", Box::new(LengthFn));
        registry.register_function("map", Box::new(MapFn));
        registry.register_function("max", Box::new(MaxFn));
        registry.register_function("max_by", Box::new(MaxByFn));
        registry.register_function("merge", Box::new(MergeFn));
        registry.register_function("min", Box::new(MinFn));
        registry.register_function("min_by", Box::new(MinByFn));
        registry.register_function("not_null", Box::new(NotNullFn));
        registry.register_function("reverse", Box::new(ReverseFn));
        registry.register_function("sort", Box::new(SortFn));
        registry.register_function("sort_by", Box::new(SortByFn));
        registry.register_function("starts_with", Box::new(StartsWithFn));
        registry.register_function("sum", Box::new(SumFn));
        registry.register_function("to_array", Box::new(ToArrayFn));
        registry.register_function("to_number", Box::new(ToNumberFn));
        registry.register_function("to_string", Box::new(ToStringFn));
        registry.register_function("type", Box::new(TypeFn));
        registry.register_function("values", Box::new(ValuesFn));
        registry
    }

    pub fn register_function(&mut self, name: &str, f: Box<dyn Function>) {
        self.functions.insert(name.to_string(), f);
    }

    pub fn deregister_function(&mut self, name: &str) {
        self.functions.remove(name);
    }

    pub fn call(&self, name: &str, args: &[Arg], ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
        let coerced = f.signature().validate(args)?;
        f.call(&coerced, ctx)
    }
}

impl Default for FnRegistry {
    fn default() -> FnRegistry {
        FnRegistry::from_defaults()
    }
}

// ---- helpers shared by the builtins below ----

fn num(v: &Value) -> f64 {
    v.as_f64().expect("validated as Number by the signature")
}

fn str_of(v: &Value) -> &str {
    v.as_str().expect("validated as String by the signature")
}

fn arr_of(v: &Value) -> &Vec<Value> {
    v.as_array().expect("validated as Array by the signature")
}

fn value_at(args: &[Arg], i: usize) -> &Rcvar {
    args[i].as_value().expect("validated as Value by the signature")
}

fn expr_at(args: &[Arg], i: usize) -> &Rc<crate::bytecode::Program> {
    args[i].as_expr().expect("validated as Expref by the signature")
}

fn json_number(n: f64) -> Value {
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Orders two mapped keys for `sort_by`/`max_by`/`min_by`, requiring every
/// mapped value seen so far to be consistently all-number or all-string.
fn compare_mapped(a: &Value, b: &Value) -> Result<Ordering, RuntimeError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x
            .as_f64()
            .unwrap_or(f64::NAN)
            .partial_cmp(&y.as_f64().unwrap_or(f64::NAN))
            .unwrap_or(Ordering::Equal)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(RuntimeError::InvalidType {
            expected: "consistently number or string".to_string(),
            actual: format!("{}/{}", value::type_name(a), value::type_name(b)),
            position: 0,
        }),
    }
}

// ---- numeric ----

struct AbsFn;
impl Function for AbsFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::Number)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(json_number(num(value_at(args, 0)).abs())))
    }
}

struct CeilFn;
impl Function for CeilFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::Number)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(json_number(num(value_at(args, 0)).ceil())))
    }
}

struct FloorFn;
impl Function for FloorFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::Number)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(json_number(num(value_at(args, 0)).floor())))
    }
}

struct AvgFn;
impl Function for AvgFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::ArrayNumber)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let nums = arr_of(value_at(args, 0));
        if nums.is_empty() {
            return Ok(Rc::new(Value::Null));
        }
        let sum: f64 = nums.iter().map(num).sum();
        Ok(Rc::new(json_number(sum / nums.len() as f64)))
    }
}

struct SumFn;
impl Function for SumFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::ArrayNumber)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let sum: f64 = arr_of(value_at(args, 0)).iter().map(num).sum();
        Ok(Rc::new(json_number(sum)))
    }
}

// ---- string/array shared shape ----

struct LengthFn;
impl Function for LengthFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature {
                inputs: vec![arg_union(&[ArgumentType::String, ArgumentType::Array, ArgumentType::Object])],
                variadic: None,
            }
        })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let len = match &**value_at(args, 0) {
            Value::String(s) => s.chars().count(),
            Value::Array(a) => a.len(),
            Value::Object(o) => o.len(),
            _ => unreachable!("validated by the signature"),
        };
        Ok(Rc::new(Value::Number(Number::from(len as u64))))
    }
}

struct ReverseFn;
impl Function for ReverseFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature { inputs: vec![arg_union(&[ArgumentType::String, ArgumentType::Array])], variadic: None }
        })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(match &**value_at(args, 0) {
            Value::String(s) => Value::String(s.chars().rev().collect()),
            Value::Array(a) => Value::Array(a.iter().rev().cloned().collect()),
            _ => unreachable!("validated by the signature"),
        }))
    }
}

struct ContainsFn;
impl Function for ContainsFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature {
                inputs: vec![arg_union(&[ArgumentType::String, ArgumentType::Array]), arg(ArgumentType::Any)],
                variadic: None,
            }
        })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let haystack = value_at(args, 0);
        let needle = value_at(args, 1);
        let found = match &**haystack {
            Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
            Value::Array(a) => a.iter().any(|e| e == &***needle),
            _ => unreachable!("validated by the signature"),
        };
        Ok(Rc::new(Value::Bool(found)))
    }
}

struct StartsWithFn;
impl Function for StartsWithFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature { inputs: vec![arg(ArgumentType::String), arg(ArgumentType::String)], variadic: None }
        })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(Value::Bool(str_of(value_at(args, 0)).starts_with(str_of(value_at(args, 1))))))
    }
}

struct EndsWithFn;
impl Function for EndsWithFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature { inputs: vec![arg(ArgumentType::String), arg(ArgumentType::String)], variadic: None }
        })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(Value::Bool(str_of(value_at(args, 0)).ends_with(str_of(value_at(args, 1))))))
    }
}

struct JoinFn;
impl Function for JoinFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature { inputs: vec![arg(ArgumentType::String), arg(ArgumentType::ArrayString)], variadic: None }
        })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let glue = str_of(value_at(args, 0));
        let parts: Vec<&str> = arr_of(value_at(args, 1)).iter().map(|v| v.as_str().unwrap_or("")).collect();
        Ok(Rc::new(Value::String(parts.join(glue))))
    }
}

// ---- objects ----

struct KeysFn;
impl Function for KeysFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::Object)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let map = value_at(args, 0).as_object().expect("validated by the signature");
        Ok(Rc::new(Value::Array(map.keys().map(|k| Value::String(k.clone())).collect())))
    }
}

struct ValuesFn;
impl Function for ValuesFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::Object)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let map = value_at(args, 0).as_object().expect("validated by the signature");
        Ok(Rc::new(Value::Array(map.values().cloned().collect())))
    }
}

struct MergeFn;
impl Function for MergeFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![], variadic: Some(arg(ArgumentType::Object)) })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let mut out = Map::new();
        for a in args {
            if let Some(map) = value_at_ref(a).as_object() {
                for (k, v) in map {
                    out.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(Rc::new(Value::Object(out)))
    }
}

fn value_at_ref(arg: &Arg) -> &Rcvar {
    arg.as_value().expect("validated as Value by the signature")
}

struct NotNullFn;
impl Function for NotNullFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![], variadic: Some(arg(ArgumentType::Any)) })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        for a in args {
            let v = value_at_ref(a);
            if !v.is_null() {
                return Ok(v.clone());
            }
        }
        Ok(Rc::new(Value::Null))
    }
}

// ---- conversions ----

struct ToArrayFn;
impl Function for ToArrayFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::Any)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let v = value_at(args, 0);
        Ok(match &**v {
            Value::Array(_) => v.clone(),
            _ => Rc::new(Value::Array(vec![(**v).clone()])),
        })
    }
}

struct ToNumberFn;
impl Function for ToNumberFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::Any)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let v = value_at(args, 0);
        Ok(Rc::new(match &**v {
            Value::Number(_) => (**v).clone(),
            Value::String(s) => s.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null),
            _ => Value::Null,
        }))
    }
}

struct ToStringFn;
impl Function for ToStringFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::Any)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let v = value_at(args, 0);
        Ok(Rc::new(match &**v {
            Value::String(_) => (**v).clone(),
            other => Value::String(serde_json::to_string(other).unwrap_or_default()),
        }))
    }
}

struct TypeFn;
impl Function for TypeFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| Signature { inputs: vec![arg(ArgumentType::Any)], variadic: None })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(Value::String(value::type_name(value_at(args, 0)).to_string())))
    }
}

// ---- sorting / min / max ----

struct SortFn;
impl Function for SortFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature {
                inputs: vec![arg_union(&[ArgumentType::ArrayNumber, ArgumentType::ArrayString])],
                variadic: None,
            }
        })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let mut items = arr_of(value_at(args, 0)).clone();
        let mut err = None;
        items.sort_by(|a, b| match compare_mapped(a, b) {
            Ok(o) => o,
            Err(e) => {
                err.get_or_insert(e);
                Ordering::Equal
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
        Ok(Rc::new(Value::Array(items)))
    }
}

fn min_max(items: &[Value], want_max: bool) -> Result<Value, RuntimeError> {
    if items.is_empty() {
        return Ok(Value::Null);
    }
    let mut best = items[0].clone();
    for item in &items[1..] {
        let ord = compare_mapped(item, &best)?;
        if (want_max && ord.is_gt()) || (!want_max && ord.is_lt()) {
            best = item.clone();
        }
    }
    Ok(best)
}

struct MaxFn;
impl Function for MaxFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature {
                inputs: vec![arg_union(&[ArgumentType::ArrayNumber, ArgumentType::ArrayString])],
                variadic: None,
            }
        })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(min_max(arr_of(value_at(args, 0)), true)?))
    }
}

struct MinFn;
impl Function for MinFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature {
                inputs: vec![arg_union(&[ArgumentType::ArrayNumber, ArgumentType::ArrayString])],
                variadic: None,
            }
        })
    }
    fn call(&self, args: &[Arg], _ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(min_max(arr_of(value_at(args, 0)), false)?))
    }
}

struct SortByFn;
impl Function for SortByFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature { inputs: vec![arg(ArgumentType::Array), arg(ArgumentType::Expref)], variadic: None }
        })
    }
    fn call(&self, args: &[Arg], ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let items = arr_of(value_at(args, 0));
        let expr = expr_at(args, 1);
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let key = ctx.interpret(expr, &Rc::new(item.clone()))?;
            keyed.push(((*key).clone(), item.clone()));
        }
        let mut err = None;
        keyed.sort_by(|(a, _), (b, _)| match compare_mapped(a, b) {
            Ok(o) => o,
            Err(e) => {
                err.get_or_insert(e.clone());
                Ordering::Equal
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
        Ok(Rc::new(Value::Array(keyed.into_iter().map(|(_, v)| v).collect())))
    }
}

fn by(items: &[Value], expr: &crate::bytecode::Program, ctx: &Context, want_max: bool) -> Result<Value, RuntimeError> {
    if items.is_empty() {
        return Ok(Value::Null);
    }
    let mut best = items[0].clone();
    let mut best_key = ctx.interpret(expr, &Rc::new(best.clone()))?;
    for item in &items[1..] {
        let key = ctx.interpret(expr, &Rc::new(item.clone()))?;
        let ord = compare_mapped(&key, &best_key)?;
        if (want_max && ord.is_gt()) || (!want_max && ord.is_lt()) {
            best = item.clone();
            best_key = key;
        }
    }
    Ok(best)
}

struct MaxByFn;
impl Function for MaxByFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature { inputs: vec![arg(ArgumentType::Array), arg(ArgumentType::Expref)], variadic: None }
        })
    }
    fn call(&self, args: &[Arg], ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(by(arr_of(value_at(args, 0)), expr_at(args, 1), ctx, true)?))
    }
}

struct MinByFn;
impl Function for MinByFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature { inputs: vec![arg(ArgumentType::Array), arg(ArgumentType::Expref)], variadic: None }
        })
    }
    fn call(&self, args: &[Arg], ctx: &Context) -> Result<Rcvar, RuntimeError> {
        Ok(Rc::new(by(arr_of(value_at(args, 0)), expr_at(args, 1), ctx, false)?))
    }
}

struct MapFn;
impl Function for MapFn {
    fn signature(&self) -> &Signature {
        static SIG: std::sync::OnceLock<Signature> = std::sync::OnceLock::new();
        SIG.get_or_init(|| {
            Signature { inputs: vec![arg(ArgumentType::Expref), arg(ArgumentType::Array)], variadic: None }
        })
    }
    fn call(&self, args: &[Arg], ctx: &Context) -> Result<Rcvar, RuntimeError> {
        let expr = expr_at(args, 0);
        let items = arr_of(value_at(args, 1));
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push((*ctx.interpret(expr, &Rc::new(item.clone()))?).clone());
        }
        Ok(Rc::new(Value::Array(out)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::compiler::compile;
    use serde_json::json;

    fn registry() -> FnRegistry {
        FnRegistry::from_defaults()
    }

    fn call(name: &str, args: Vec<Value>) -> Value {
        let registry = registry();
        let ctx = Context::new(&registry);
        let args: Vec<Arg> = args.into_iter().map(|v| Arg::Value(Rc::new(v))).collect();
        (*registry.call(name, &args, &ctx).unwrap()).clone()
    }

    #[test]
    fn length_of_string_counts_chars() {
        assert_eq!(call("length", vec![json!("abc")]), json!(3));
    }

    #[test]
    fn unknown_function_errors() {
        let registry = registry();
        let ctx = Context::new(&registry);
        assert!(registry.call("nope", &[], &ctx).is_err());
    }

    #[test]
    fn type_mismatch_raises() {
        let registry = registry();
        let ctx = Context::new(&registry);
        let args = vec![Arg::Value(Rc::new(json!("x")))];
        assert!(registry.call("abs", &args, &ctx).is_err());
    }

    #[test]
    fn avg_of_empty_is_null() {
        assert_eq!(call("avg", vec![json!([])]), Value::Null);
    }

    #[test]
    fn sort_by_expref() {
        let program = compile("&age").unwrap();
        let registry = registry();
        let ctx = Context::new(&registry);
        let items = json!([{"age": 3}, {"age": 1}, {"age": 2}]);
        let args = vec![Arg::Value(Rc::new(items)), Arg::Expr(Rc::new(program))];
        let result = registry.call("sort_by", &args, &ctx).unwrap();
        assert_eq!(*result, json!([{"age": 1}, {"age": 2}, {"age": 3}]));
    }

    #[test]
    fn map_applies_expref_to_each_element() {
        let program = compile("&foo").unwrap();
        let registry = registry();
        let ctx = Context::new(&registry);
        let items = json!([{"foo": 1}, {"foo": 2}]);
        let args = vec![Arg::Expr(Rc::new(program)), Arg::Value(Rc::new(items))];
        let result = registry.call("map", &args, &ctx).unwrap();
        assert_eq!(*result, json!([1, 2]));
    }

    #[test]
    fn not_null_skips_nulls() {
        assert_eq!(call("not_null", vec![json!(null), json!(null), json!(5)]), json!(5));
    }

    #[test]
    fn merge_overrides_left_to_right() {
        assert_eq!(
            call("merge", vec![json!({"a": 1, "b": 1}), json!({"b": 2})]),
            json!({"a": 1, "b": 2})
        );
    }
}
