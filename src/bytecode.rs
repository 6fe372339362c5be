//! The bytecode instruction set and compiled program representation.

use std::rc::Rc;

use serde_json::Value;

use crate::value::Rcvar;

/// A container kind an `each`/`filter` loop iterates over. `Array` rejects
/// anything that isn't a JSON array; `Object` rejects anything that isn't a
/// JSON object and iterates its values. `[*]`, filters, and the continuation
/// of `[]` all use `Array`; a bare `*` or `.*` uses `Object`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Array,
    Object,
}

/// A single value passed to/from the VM's operand stack: either a plain
/// JSON value or a reference to a compiled sub-program produced by `&expr`,
/// consumed by higher-order functions like `sort_by`.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    Value(Rcvar),
    Expr(Rc<Program>),
}

impl Arg {
    pub fn as_value(&self) -> Option<&Rcvar> {
        match self {
            Arg::Value(v) => Some(v),
            Arg::Expr(_) => None,
        }
    }

    pub fn as_expr(&self) -> Option<&Rc<Program>> {
        match self {
            Arg::Expr(p) => Some(p),
            Arg::Value(_) => None,
        }
    }
}

/// A tagged bytecode instruction. Jump/range operands are indices into the
/// owning `Program`'s instruction vector.
///
/// `SaveCurrent`/`RestoreCurrent` and `Commit`/`Adopt` split what a single
/// literal "push_current"/"pop_current" pair can't express unambiguously:
/// snapshotting `current` so sibling operands (a comparison's two sides, a
/// multi-select's elements, a function call's arguments) all start from the
/// same base is a different operation from depositing one operand's
/// computed value for its consumer to pick back up. The former pair works
/// a `mark_stack`; the latter works a `value_stack`. See `DESIGN.md`.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Push `current` onto the mark stack.
    SaveCurrent,
    /// Pop the mark stack into `current`.
    RestoreCurrent,
    /// Push `current` onto the value stack.
    Commit,
    /// Pop the value stack into `current`.
    Adopt,
    /// Discard the top of the value stack.
    Pop,
    /// Push a literal value onto the value stack.
    Push(Value),
    /// Replace `current` with `current[name]`, or `null` if not an object.
    Field(String),
    /// Replace `current` with `current[n]` (negative counts from the end),
    /// or `null` if not an array.
    Index(i32),
    /// Replace `current` with a Python-semantics slice of it, or `null` if
    /// not an array.
    Slice(Option<i32>, Option<i32>, Option<i32>),
    /// Pop a value off the value stack and fold it into the container
    /// underneath: appended if `key` is `None`, inserted under `key`
    /// otherwise.
    StoreKey(Option<String>),
    /// Flatten one level of array-of-arrays nesting; non-array elements of
    /// the outer array are skipped; a non-array `current` passes through
    /// unchanged.
    Merge,
    /// Project over `current`'s elements per `kind`: run the instructions
    /// in `[ip+1, body_end)` once per element with `current` bound to it,
    /// collect the non-null results into a new array, and resume execution
    /// at `body_end`. `current` becomes `null` if it doesn't match `kind`.
    Each(usize, ContainerKind),
    /// Filter `current` (an array, else becomes `null`): for each element,
    /// run the predicate range `[ip+1, predicate_end)`; if truthy, rebind
    /// `current` to the element and run the transform range
    /// `[predicate_end, body_end)`, keeping non-null results. Resumes
    /// execution at `body_end`.
    Filter(usize, usize),
    /// Pop a boolean off the value stack; jump to `target` if it's false.
    JumpIfFalse(usize),
    /// Push `current.is_null()` onto the value stack.
    IsNull,
    /// Despite the name (kept from the opcode vocabulary this is grounded
    /// on), this pushes `!current.is_null()`. The multi-select guard only
    /// ever needs to exclude a null focus, not reject objects or scalars —
    /// see `DESIGN.md` Open Question (b).
    IsArray,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// `&&`: pop the right operand off the value stack; `current` becomes
    /// itself if falsy, otherwise the popped value.
    And,
    /// Unary `!`: pop the operand off the value stack; `current` becomes
    /// its truthiness negated.
    Negate,
    /// `&sub_expr`: push a reference to an independently compiled
    /// sub-program onto the value stack.
    Expref(Rc<Program>),
    /// Pop `argc` arguments off the value stack (in left-to-right order)
    /// and dispatch to the named function in the registry; the result
    /// becomes the new `current`.
    Call(String, usize),
    /// A no-op left behind by push-elision; keeps instruction indices
    /// stable across the gap.
    Nop,
    /// Halt; `current` holds the result.
    Stop,
}

/// A compiled, read-only, reusable bytecode program. Cheaply `Send + Sync`
/// shareable (behind an `Rc`/`Arc` at the call site) since evaluating it
/// never mutates the instructions themselves.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub source: String,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
