//! Compiles a token stream into a flat bytecode `Program`.
//!
//! This is a Pratt (top-down operator precedence) parser that emits
//! instructions directly instead of building an intermediate AST: each
//! `nud`/`led` handler appends to the instruction buffer and may recurse
//! into `parse_expression` for its operands.

use std::rc::Rc;

use log::{debug, trace};

use crate::bytecode::{ContainerKind, Instruction, Program};
use crate::errors::{JmespathError, SyntaxError};
use crate::lexer::{tokenize, Token, TokenKind};

/// The container a nested sub-expression is parsed inside of. Affects
/// bracket disambiguation (an object can't be indexed by number) and which
/// multi-select keys/indices are legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Context {
    None,
    Object,
    Array,
}

/// One frame per delimited sub-expression. `pushed` records whether the
/// sub-expression actually touched `current` (a field/index/projection/
/// etc.), which decides whether a speculative snapshot ahead of it is kept
/// or elided.
struct ParseState {
    context: Context,
    pushed: bool,
}

impl ParseState {
    fn new(context: Context) -> ParseState {
        ParseState { context, pushed: false }
    }
}

/// Sub-expressions bounded by a delimiter (function args, multi-select
/// elements, filter predicates) are parsed loosely enough to admit `||`
/// but not a bare top-level `|`.
const RBP_SUBEXPR: usize = 1;
/// A plain postfix/operand position: no `||` or `|` may leak through.
const RBP_TIGHT: usize = 0;
/// The loosest binding power, used only for the top-level program, where
/// both `||` and `|` are legal.
const RBP_TOP: usize = 2;

pub fn compile(text: &str) -> Result<Program, JmespathError> {
    debug!("compiling expression: {}", text);
    let tokens = tokenize(text)?;
    let mut compiler = Compiler::new(tokens, text);
    let program = compiler.compile_program()?;
    trace!("compiled '{}' into {} instructions", text, program.len());
    Ok(program)
}

struct Compiler<'a> {
    tokens: Vec<Token>,
    pos: usize,
    instructions: Vec<Instruction>,
    frames: Vec<ParseState>,
    source: &'a str,
}

impl<'a> Compiler<'a> {
    fn new(tokens: Vec<Token>, source: &'a str) -> Compiler<'a> {
        Compiler {
            tokens,
            pos: 0,
            instructions: Vec::new(),
            frames: Vec::new(),
            source,
        }
    }

    fn compile_program(&mut self) -> Result<Program, JmespathError> {
        if self.at_eof() {
            return Err(self.err("empty expression"));
        }
        self.frames.push(ParseState::new(Context::None));
        self.parse_expression(RBP_TOP)?;
        if !self.at_eof() {
            return Err(self.err("trailing tokens after expression"));
        }
        let pushed = self.frames.pop().expect("program frame present").pushed;
        if !pushed {
            // The whole program was a bare literal or expref, which deposits
            // itself on the value stack rather than touching `current`.
            self.emit(Instruction::Adopt);
        }
        self.emit(Instruction::Stop);
        Ok(Program {
            instructions: std::mem::take(&mut self.instructions),
            source: self.source.to_string(),
        })
    }

    // ---- token stream helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn at_eof(&self) -> bool {
        self.peek_kind() == &TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn err(&self, msg: &str) -> JmespathError {
        let token = self.peek();
        SyntaxError::new(self.source, token.position, &format!("{} (found {})", msg, token.kind), "").into()
    }

    fn err_at(&self, token: &Token, msg: &str) -> JmespathError {
        SyntaxError::new(self.source, token.position, &format!("{} (found {})", msg, token.kind), "").into()
    }

    // ---- instruction buffer helpers ----

    fn emit(&mut self, instr: Instruction) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    fn here(&self) -> usize {
        self.instructions.len()
    }

    fn patch(&mut self, idx: usize, target: usize) {
        match &mut self.instructions[idx] {
            Instruction::Each(t, _) | Instruction::JumpIfFalse(t) => *t = target,
            other => panic!("attempted to patch non-jump instruction {:?}", other),
        }
    }

    fn mark_pushed(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pushed = true;
        }
    }

    fn context(&self) -> Context {
        self.frames.last().map(|f| f.context).unwrap_or(Context::None)
    }

    /// Parses one operand that must end up as a value on the VM's value
    /// stack (a comparison operand, a multi-select element, a function
    /// argument). Saves `current`, parses the operand, then deposits its
    /// result on the value stack and restores `current` to the saved base
    /// so later sibling operands see the same starting point. If the
    /// operand never touched `current` (a bare literal or expref, which
    /// deposit themselves directly) the save/restore pair is elided.
    fn parse_operand(&mut self, context: Context, rbp: usize) -> Result<(), JmespathError> {
        let save_idx = self.emit(Instruction::SaveCurrent);
        self.frames.push(ParseState::new(context));
        self.parse_expression(rbp)?;
        let pushed = self.frames.pop().expect("operand frame present").pushed;
        if pushed {
            self.emit(Instruction::Commit);
            self.emit(Instruction::RestoreCurrent);
        } else {
            self.instructions[save_idx] = Instruction::Nop;
        }
        Ok(())
    }

    // ---- Pratt loop ----

    fn parse_expression(&mut self, rbp: usize) -> Result<(), JmespathError> {
        let token = self.advance();
        self.nud(token)?;
        loop {
            let kind = self.peek_kind().clone();
            if !is_led_token(&kind) {
                break;
            }
            if self.peek().lbp() > rbp {
                break;
            }
            let token = self.advance();
            self.led(token)?;
        }
        Ok(())
    }

    fn nud(&mut self, token: Token) -> Result<(), JmespathError> {
        match token.kind {
            TokenKind::Identifier(name) => {
                self.emit(Instruction::Field(name));
                self.mark_pushed();
                self.expect_after_identifier()?;
            }
            TokenKind::QuotedIdentifier(name) => {
                self.emit(Instruction::Field(name));
                self.mark_pushed();
            }
            TokenKind::Literal(value) => {
                self.emit(Instruction::Push(value));
            }
            TokenKind::Number(n) => {
                self.emit(Instruction::Index(n));
                self.mark_pushed();
            }
            TokenKind::At => {
                // Identity: `current` already holds the right value.
                self.mark_pushed();
            }
            TokenKind::Not => {
                self.parse_operand(self.context(), RBP_TIGHT)?;
                self.emit(Instruction::Negate);
                self.mark_pushed();
            }
            TokenKind::Ampersand => {
                let sub = self.compile_expref()?;
                self.emit(Instruction::Expref(Rc::new(sub)));
            }
            TokenKind::Function(name) => {
                self.compile_call(name)?;
                self.mark_pushed();
            }
            TokenKind::Lbracket => {
                self.compile_lbracket()?;
            }
            TokenKind::Lbrace => {
                self.compile_lbrace()?;
            }
            TokenKind::Filter => {
                self.compile_filter()?;
            }
            TokenKind::Flatten => {
                self.compile_merge()?;
            }
            TokenKind::Star => {
                self.compile_projection(ContainerKind::Object)?;
            }
            TokenKind::Eof => {}
            other => return Err(self.err_at(&token, &format!("unexpected token {:?}", other))),
        }
        Ok(())
    }

    fn led(&mut self, token: Token) -> Result<(), JmespathError> {
        match token.kind {
            TokenKind::Dot => self.compile_dot()?,
            TokenKind::Lbracket => self.compile_lbracket()?,
            TokenKind::Lbrace => self.compile_lbrace()?,
            TokenKind::Filter => self.compile_filter()?,
            TokenKind::Flatten => self.compile_merge()?,
            TokenKind::Star => self.compile_projection(ContainerKind::Object)?,
            TokenKind::Or => self.compile_or()?,
            TokenKind::Pipe => {
                // `current` already holds the left-hand result; the
                // right-hand side parses directly from it.
                self.parse_expression(RBP_TOP)?;
            }
            TokenKind::Eq => self.compile_comparison(Instruction::Eq)?,
            TokenKind::Ne => self.compile_comparison(Instruction::Ne)?,
            TokenKind::Gt => self.compile_comparison(Instruction::Gt)?,
            TokenKind::Gte => self.compile_comparison(Instruction::Gte)?,
            TokenKind::Lt => self.compile_comparison(Instruction::Lt)?,
            TokenKind::Lte => self.compile_comparison(Instruction::Lte)?,
            TokenKind::And => self.compile_comparison(Instruction::And)?,
            other => return Err(self.err_at(&token, &format!("unexpected infix token {:?}", other))),
        }
        Ok(())
    }

    fn expect_after_identifier(&self) -> Result<(), JmespathError> {
        use TokenKind::*;
        match self.peek_kind() {
            Flatten | Lbrace | Lbracket | Rbrace | Rbracket | Comma | Eof | Dot | Or | And | Not
            | Eq | Ne | Gt | Gte | Lt | Lte | Rparen | Pipe | Filter | Colon => Ok(()),
            _ => Err(self.err("unexpected token after identifier")),
        }
    }

    // ---- dot ----

    fn compile_dot(&mut self) -> Result<(), JmespathError> {
        use TokenKind::*;
        match self.peek_kind() {
            Identifier(_) | Number(_) | Star | Lbrace | Lbracket | Filter => {}
            other => return Err(self.err(&format!("expected expression after '.', found {:?}", other))),
        }
        self.frames.push(ParseState::new(Context::Object));
        self.parse_expression(RBP_TIGHT)?;
        let pushed = self.frames.pop().expect("dot frame present").pushed;
        if pushed {
            self.mark_pushed();
        }
        Ok(())
    }

    // ---- or ----

    /// `a || b`: short-circuit on a non-null `a`. `current` already holds
    /// `a` by the time this runs; if it's null, fall through into parsing
    /// `b` (which replaces `current` or, for a bare literal/expref
    /// fallback, is adopted from the value stack); otherwise jump past it,
    /// keeping `a`.
    fn compile_or(&mut self) -> Result<(), JmespathError> {
        self.emit(Instruction::IsNull);
        let patch_idx = self.emit(Instruction::JumpIfFalse(0));
        self.frames.push(ParseState::new(self.context()));
        self.parse_expression(RBP_SUBEXPR)?;
        let pushed = self.frames.pop().expect("or frame present").pushed;
        if !pushed {
            self.emit(Instruction::Adopt);
        }
        let target = self.here();
        self.patch(patch_idx, target);
        self.mark_pushed();
        Ok(())
    }

    // ---- comparisons / && ----

    fn compile_comparison(&mut self, op: Instruction) -> Result<(), JmespathError> {
        self.parse_operand(self.context(), RBP_TIGHT)?;
        self.emit(op);
        self.mark_pushed();
        Ok(())
    }

    // ---- function calls ----

    fn compile_call(&mut self, name: String) -> Result<(), JmespathError> {
        self.advance(); // lparen
        let mut argc = 0usize;
        while self.peek_kind() != &TokenKind::Rparen {
            self.parse_operand(self.context(), RBP_SUBEXPR)?;
            argc += 1;
            if self.peek_kind() == &TokenKind::Comma {
                self.advance();
            } else if self.peek_kind() != &TokenKind::Rparen {
                return Err(self.err("expected ',' or ')' in function arguments"));
            }
        }
        self.advance(); // rparen
        self.emit(Instruction::Call(name, argc));
        Ok(())
    }

    // ---- expression references ----

    fn compile_expref(&mut self) -> Result<Program, JmespathError> {
        let saved = std::mem::take(&mut self.instructions);
        self.frames.push(ParseState::new(self.context()));
        self.parse_expression(RBP_TIGHT)?;
        let pushed = self.frames.pop().expect("expref frame present").pushed;
        if !pushed {
            self.emit(Instruction::Adopt);
        }
        self.emit(Instruction::Stop);
        let sub_instructions = std::mem::replace(&mut self.instructions, saved);
        Ok(Program {
            instructions: sub_instructions,
            source: self.source.to_string(),
        })
    }

    // ---- projections ----

    /// Parses the body applied to each element of a projection or the
    /// continuation of a flatten (`[]`). A leading `.` behaves exactly as
    /// it does anywhere else; a bracket/brace/filter/flatten/star can
    /// chain directly without one (mirroring how those tokens chain after
    /// any other index expression); anything else means the projected
    /// value is the element itself.
    fn parse_projection_body(&mut self) -> Result<(), JmespathError> {
        use TokenKind::*;
        match self.peek_kind().clone() {
            Dot => {
                self.advance();
                match self.peek_kind() {
                    Identifier(_) | Number(_) | Star | Lbrace | Lbracket | Filter => {}
                    other => {
                        return Err(self.err(&format!("expected expression after '.', found {:?}", other)))
                    }
                }
                self.parse_expression(RBP_TIGHT)?;
            }
            Lbracket | Lbrace | Filter | Flatten | Star => {
                self.parse_expression(RBP_TIGHT)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Emits `each(kind, body_end)` followed by the projection's body,
    /// back-patching `body_end`. The VM runs the body once per element
    /// eagerly (see `vm.rs`); there is no bytecode-level loop to close.
    fn compile_projection(&mut self, kind: ContainerKind) -> Result<(), JmespathError> {
        let each_idx = self.emit(Instruction::Each(0, kind));
        self.frames.push(ParseState::new(Context::Array));
        self.parse_projection_body()?;
        self.frames.pop();
        let after = self.here();
        self.patch(each_idx, after);
        self.mark_pushed();
        Ok(())
    }

    // ---- brackets ----

    fn compile_lbracket(&mut self) -> Result<(), JmespathError> {
        use TokenKind::*;
        let ctx = self.context();
        match self.peek_kind().clone() {
            Number(_) | Colon => {
                if ctx == Context::Object {
                    return Err(self.err("cannot index an object by number"));
                }
                self.compile_array_index()?;
            }
            Star if ctx != Context::Object => {
                self.advance();
                if self.peek_kind() != &TokenKind::Rbracket {
                    return Err(self.err("expected ']' after '[*'"));
                }
                self.advance();
                self.compile_projection(ContainerKind::Array)?;
            }
            _ => {
                self.compile_multi_select_list()?;
            }
        }
        Ok(())
    }

    fn compile_array_index(&mut self) -> Result<(), JmespathError> {
        let mut parts: Vec<Option<i32>> = Vec::new();
        let mut colons = 0usize;
        let mut current: Option<i32> = None;
        loop {
            match self.peek_kind().clone() {
                TokenKind::Number(n) => {
                    self.advance();
                    current = Some(n);
                }
                TokenKind::Colon => {
                    self.advance();
                    colons += 1;
                    parts.push(current.take());
                    if colons > 2 {
                        return Err(self.err("invalid slice expression"));
                    }
                }
                TokenKind::Rbracket => {
                    self.advance();
                    break;
                }
                _ => return Err(self.err("expected number, ':' or ']'")),
            }
        }
        if colons == 0 {
            let n = current.ok_or_else(|| self.err("empty index expression"))?;
            self.emit(Instruction::Index(n));
        } else {
            parts.push(current.take());
            let start = parts.first().copied().flatten();
            let stop = parts.get(1).copied().flatten();
            let step = parts.get(2).copied().flatten();
            self.emit(Instruction::Slice(start, stop, step));
        }
        self.mark_pushed();
        Ok(())
    }

    fn compile_multi_select_list(&mut self) -> Result<(), JmespathError> {
        let patch_idx = self.prepare_multi_branch(serde_json::Value::Array(Vec::new()));
        loop {
            if self.peek_kind() == &TokenKind::Rbracket {
                break;
            }
            self.parse_operand(Context::Array, RBP_SUBEXPR)?;
            self.emit(Instruction::StoreKey(None));
            if self.peek_kind() == &TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        if self.peek_kind() != &TokenKind::Rbracket {
            return Err(self.err("expected ',' or ']' in multi-select list"));
        }
        self.advance();
        self.finish_multi_branch(patch_idx);
        self.mark_pushed();
        Ok(())
    }

    fn compile_lbrace(&mut self) -> Result<(), JmespathError> {
        let ctx = self.context();
        let patch_idx = self.prepare_multi_branch(serde_json::Value::Object(Default::default()));
        loop {
            if self.peek_kind() == &TokenKind::Rbrace {
                break;
            }
            let key = self.expect_key(ctx)?;
            if self.peek_kind() != &TokenKind::Colon {
                return Err(self.err("expected ':' after multi-select hash key"));
            }
            self.advance();
            self.parse_operand(ctx, RBP_SUBEXPR)?;
            self.emit(Instruction::StoreKey(Some(key)));
            if self.peek_kind() == &TokenKind::Comma {
                self.advance();
            } else {
                break;
            }
        }
        if self.peek_kind() != &TokenKind::Rbrace {
            return Err(self.err("expected ',' or '}' in multi-select hash"));
        }
        self.advance();
        self.finish_multi_branch(patch_idx);
        self.mark_pushed();
        Ok(())
    }

    fn expect_key(&mut self, ctx: Context) -> Result<String, JmespathError> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(name) => {
                if ctx == Context::Array {
                    return Err(self.err("identifier key not allowed inside an array context"));
                }
                self.advance();
                Ok(name)
            }
            TokenKind::QuotedIdentifier(name) => {
                self.advance();
                Ok(name)
            }
            TokenKind::Number(_) if ctx == Context::Object => {
                Err(self.err("number key not allowed inside an object context"))
            }
            _ => Err(self.err("expected a key")),
        }
    }

    /// Emits the null-guard shared by multi-select list/hash: if `current`
    /// is null the whole construct short-circuits to null; otherwise an
    /// empty container of the right shape is pushed for the upcoming
    /// `StoreKey`s to fold elements into.
    fn prepare_multi_branch(&mut self, empty: serde_json::Value) -> usize {
        self.emit(Instruction::IsArray); // "current is not null", see DESIGN.md (b)
        let patch_idx = self.emit(Instruction::JumpIfFalse(0));
        self.emit(Instruction::Push(empty));
        patch_idx
    }

    fn finish_multi_branch(&mut self, patch_idx: usize) {
        self.emit(Instruction::Adopt);
        let target = self.here();
        self.patch(patch_idx, target);
    }

    // ---- filter ----

    /// `[?predicate]transform`: emits `filter(predicate_end, body_end)`
    /// followed by the predicate then the transform, back-patching both
    /// targets. The VM evaluates both ranges once per element eagerly.
    fn compile_filter(&mut self) -> Result<(), JmespathError> {
        let filter_idx = self.emit(Instruction::Filter(0, 0));
        self.frames.push(ParseState::new(Context::Array));
        self.parse_expression(RBP_TIGHT)?;
        self.frames.pop();
        let predicate_end = self.here();
        if self.peek_kind() != &TokenKind::Rbracket {
            return Err(self.err("expected ']' after filter predicate"));
        }
        self.advance();
        self.frames.push(ParseState::new(Context::Array));
        self.parse_projection_body()?;
        self.frames.pop();
        let body_end = self.here();
        self.instructions[filter_idx] = Instruction::Filter(predicate_end, body_end);
        self.mark_pushed();
        Ok(())
    }

    // ---- merge ----

    /// `[]`: flattens one level of nesting. Only wraps the flattened array
    /// in a projection when something actually continues the expression
    /// (`foo[].bar`); a bare `foo[]` (or one immediately followed by `|`,
    /// `)`, a comparison, etc.) leaves the flattened array untouched rather
    /// than running it through a pass-through projection that would drop
    /// any literal `null` elements.
    fn compile_merge(&mut self) -> Result<(), JmespathError> {
        self.emit(Instruction::Merge);
        use TokenKind::*;
        if matches!(self.peek_kind(), Dot | Lbracket | Lbrace | Filter | Flatten | Star) {
            self.compile_projection(ContainerKind::Array)?;
        } else {
            self.mark_pushed();
        }
        Ok(())
    }
}

fn is_led_token(kind: &TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        Dot | Lbracket | Lbrace | Filter | Flatten | Star | Or | Pipe | Eq | Ne | Gt | Gte | Lt | Lte | And
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bytecode::Instruction::*;

    fn compiled(expr: &str) -> Vec<Instruction> {
        compile(expr).unwrap().instructions
    }

    #[test]
    fn compiles_dotted_path() {
        let instrs = compiled("a.b");
        assert_eq!(instrs, vec![Field("a".into()), Field("b".into()), Stop]);
    }

    #[test]
    fn compiles_identity() {
        assert_eq!(compiled("@"), vec![Stop]);
    }

    #[test]
    fn compiles_bare_literal() {
        assert_eq!(compiled("`1`"), vec![Push(serde_json::json!(1)), Adopt, Stop]);
    }

    #[test]
    fn compiles_index() {
        let instrs = compiled("a[0]");
        assert_eq!(instrs, vec![Field("a".into()), Index(0), Stop]);
    }

    #[test]
    fn compiles_slice() {
        let instrs = compiled("a[1:]");
        assert_eq!(instrs, vec![Field("a".into()), Slice(Some(1), None, None), Stop]);
    }

    #[test]
    fn compiles_star_projection() {
        let instrs = compiled("foo[*].bar");
        match instrs.as_slice() {
            [Field(f), Each(patch, ContainerKind::Array), Field(b), Stop] if f == "foo" && b == "bar" => {
                assert_eq!(*patch, 3);
            }
            other => panic!("unexpected instructions: {:?}", other),
        }
    }

    #[test]
    fn compiles_bare_star_as_object_projection() {
        let instrs = compiled("*");
        match instrs.as_slice() {
            [Each(patch, ContainerKind::Object), Stop] => assert_eq!(*patch, 1),
            other => panic!("unexpected instructions: {:?}", other),
        }
    }

    #[test]
    fn compiles_or_fallback() {
        let instrs = compiled("a || b");
        assert_eq!(
            instrs,
            vec![
                Field("a".into()),
                IsNull,
                JumpIfFalse(4),
                Field("b".into()),
                Stop,
            ]
        );
    }

    #[test]
    fn compiles_flatten_without_trailing_projection() {
        let instrs = compiled("foo[]");
        assert_eq!(instrs, vec![Field("foo".into()), Merge, Stop]);
    }

    #[test]
    fn compiles_flatten_with_trailing_projection() {
        let instrs = compiled("foo[].bar");
        match instrs.as_slice() {
            [Field(f), Merge, Each(_, ContainerKind::Array), Field(b), Stop] if f == "foo" && b == "bar" => {}
            other => panic!("unexpected instructions: {:?}", other),
        }
    }

    #[test]
    fn rejects_object_index_by_number() {
        assert!(compile("{a: `1`}[0]").is_err());
    }

    #[test]
    fn rejects_empty_expression() {
        assert!(compile("").is_err());
    }

    #[test]
    fn compiles_multi_select_hash() {
        let instrs = compiled("{a: b}");
        assert!(matches!(instrs[0], IsArray));
        assert!(instrs.iter().any(|i| matches!(i, StoreKey(Some(k)) if k == "a")));
    }

    #[test]
    fn compiles_multi_select_list() {
        let instrs = compiled("[a, b]");
        assert!(matches!(instrs[0], IsArray));
        assert_eq!(instrs.iter().filter(|i| matches!(i, StoreKey(None))).count(), 2);
    }

    #[test]
    fn compiles_filter() {
        let instrs = compiled("foo[?bar>`1`].baz");
        match instrs.first() {
            Some(Filter(_, _)) => {}
            other => panic!("expected a leading filter instruction, got {:?}", other),
        }
        assert!(instrs.iter().any(|i| matches!(i, Field(k) if k == "bar")));
        assert!(instrs.iter().any(|i| matches!(i, Field(k) if k == "baz")));
        assert!(instrs.iter().any(|i| matches!(i, Gt)));
    }

    #[test]
    fn compiles_negation() {
        let instrs = compiled("!foo");
        assert_eq!(instrs, vec![SaveCurrent, Field("foo".into()), Commit, RestoreCurrent, Negate, Stop]);
    }

    #[test]
    fn compiles_bare_expref() {
        // A bare top-level `&expr` has no `current`-touching operation to
        // mark as pushed, so the program falls back to adopting whatever
        // landed on the value stack (see `compile_program`).
        let instrs = compiled("&foo.bar");
        match instrs.as_slice() {
            [Expref(_), Adopt, Stop] => {}
            other => panic!("unexpected instructions: {:?}", other),
        }
    }
}
