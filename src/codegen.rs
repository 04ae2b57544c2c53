//! AST to IR lowering.
//!
//! One handler per node variant. Every function lowers through a
//! single-exit convention: the entry block allocates a `__retval__` slot
//! and a dedicated `return` block is kept detached until the body is done;
//! `return` statements store into the slot and branch to that block. No
//! statement ever needs to place a real `ret` inside nested control flow,
//! which keeps terminator placement trivial.

use crate::ast::{Assign, CallExpr, FnDef, IfStmt, Node, OpChain, TypeDef, VarDecl, VarDef, WhileLoop};
use crate::diagnostic::{Diagnostic, ErrorKind};
use crate::ir::builder::Builder;
use crate::ir::{verify, BinOp, CastKind, FuncId, Module, Pred, Ty, ValueId};
use crate::symbol::{Binding, SymbolTable};
use crate::types::{Resolved, TypeEnv, LITERAL_WIDTH};

const RETVAL: &str = "__retval__";
const RETVAL_BB: &str = "__retval__BB";

/// How far an error unwinds: the enclosing function, or the whole module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Abort {
    Function,
    Module,
}

/// Whether a statement left the current block open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Terminated,
}

pub struct CodeGen<'m> {
    module: &'m mut Module,
    builder: Builder,
    types: TypeEnv,
    diagnostics: Vec<Diagnostic>,
}

impl<'m> CodeGen<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Self {
            module,
            builder: Builder::new(),
            types: TypeEnv::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Lower a full program. The returned diagnostics decide the outcome:
    /// the module is only usable if none of them is an error.
    pub fn lower_program(mut self, root: &Node) -> Vec<Diagnostic> {
        let Node::Program(children) = root else {
            self.error(ErrorKind::Parse, "expected a program root node");
            return self.diagnostics;
        };
        for child in children {
            let result = match child {
                Node::UserType(def) => {
                    self.lower_user_type(def);
                    Ok(())
                }
                Node::Function(def) => self.lower_function(def),
                _ => {
                    self.error(
                        ErrorKind::Parse,
                        "only functions and type declarations may appear at the top level",
                    );
                    Ok(())
                }
            };
            if result == Err(Abort::Module) {
                break;
            }
        }
        self.diagnostics
    }

    /// Register the type name and its ordered fields. No IR is emitted.
    fn lower_user_type(&mut self, def: &TypeDef) {
        if !self.types.define_user_type(&def.name, def.fields.clone()) {
            self.error(
                ErrorKind::DuplicateDefinition,
                format!("type '{}' is already defined", def.name),
            );
        }
    }

    fn lower_function(&mut self, def: &FnDef) -> Result<(), Abort> {
        let ret_width = self.int_type_of(&def.return_type, "a return type")?;

        let func = match self.module.get_function(&def.name) {
            Some(f) => f,
            None => {
                let mut params = Vec::new();
                for p in &def.params {
                    params.push(Ty::Int(self.int_type_of(&p.type_name, "a parameter type")?));
                }
                self.module
                    .add_function(&def.name, Ty::Int(ret_width), params, false)
            }
        };

        // Entry block, named after the function
        let entry = self.module.new_block(func, &def.name);
        self.module.attach_block(func, entry);
        self.builder.set_insert_point(func, entry);

        // Return slot, zero-initialized, plus the detached return block
        let mut scope = SymbolTable::new();
        let retval = self.builder.build_entry_alloca(self.module, ret_width, RETVAL);
        let zero = self.module.const_int(ret_width, 0);
        self.builder.build_store(self.module, zero, retval);
        scope.insert(RETVAL, Binding::Value(retval));
        let return_bb = self.module.new_block(func, "return");
        scope.insert(RETVAL_BB, Binding::Block(return_bb));

        // Function body scope: parameters are SSA argument values, not slots
        let mut body_scope = scope.child();
        for (index, p) in def.params.iter().enumerate() {
            let arg = self.module.arg(func, index);
            self.module.set_value_name(func, arg, &p.name);
            if !body_scope.insert(&p.name, Binding::Value(arg)) {
                self.error(
                    ErrorKind::DuplicateDefinition,
                    format!("definition of '{}' already exists", p.name),
                );
            }
        }

        let body_result = self.lower_body(&def.body, &mut body_scope, func);

        // Single exit: attach the return block and emit the only `ret`
        self.module.attach_block(func, return_bb);
        self.builder.set_insert_point(func, return_bb);
        let loaded = self.builder.build_load(self.module, retval, RETVAL);
        self.builder.build_ret(self.module, loaded);

        body_result?;

        if let Err(msg) = verify::verify_function(self.module, func) {
            self.diagnostics.push(
                Diagnostic::error(
                    ErrorKind::Verifier,
                    format!("IR verification failed for function '{}': {}", def.name, msg),
                )
                .with_note(self.module.dump_function(func)),
            );
            return Err(Abort::Module);
        }
        Ok(())
    }

    /// Lower a statement list, stopping at the first statement that
    /// terminates the current block. Anything after it is unreachable and
    /// dropped with a warning.
    fn lower_body(
        &mut self,
        stmts: &[Node],
        scope: &mut SymbolTable,
        func: FuncId,
    ) -> Result<Flow, Abort> {
        let mut iter = stmts.iter();
        for stmt in iter.by_ref() {
            if self.lower_stmt(stmt, scope, func)? == Flow::Terminated {
                if iter.next().is_some() {
                    self.warning("unreachable statements after a terminator are dropped");
                }
                return Ok(Flow::Terminated);
            }
        }
        Ok(Flow::Continue)
    }

    fn lower_stmt(
        &mut self,
        node: &Node,
        scope: &mut SymbolTable,
        func: FuncId,
    ) -> Result<Flow, Abort> {
        match node {
            // A lone integer literal parses as a statement but emits nothing
            Node::Ident(_) => Ok(Flow::Continue),
            Node::Definition(def) => {
                self.lower_definition(def, scope)?;
                Ok(Flow::Continue)
            }
            Node::Declaration(decl) => {
                self.lower_declaration(decl, scope)?;
                Ok(Flow::Continue)
            }
            Node::Assignment(assign) => {
                self.lower_assignment(assign, scope)?;
                Ok(Flow::Continue)
            }
            Node::Return(value) => self.lower_return(value, scope),
            Node::Call(call) => {
                self.lower_call(call, scope)?;
                Ok(Flow::Continue)
            }
            Node::If(stmt) => self.lower_if(stmt, scope, func),
            Node::While(stmt) => self.lower_while(stmt, scope, func),
            _ => {
                self.error(ErrorKind::Parse, "node is not valid in statement position");
                Err(Abort::Function)
            }
        }
    }

    /// `i32 a;` allocates storage; duplicate names are an error.
    fn lower_definition(&mut self, def: &VarDef, scope: &mut SymbolTable) -> Result<(), Abort> {
        let width = self.int_type_of(&def.type_name, "a variable type")?;
        if scope.lookup(&def.name).is_some() {
            self.error(
                ErrorKind::DuplicateDefinition,
                format!("definition of '{}' already exists", def.name),
            );
            return Ok(());
        }
        let slot = self.builder.build_entry_alloca(self.module, width, &def.name);
        scope.insert(&def.name, Binding::Value(slot));
        Ok(())
    }

    /// `i32 a = expr;` allocates in the entry block (so the slot is
    /// promotable), rebind the name, cast the initializer to the slot
    /// width, store.
    fn lower_declaration(&mut self, decl: &VarDecl, scope: &mut SymbolTable) -> Result<(), Abort> {
        let width = self.int_type_of(&decl.type_name, "a variable type")?;
        if scope.lookup(&decl.name).is_some() {
            self.warning(format!(
                "variable '{}' shadows an existing binding",
                decl.name
            ));
        }
        let slot = self.builder.build_entry_alloca(self.module, width, &decl.name);
        scope.bind_shadowing(&decl.name, Binding::Value(slot));
        if let Some(init) = &decl.init {
            let mut value = self.lower_expr(init, scope)?;
            value = self.cast_to_width(value, width);
            self.builder.build_store(self.module, value, slot);
        }
        Ok(())
    }

    fn lower_assignment(&mut self, assign: &Assign, scope: &mut SymbolTable) -> Result<(), Abort> {
        let mut value = self.lower_expr(&assign.rhs, scope)?;
        let Some(Binding::Value(slot)) = scope.lookup(&assign.name) else {
            return Err(self.unresolved(&assign.name, scope));
        };
        if self.module.ty(value).is_ptr() {
            value = self.builder.build_load(self.module, value, &assign.name);
        }
        self.builder.build_store(self.module, value, slot);
        Ok(())
    }

    /// `return expr;` stores into `__retval__` (cast to the return width)
    /// and branch to the return block. The branch terminates this block.
    fn lower_return(&mut self, value: &Node, scope: &mut SymbolTable) -> Result<Flow, Abort> {
        let Some(Binding::Value(retval)) = scope.lookup(RETVAL) else {
            return Err(self.unresolved(RETVAL, scope));
        };
        let Some(Binding::Block(return_bb)) = scope.lookup(RETVAL_BB) else {
            return Err(self.unresolved(RETVAL_BB, scope));
        };
        let mut v = self.lower_expr(value, scope)?;
        if let Some(width) = self.module.ty(retval).pointee_width() {
            v = self.cast_to_width(v, width);
        }
        self.builder.build_store(self.module, v, retval);
        self.builder.build_br(self.module, return_bb);
        Ok(Flow::Terminated)
    }

    fn lower_if(
        &mut self,
        stmt: &IfStmt,
        scope: &mut SymbolTable,
        func: FuncId,
    ) -> Result<Flow, Abort> {
        let cond = self.lower_chain(&stmt.cond, scope)?;

        let then_bb = self.module.new_block(func, "if.then");
        self.module.attach_block(func, then_bb);
        let else_bb = self.module.new_block(func, "if.else");
        let merge_bb = self.module.new_block(func, "if.end");

        self.builder.build_cond_br(self.module, cond, then_bb, else_bb);

        self.builder.set_insert_point(func, then_bb);
        let mut then_scope = scope.child();
        let then_flow = self.lower_body(&stmt.then_body, &mut then_scope, func)?;
        if then_flow == Flow::Continue {
            self.builder.build_br(self.module, merge_bb);
        }

        self.module.attach_block(func, else_bb);
        self.builder.set_insert_point(func, else_bb);
        let mut else_scope = scope.child();
        let else_flow = self.lower_body(&stmt.else_body, &mut else_scope, func)?;
        if else_flow == Flow::Continue {
            self.builder.build_br(self.module, merge_bb);
        }

        if then_flow == Flow::Terminated && else_flow == Flow::Terminated {
            // both branches returned: there is no merge
            return Ok(Flow::Terminated);
        }
        self.module.attach_block(func, merge_bb);
        self.builder.set_insert_point(func, merge_bb);
        Ok(Flow::Continue)
    }

    fn lower_while(
        &mut self,
        stmt: &WhileLoop,
        scope: &mut SymbolTable,
        func: FuncId,
    ) -> Result<Flow, Abort> {
        let body_bb = self.module.new_block(func, "while.body");
        let end_bb = self.module.new_block(func, "while.end");
        let cond_bb = self.module.new_block(func, "while.cond");
        self.module.attach_block(func, cond_bb);

        self.builder.build_br(self.module, cond_bb);
        self.builder.set_insert_point(func, cond_bb);
        let cond = self.lower_chain(&stmt.cond, scope)?;
        self.builder.build_cond_br(self.module, cond, body_bb, end_bb);

        self.module.attach_block(func, body_bb);
        self.builder.set_insert_point(func, body_bb);
        let mut body_scope = scope.child();
        if self.lower_body(&stmt.body, &mut body_scope, func)? == Flow::Continue {
            self.builder.build_br(self.module, cond_bb);
        }

        self.module.attach_block(func, end_bb);
        self.builder.set_insert_point(func, end_bb);
        Ok(Flow::Continue)
    }

    // --- Expressions ---

    fn lower_expr(&mut self, node: &Node, scope: &SymbolTable) -> Result<ValueId, Abort> {
        match node {
            Node::Ident(text) => self.lower_ident(text, scope),
            Node::BinaryOp(chain) => self.lower_chain(chain, scope),
            Node::Call(call) => self.lower_call(call, scope),
            _ => {
                self.error(ErrorKind::Parse, "node is not valid in expression position");
                Err(Abort::Function)
            }
        }
    }

    /// The address/value dichotomy lives here. A name bound to a stack slot
    /// loads; a name bound to an SSA argument passes through unchanged.
    /// Unbound digit text becomes a 32-bit constant; unbound quoted text
    /// becomes a global string pointer. Anything else is unresolved.
    fn lower_ident(&mut self, text: &str, scope: &SymbolTable) -> Result<ValueId, Abort> {
        if let Some(binding) = scope.lookup(text) {
            return match binding {
                Binding::Value(v) if self.module.ty(v).is_ptr() => {
                    Ok(self.builder.build_load(self.module, v, text))
                }
                Binding::Value(v) => Ok(v),
                Binding::Block(_) => Err(self.unresolved(text, scope)),
            };
        }
        if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
            let bits = text.parse::<u64>().unwrap_or(0);
            return Ok(self.module.const_int(LITERAL_WIDTH, bits));
        }
        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            let raw = &text[1..text.len() - 1];
            let unescaped = raw.replace("\\n", "\n");
            return Ok(self.module.add_global_str(&unescaped));
        }
        Err(self.unresolved(text, scope))
    }

    /// Fold the flat chain left to right. Before each step the operand is
    /// cast to the accumulator's width: the accumulator wins.
    fn lower_chain(&mut self, chain: &OpChain, scope: &SymbolTable) -> Result<ValueId, Abort> {
        let mut acc = self.lower_expr(&chain.lhs, scope)?;
        for op in &chain.ops {
            let mut rhs = self.lower_expr(&op.rhs, scope)?;
            if let Ty::Int(width) = self.module.ty(acc) {
                rhs = self.cast_to_width(rhs, width);
            }
            acc = self.lower_op(&op.op, acc, rhs)?;
        }
        Ok(acc)
    }

    fn lower_op(&mut self, op: &str, lhs: ValueId, rhs: ValueId) -> Result<ValueId, Abort> {
        let value = match op {
            "+" => self.builder.build_bin(self.module, BinOp::Add, lhs, rhs, "add"),
            "-" => self.builder.build_bin(self.module, BinOp::Sub, lhs, rhs, "sub"),
            "*" => self.builder.build_bin(self.module, BinOp::Mul, lhs, rhs, "mult"),
            "/" => self.builder.build_bin(self.module, BinOp::SDiv, lhs, rhs, "div"),
            "%" => self.builder.build_bin(self.module, BinOp::SRem, lhs, rhs, "rem"),
            "<" => self.builder.build_cmp(self.module, Pred::Slt, lhs, rhs, "cmp"),
            ">" => self.builder.build_cmp(self.module, Pred::Sgt, lhs, rhs, "cmp"),
            "<=" => self.builder.build_cmp(self.module, Pred::Sle, lhs, rhs, "cmp"),
            ">=" => self.builder.build_cmp(self.module, Pred::Sge, lhs, rhs, "cmp"),
            "==" => self.builder.build_cmp(self.module, Pred::Eq, lhs, rhs, "cmp"),
            "!=" => self.builder.build_cmp(self.module, Pred::Ne, lhs, rhs, "cmp"),
            // no short-circuit: both sides are always evaluated
            "&" | "&&" => self.builder.build_bin(self.module, BinOp::And, lhs, rhs, "and"),
            "||" => self.builder.build_bin(self.module, BinOp::Or, lhs, rhs, "or"),
            "<<" => self.builder.build_bin(self.module, BinOp::Shl, lhs, rhs, "shl"),
            ">>" => self.builder.build_bin(self.module, BinOp::LShr, lhs, rhs, "shr"),
            _ => {
                // a correct parser never produces an unknown operator
                self.error(
                    ErrorKind::UnsupportedOperator,
                    format!("unknown operator: '{}'", op),
                );
                return Err(Abort::Module);
            }
        };
        Ok(value)
    }

    /// Arguments lower first so a variadic printf signature can be derived
    /// from them before the callee is resolved.
    fn lower_call(&mut self, call: &CallExpr, scope: &SymbolTable) -> Result<ValueId, Abort> {
        let mut args = Vec::new();
        for arg in &call.args {
            args.push(self.lower_expr(arg, scope)?);
        }

        let callee = if call.callee == "printf" {
            self.printf_prototype(&args)
        } else {
            match self.module.get_function(&call.callee) {
                Some(f) => f,
                None => {
                    self.error(
                        ErrorKind::UnknownCallee,
                        format!(
                            "could not find function definition for '{}'",
                            call.callee
                        ),
                    );
                    return Err(Abort::Function);
                }
            }
        };

        let callee_f = self.module.function(callee);
        let param_count = callee_f.params.len();
        let is_variadic = callee_f.is_variadic;
        if param_count != args.len() {
            self.error(
                ErrorKind::ArityMismatch,
                format!(
                    "function call to '{}' expected {} arguments, but got {}",
                    call.callee,
                    param_count,
                    args.len()
                ),
            );
            return Err(Abort::Function);
        }
        if !is_variadic {
            let params = self.module.function(callee).params.clone();
            for (arg, param) in args.iter_mut().zip(params) {
                if let Ty::Int(width) = param {
                    *arg = self.cast_to_width(*arg, width);
                }
            }
        }
        Ok(self.builder.build_call(self.module, callee, args, &call.callee))
    }

    /// Per-call-site printf declarations. The signature is variadic with
    /// the actual argument types of this call; incompatible call sites get
    /// fresh mangled names (`printf`, `printf1`, `printf11`, ...).
    fn printf_prototype(&mut self, args: &[ValueId]) -> FuncId {
        let params: Vec<Ty> = args.iter().map(|&a| self.module.ty(a)).collect();
        let mut name = String::from("printf");
        loop {
            match self.module.get_function(&name) {
                Some(f) => {
                    let func = self.module.function(f);
                    if func.is_variadic && func.ret == Ty::Int(32) && func.params == params {
                        return f;
                    }
                    name.push('1');
                }
                None => {
                    return self.module.add_function(&name, Ty::Int(32), params, true);
                }
            }
        }
    }

    // --- Helpers ---

    /// The cast rule: zero-extend a narrower value, truncate a wider one.
    /// Only integer values participate.
    fn cast_to_width(&mut self, value: ValueId, width: u8) -> ValueId {
        match self.module.ty(value) {
            Ty::Int(w) if w < width => {
                self.builder
                    .build_cast(self.module, CastKind::ZExt, value, width, "conv")
            }
            Ty::Int(w) if w > width => {
                self.builder
                    .build_cast(self.module, CastKind::Trunc, value, width, "conv")
            }
            _ => value,
        }
    }

    fn int_type_of(&mut self, type_name: &str, position: &str) -> Result<u8, Abort> {
        match self.types.resolve(type_name) {
            Resolved::Int(width) => Ok(width),
            Resolved::User => {
                self.diagnostics.push(
                    Diagnostic::error(
                        ErrorKind::UnknownType,
                        format!("user-defined type '{}' cannot be used as {}", type_name, position),
                    )
                    .with_help("only the integer primitives i32 and i64 carry values"),
                );
                Err(Abort::Function)
            }
            Resolved::Unknown => {
                self.error(
                    ErrorKind::UnknownType,
                    format!("unknown type: '{}'", type_name),
                );
                Err(Abort::Function)
            }
        }
    }

    /// Record an unresolved-symbol error with a dump of the current table.
    fn unresolved(&mut self, name: &str, scope: &SymbolTable) -> Abort {
        let dump = if scope.is_empty() {
            "symbol table is empty".to_string()
        } else {
            format!(
                "symbol table ({} entries): {}",
                scope.len(),
                scope.names().join(", ")
            )
        };
        self.diagnostics.push(
            Diagnostic::error(
                ErrorKind::UnresolvedSymbol,
                format!("could not find symbol: '{}'", name),
            )
            .with_note(dump),
        );
        Abort::Module
    }

    fn error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error(kind, message));
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::warning(message));
    }
}
