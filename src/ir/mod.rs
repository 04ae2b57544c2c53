//! SSA-style intermediate representation between the AST and the external
//! optimizer toolchain.
//!
//! A `Module` owns functions, global string constants, and a value arena.
//! Basic blocks are created detached and attached to their function later,
//! so lowering can decide block order (and whether a merge block exists at
//! all) after visiting a construct's bodies.

pub mod bitcode;
pub mod builder;
pub mod verify;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Value types. Integer widths cover i1 (comparison results), i32, i64.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ty {
    Int(u8),
    /// Pointer to an integer stack slot of the given width.
    Ptr(u8),
    /// Pointer to the first byte of a NUL-terminated global string.
    Str,
    /// Instructions that produce no value (stores, branches).
    Void,
}

impl Ty {
    pub fn is_ptr(self) -> bool {
        matches!(self, Ty::Ptr(_))
    }

    pub fn int_width(self) -> Option<u8> {
        match self {
            Ty::Int(w) => Some(w),
            _ => None,
        }
    }

    pub fn pointee_width(self) -> Option<u8> {
        match self {
            Ty::Ptr(w) => Some(w),
            _ => None,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int(w) => write!(f, "i{}", w),
            Ty::Ptr(w) => write!(f, "i{}*", w),
            Ty::Str => write!(f, "i8*"),
            Ty::Void => write!(f, "void"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::SRem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
        }
    }
}

/// Signed integer comparison predicates. All produce i1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pred {
    Eq,
    Ne,
    Slt,
    Sgt,
    Sle,
    Sge,
}

impl Pred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Pred::Eq => "eq",
            Pred::Ne => "ne",
            Pred::Slt => "slt",
            Pred::Sgt => "sgt",
            Pred::Sle => "sle",
            Pred::Sge => "sge",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    ZExt,
    Trunc,
}

impl CastKind {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastKind::ZExt => "zext",
            CastKind::Trunc => "trunc",
        }
    }
}

/// A single instruction. Every instruction is also a value (possibly Void).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Instr {
    Alloca { width: u8 },
    Load { ptr: ValueId },
    Store { value: ValueId, ptr: ValueId },
    Bin { op: BinOp, lhs: ValueId, rhs: ValueId },
    Cmp { pred: Pred, lhs: ValueId, rhs: ValueId },
    Cast { kind: CastKind, value: ValueId, width: u8 },
    Call { callee: FuncId, args: Vec<ValueId> },
    Br { dest: BlockId },
    CondBr { cond: ValueId, then_dest: BlockId, else_dest: BlockId },
    Ret { value: ValueId },
}

impl Instr {
    /// Branches and returns end a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Br { .. } | Instr::CondBr { .. } | Instr::Ret { .. })
    }
}

/// What a value is: a function argument, a constant, a global string
/// pointer, or the result of an instruction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ValueKind {
    Arg { index: u32 },
    Const { bits: u64 },
    Str { index: u32 },
    Instr(Instr),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValueInfo {
    pub ty: Ty,
    pub name: String,
    pub kind: ValueKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BasicBlock {
    pub name: String,
    pub instrs: Vec<ValueId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub ret: Ty,
    pub params: Vec<Ty>,
    pub is_variadic: bool,
    args: Vec<ValueId>,
    blocks: Vec<BasicBlock>,
    /// Attachment order. Only attached blocks are part of the layout; a
    /// merge block that never materializes stays detached and is ignored.
    attached: Vec<BlockId>,
    #[serde(skip)]
    used_names: HashSet<String>,
    #[serde(skip)]
    block_names: HashSet<String>,
}

impl Function {
    /// A function with no attached blocks is an external declaration.
    pub fn is_declaration(&self) -> bool {
        self.attached.is_empty()
    }

    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn attached(&self) -> &[BlockId] {
        &self.attached
    }

    pub fn attached_blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.attached.iter().map(|id| &self.blocks[id.0 as usize])
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn is_attached(&self, id: BlockId) -> bool {
        self.attached.contains(&id)
    }

    fn uniquify(&mut self, base: &str) -> String {
        if self.used_names.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{}{}", base, n);
            if self.used_names.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    fn uniquify_block(&mut self, base: &str) -> String {
        if self.block_names.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{}{}", base, n);
            if self.block_names.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// A NUL-terminated global string constant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GlobalStr {
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    functions: Vec<Function>,
    globals: Vec<GlobalStr>,
    values: Vec<ValueInfo>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: Vec::new(),
            globals: Vec::new(),
            values: Vec::new(),
        }
    }

    // --- Functions ---

    pub fn add_function(
        &mut self,
        name: &str,
        ret: Ty,
        params: Vec<Ty>,
        is_variadic: bool,
    ) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        let mut func = Function {
            name: name.to_string(),
            ret,
            params: params.clone(),
            is_variadic,
            args: Vec::new(),
            blocks: Vec::new(),
            attached: Vec::new(),
            used_names: HashSet::new(),
            block_names: HashSet::new(),
        };
        for (index, &ty) in params.iter().enumerate() {
            // placeholder names; lowering renames them to the source names
            let arg_name = func.uniquify(&format!("arg{}", index));
            let value = ValueId(self.values.len() as u32);
            self.values.push(ValueInfo {
                ty,
                name: arg_name,
                kind: ValueKind::Arg {
                    index: index as u32,
                },
            });
            func.args.push(value);
        }
        self.functions.push(func);
        id
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncId(i as u32))
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn arg(&self, func: FuncId, index: usize) -> ValueId {
        self.functions[func.0 as usize].args[index]
    }

    // --- Blocks ---

    /// Create a detached basic block. Attach it later with `attach_block`.
    pub fn new_block(&mut self, func: FuncId, name: &str) -> BlockId {
        let f = &mut self.functions[func.0 as usize];
        let name = f.uniquify_block(name);
        let id = BlockId(f.blocks.len() as u32);
        f.blocks.push(BasicBlock {
            name,
            instrs: Vec::new(),
        });
        id
    }

    pub fn attach_block(&mut self, func: FuncId, block: BlockId) {
        let f = &mut self.functions[func.0 as usize];
        if !f.attached.contains(&block) {
            f.attached.push(block);
        }
    }

    /// The function's entry block (first attached), if any.
    pub fn entry_block(&self, func: FuncId) -> Option<BlockId> {
        self.functions[func.0 as usize].attached.first().copied()
    }

    // --- Values ---

    pub fn value(&self, id: ValueId) -> &ValueInfo {
        &self.values[id.0 as usize]
    }

    pub fn ty(&self, id: ValueId) -> Ty {
        self.values[id.0 as usize].ty
    }

    pub fn set_value_name(&mut self, func: FuncId, value: ValueId, name: &str) {
        let unique = self.functions[func.0 as usize].uniquify(name);
        self.values[value.0 as usize].name = unique;
    }

    /// An integer constant, masked to its width.
    pub fn const_int(&mut self, width: u8, bits: u64) -> ValueId {
        let masked = if width >= 64 {
            bits
        } else {
            bits & ((1u64 << width) - 1)
        };
        self.push_value(Ty::Int(width), String::new(), ValueKind::Const { bits: masked })
    }

    /// A global string constant; returns a pointer to its first byte.
    pub fn add_global_str(&mut self, text: &str) -> ValueId {
        let mut data = text.as_bytes().to_vec();
        data.push(0);
        let mut name = ".str".to_string();
        let mut n = 1u32;
        while self.globals.iter().any(|g| g.name == name) {
            name = format!(".str{}", n);
            n += 1;
        }
        let index = self.globals.len() as u32;
        self.globals.push(GlobalStr { name, data });
        self.push_value(Ty::Str, String::new(), ValueKind::Str { index })
    }

    pub fn globals(&self) -> &[GlobalStr] {
        &self.globals
    }

    fn push_value(&mut self, ty: Ty, name: String, kind: ValueKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueInfo { ty, name, kind });
        id
    }

    /// Append an instruction value at the end of a block.
    pub(crate) fn push_instr(
        &mut self,
        func: FuncId,
        block: BlockId,
        ty: Ty,
        name: &str,
        instr: Instr,
    ) -> ValueId {
        let name = if name.is_empty() {
            String::new()
        } else {
            self.functions[func.0 as usize].uniquify(name)
        };
        let id = self.push_value(ty, name, ValueKind::Instr(instr));
        self.functions[func.0 as usize].blocks[block.0 as usize]
            .instrs
            .push(id);
        id
    }

    /// Create a stack slot in the function's entry block, grouped with the
    /// other allocas at the top so the downstream optimizer can promote it.
    pub(crate) fn push_entry_alloca(&mut self, func: FuncId, width: u8, name: &str) -> ValueId {
        let name = self.functions[func.0 as usize].uniquify(name);
        let id = self.push_value(Ty::Ptr(width), name, ValueKind::Instr(Instr::Alloca { width }));
        let fi = func.0 as usize;
        let Some(entry) = self.functions[fi].attached.first().copied() else {
            return id;
        };
        let bi = entry.0 as usize;
        let pos = {
            let block = &self.functions[fi].blocks[bi];
            let mut pos = block.instrs.len();
            for (i, &v) in block.instrs.iter().enumerate() {
                if !matches!(
                    self.values[v.0 as usize].kind,
                    ValueKind::Instr(Instr::Alloca { .. })
                ) {
                    pos = i;
                    break;
                }
            }
            pos
        };
        self.functions[fi].blocks[bi].instrs.insert(pos, id);
        id
    }

    // --- Text dump ---

    fn value_ref(&self, id: ValueId) -> String {
        let info = &self.values[id.0 as usize];
        match &info.kind {
            ValueKind::Const { bits } => {
                let width = info.ty.int_width().unwrap_or(64);
                format!("{}", sign_extend(*bits, width))
            }
            ValueKind::Str { index } => format!("@{}", self.globals[*index as usize].name),
            _ => format!("%{}", info.name),
        }
    }

    fn operand(&self, id: ValueId) -> String {
        format!("{} {}", self.values[id.0 as usize].ty, self.value_ref(id))
    }

    fn format_instr(&self, f: &Function, vid: ValueId) -> String {
        let info = &self.values[vid.0 as usize];
        let ValueKind::Instr(instr) = &info.kind else {
            return String::new();
        };
        match instr {
            Instr::Alloca { width } => format!("%{} = alloca i{}", info.name, width),
            Instr::Load { ptr } => {
                format!("%{} = load {}, {}", info.name, info.ty, self.operand(*ptr))
            }
            Instr::Store { value, ptr } => {
                format!("store {}, {}", self.operand(*value), self.operand(*ptr))
            }
            Instr::Bin { op, lhs, rhs } => format!(
                "%{} = {} {}, {}",
                info.name,
                op.mnemonic(),
                self.operand(*lhs),
                self.value_ref(*rhs)
            ),
            Instr::Cmp { pred, lhs, rhs } => format!(
                "%{} = icmp {} {}, {}",
                info.name,
                pred.mnemonic(),
                self.operand(*lhs),
                self.value_ref(*rhs)
            ),
            Instr::Cast { kind, value, width } => format!(
                "%{} = {} {} to i{}",
                info.name,
                kind.mnemonic(),
                self.operand(*value),
                width
            ),
            Instr::Call { callee, args } => {
                let callee_f = &self.functions[callee.0 as usize];
                let args = args
                    .iter()
                    .map(|&a| self.operand(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "%{} = call {} @{}({})",
                    info.name, callee_f.ret, callee_f.name, args
                )
            }
            Instr::Br { dest } => format!("br label %{}", f.block(*dest).name),
            Instr::CondBr {
                cond,
                then_dest,
                else_dest,
            } => format!(
                "br {}, label %{}, label %{}",
                self.operand(*cond),
                f.block(*then_dest).name,
                f.block(*else_dest).name
            ),
            Instr::Ret { value } => format!("ret {}", self.operand(*value)),
        }
    }

    pub fn dump_function(&self, id: FuncId) -> String {
        let f = &self.functions[id.0 as usize];
        if f.is_declaration() {
            let mut parts: Vec<String> = f.params.iter().map(Ty::to_string).collect();
            if f.is_variadic {
                parts.push("...".to_string());
            }
            return format!("declare {} @{}({})\n", f.ret, f.name, parts.join(", "));
        }
        let params = f
            .args
            .iter()
            .map(|&a| self.operand(a))
            .collect::<Vec<_>>()
            .join(", ");
        let mut out = format!("define {} @{}({}) {{\n", f.ret, f.name, params);
        for (bi, block) in f.attached_blocks().enumerate() {
            if bi > 0 {
                out.push('\n');
            }
            out.push_str(&format!("{}:\n", block.name));
            for &vid in &block.instrs {
                out.push_str(&format!("  {}\n", self.format_instr(f, vid)));
            }
        }
        out.push_str("}\n");
        out
    }

    pub fn dump(&self) -> String {
        let mut out = format!("; ModuleID = '{}'\n", self.name);
        for g in &self.globals {
            out.push_str(&format!(
                "@{} = private constant c\"{}\"\n",
                g.name,
                escape_bytes(&g.data)
            ));
        }
        for (i, _) in self.functions.iter().enumerate() {
            out.push('\n');
            out.push_str(&self.dump_function(FuncId(i as u32)));
        }
        out
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

fn sign_extend(bits: u64, width: u8) -> i64 {
    if width >= 64 {
        bits as i64
    } else {
        let shift = 64 - u32::from(width);
        ((bits << shift) as i64) >> shift
    }
}

fn escape_bytes(data: &[u8]) -> String {
    let mut out = String::new();
    for &b in data {
        if (0x20..=0x7E).contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\{:02X}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ty_display() {
        assert_eq!(Ty::Int(32).to_string(), "i32");
        assert_eq!(Ty::Int(1).to_string(), "i1");
        assert_eq!(Ty::Ptr(64).to_string(), "i64*");
        assert_eq!(Ty::Str.to_string(), "i8*");
        assert_eq!(Ty::Void.to_string(), "void");
    }

    #[test]
    fn test_const_masking() {
        let mut m = Module::new("t");
        let v = m.const_int(32, 0x1_0000_0005);
        let ValueKind::Const { bits } = m.value(v).kind else {
            panic!("expected const");
        };
        assert_eq!(bits, 5);
    }

    #[test]
    fn test_const_signed_display() {
        let mut m = Module::new("t");
        let v = m.const_int(32, 0xFFFF_FFFF);
        assert_eq!(m.value_ref(v), "-1");
        let v = m.const_int(32, 42);
        assert_eq!(m.value_ref(v), "42");
    }

    #[test]
    fn test_global_str_names() {
        let mut m = Module::new("t");
        let a = m.add_global_str("one");
        let b = m.add_global_str("two");
        assert_eq!(m.value_ref(a), "@.str");
        assert_eq!(m.value_ref(b), "@.str1");
        // data is NUL-terminated
        assert_eq!(m.globals()[0].data, b"one\0");
    }

    #[test]
    fn test_declaration_dump() {
        let mut m = Module::new("t");
        m.add_function("printf", Ty::Int(32), vec![Ty::Str], true);
        let id = m.get_function("printf").expect("just added");
        assert_eq!(m.dump_function(id), "declare i32 @printf(i8*, ...)\n");
    }

    #[test]
    fn test_block_name_uniquing() {
        let mut m = Module::new("t");
        let f = m.add_function("f", Ty::Int(32), Vec::new(), false);
        let a = m.new_block(f, "if.then");
        let b = m.new_block(f, "if.then");
        assert_eq!(m.function(f).block(a).name, "if.then");
        assert_eq!(m.function(f).block(b).name, "if.then1");
    }

    #[test]
    fn test_escape_bytes() {
        assert_eq!(escape_bytes(b"ab\0"), "ab\\00");
        assert_eq!(escape_bytes(b"a\nb"), "a\\0Ab");
    }

    #[test]
    fn test_terminator_classification() {
        assert!(Instr::Br { dest: BlockId(0) }.is_terminator());
        assert!(Instr::Ret { value: ValueId(0) }.is_terminator());
        assert!(!Instr::Alloca { width: 32 }.is_terminator());
        assert!(!Instr::Load { ptr: ValueId(0) }.is_terminator());
    }
}
