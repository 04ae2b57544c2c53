//! Instruction builder: tracks the insertion point and creates
//! instructions, mirroring the way lowering walks the tree.

use super::{BinOp, BlockId, CastKind, FuncId, Instr, Module, Pred, Ty, ValueId};

/// Builds instructions at a current (function, block) insertion point.
///
/// There is exactly one builder during lowering; handlers move its
/// insertion point as they open and close blocks.
#[derive(Debug, Default)]
pub struct Builder {
    insert: Option<(FuncId, BlockId)>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_insert_point(&mut self, func: FuncId, block: BlockId) {
        self.insert = Some((func, block));
    }

    pub fn insert_point(&self) -> Option<(FuncId, BlockId)> {
        self.insert
    }

    fn point(&self) -> (FuncId, BlockId) {
        self.insert
            .expect("builder insertion point must be set before emitting")
    }

    /// Allocate a stack slot in the current function's entry block.
    pub fn build_entry_alloca(&mut self, m: &mut Module, width: u8, name: &str) -> ValueId {
        let (func, _) = self.point();
        m.push_entry_alloca(func, width, name)
    }

    pub fn build_load(&mut self, m: &mut Module, ptr: ValueId, name: &str) -> ValueId {
        let (func, block) = self.point();
        let ty = match m.ty(ptr) {
            Ty::Ptr(w) => Ty::Int(w),
            Ty::Str => Ty::Int(8),
            other => other,
        };
        m.push_instr(func, block, ty, name, Instr::Load { ptr })
    }

    pub fn build_store(&mut self, m: &mut Module, value: ValueId, ptr: ValueId) -> ValueId {
        let (func, block) = self.point();
        m.push_instr(func, block, Ty::Void, "", Instr::Store { value, ptr })
    }

    pub fn build_bin(
        &mut self,
        m: &mut Module,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
    ) -> ValueId {
        let (func, block) = self.point();
        let ty = m.ty(lhs);
        m.push_instr(func, block, ty, name, Instr::Bin { op, lhs, rhs })
    }

    pub fn build_cmp(
        &mut self,
        m: &mut Module,
        pred: Pred,
        lhs: ValueId,
        rhs: ValueId,
        name: &str,
    ) -> ValueId {
        let (func, block) = self.point();
        m.push_instr(func, block, Ty::Int(1), name, Instr::Cmp { pred, lhs, rhs })
    }

    pub fn build_cast(
        &mut self,
        m: &mut Module,
        kind: CastKind,
        value: ValueId,
        width: u8,
        name: &str,
    ) -> ValueId {
        let (func, block) = self.point();
        m.push_instr(
            func,
            block,
            Ty::Int(width),
            name,
            Instr::Cast { kind, value, width },
        )
    }

    pub fn build_call(
        &mut self,
        m: &mut Module,
        callee: FuncId,
        args: Vec<ValueId>,
        name: &str,
    ) -> ValueId {
        let (func, block) = self.point();
        let ty = m.function(callee).ret;
        m.push_instr(func, block, ty, name, Instr::Call { callee, args })
    }

    pub fn build_br(&mut self, m: &mut Module, dest: BlockId) -> ValueId {
        let (func, block) = self.point();
        m.push_instr(func, block, Ty::Void, "", Instr::Br { dest })
    }

    pub fn build_cond_br(
        &mut self,
        m: &mut Module,
        cond: ValueId,
        then_dest: BlockId,
        else_dest: BlockId,
    ) -> ValueId {
        let (func, block) = self.point();
        m.push_instr(
            func,
            block,
            Ty::Void,
            "",
            Instr::CondBr {
                cond,
                then_dest,
                else_dest,
            },
        )
    }

    pub fn build_ret(&mut self, m: &mut Module, value: ValueId) -> ValueId {
        let (func, block) = self.point();
        m.push_instr(func, block, Ty::Void, "", Instr::Ret { value })
    }
}
