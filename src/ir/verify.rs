//! Module verifier.
//!
//! Structural rules: every attached block is non-empty and ends with its
//! only terminator; branch targets are attached. Type rules: binary
//! operands have identical integer widths, stores match their slot width,
//! conditional branches take i1, returns match the function's return type,
//! and non-variadic calls match their callee's signature exactly.

use super::{CastKind, FuncId, Function, Instr, Module, Ty, ValueKind};

pub fn verify_module(m: &Module) -> Result<(), String> {
    for (id, _) in m.functions() {
        verify_function(m, id)?;
    }
    Ok(())
}

pub fn verify_function(m: &Module, id: FuncId) -> Result<(), String> {
    let f = m.function(id);
    if f.is_declaration() {
        return Ok(());
    }

    for block in f.attached_blocks() {
        if block.instrs.is_empty() {
            return Err(format!(
                "function '{}': block '{}' is empty",
                f.name, block.name
            ));
        }
        let last_index = block.instrs.len() - 1;
        for (i, &vid) in block.instrs.iter().enumerate() {
            let info = m.value(vid);
            let ValueKind::Instr(instr) = &info.kind else {
                return Err(format!(
                    "function '{}': non-instruction value in block '{}'",
                    f.name, block.name
                ));
            };
            if i == last_index && !instr.is_terminator() {
                return Err(format!(
                    "function '{}': block '{}' has no terminator",
                    f.name, block.name
                ));
            }
            if i < last_index && instr.is_terminator() {
                return Err(format!(
                    "function '{}': terminator in the middle of block '{}'",
                    f.name, block.name
                ));
            }
            verify_instr(m, f, &block.name, instr)?;
        }
    }
    Ok(())
}

fn verify_instr(m: &Module, f: &Function, block_name: &str, instr: &Instr) -> Result<(), String> {
    match instr {
        Instr::Alloca { .. } => Ok(()),
        Instr::Load { ptr } => match m.ty(*ptr) {
            Ty::Ptr(_) | Ty::Str => Ok(()),
            other => Err(format!(
                "function '{}': load from non-pointer value of type {} in block '{}'",
                f.name, other, block_name
            )),
        },
        Instr::Store { value, ptr } => {
            let Ty::Ptr(slot_width) = m.ty(*ptr) else {
                return Err(format!(
                    "function '{}': store target is not a stack slot in block '{}'",
                    f.name, block_name
                ));
            };
            match m.ty(*value) {
                Ty::Int(w) if w == slot_width => Ok(()),
                other => Err(format!(
                    "function '{}': store of {} into i{} slot in block '{}'",
                    f.name, other, slot_width, block_name
                )),
            }
        }
        Instr::Bin { lhs, rhs, .. } | Instr::Cmp { lhs, rhs, .. } => {
            match (m.ty(*lhs), m.ty(*rhs)) {
                (Ty::Int(a), Ty::Int(b)) if a == b => Ok(()),
                (a, b) => Err(format!(
                    "function '{}': operand mismatch in block '{}': {} vs {}",
                    f.name, block_name, a, b
                )),
            }
        }
        Instr::Cast { kind, value, width } => {
            let Ty::Int(from) = m.ty(*value) else {
                return Err(format!(
                    "function '{}': cast of non-integer value in block '{}'",
                    f.name, block_name
                ));
            };
            let valid = match kind {
                CastKind::ZExt => *width > from,
                CastKind::Trunc => *width < from,
            };
            if valid {
                Ok(())
            } else {
                Err(format!(
                    "function '{}': invalid {} from i{} to i{} in block '{}'",
                    f.name,
                    kind.mnemonic(),
                    from,
                    width,
                    block_name
                ))
            }
        }
        Instr::Call { callee, args } => {
            let callee_f = m.function(*callee);
            if callee_f.is_variadic {
                if args.len() < callee_f.params.len() {
                    return Err(format!(
                        "function '{}': call to '{}' passes {} arguments, fewer than the {} declared",
                        f.name,
                        callee_f.name,
                        args.len(),
                        callee_f.params.len()
                    ));
                }
                return Ok(());
            }
            if args.len() != callee_f.params.len() {
                return Err(format!(
                    "function '{}': call to '{}' passes {} arguments, expected {}",
                    f.name,
                    callee_f.name,
                    args.len(),
                    callee_f.params.len()
                ));
            }
            for (i, (&arg, &param)) in args.iter().zip(callee_f.params.iter()).enumerate() {
                if m.ty(arg) != param {
                    return Err(format!(
                        "function '{}': argument {} of call to '{}' has type {}, expected {}",
                        f.name,
                        i,
                        callee_f.name,
                        m.ty(arg),
                        param
                    ));
                }
            }
            Ok(())
        }
        Instr::Br { dest } => {
            if f.is_attached(*dest) {
                Ok(())
            } else {
                Err(format!(
                    "function '{}': branch to unattached block '{}'",
                    f.name,
                    f.block(*dest).name
                ))
            }
        }
        Instr::CondBr {
            cond,
            then_dest,
            else_dest,
        } => {
            if m.ty(*cond) != Ty::Int(1) {
                return Err(format!(
                    "function '{}': conditional branch on {} (must be i1) in block '{}'",
                    f.name,
                    m.ty(*cond),
                    block_name
                ));
            }
            for dest in [then_dest, else_dest] {
                if !f.is_attached(*dest) {
                    return Err(format!(
                        "function '{}': branch to unattached block '{}'",
                        f.name,
                        f.block(*dest).name
                    ));
                }
            }
            Ok(())
        }
        Instr::Ret { value } => {
            if m.ty(*value) == f.ret {
                Ok(())
            } else {
                Err(format!(
                    "function '{}': return of {} does not match return type {}",
                    f.name,
                    m.ty(*value),
                    f.ret
                ))
            }
        }
    }
}
