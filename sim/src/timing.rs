//! Per-instruction cycle timing for the Cortex-M4F.
//!
//! Mirrors the loader-side decode capability of the target toolchain: the
//! graph builder never reads cycle counts off an instruction directly, it
//! asks [`ArmInfo`] to decode it and extracts the timing descriptor (and,
//! for register-list transfers, the operand count) from the scoped handle.
//! The handle borrows the instruction, so its release is guaranteed on every
//! exit path.

use crate::hardware::TargetDesc;
use crate::isa::{Inst, Op};
use anyhow::{Context, Result};

/// Cycle timing behavior of one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct M4fTime {
    /// Base execution cost in cycles.
    pub ex_cost: u32,
    /// Cost grows with the register operand count (ldm/stm families).
    pub multi: bool,
    /// Cannot be pipelined with the neighboring instructions.
    pub dep: bool,
    /// The decoder could not classify the instruction.
    pub unknown: bool,
}

const fn time(ex_cost: u32) -> M4fTime {
    M4fTime { ex_cost, multi: false, dep: false, unknown: false }
}

const UNKNOWN_TIME: M4fTime = M4fTime { ex_cost: 0, multi: false, dep: false, unknown: true };

/// Instruction classes of the cycle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Alu,
    Mul,
    Div,
    Load,
    Store,
    Transfer,
    Branch,
    Nop,
    FpAlu,
    FpMac,
    FpDiv,
    FpSqrt,
    FpLoad,
    FpStore,
    FpTransfer,
    Unknown,
}

pub fn class_of(op: &Op) -> OpClass {
    match op {
        Op::Alu { .. } | Op::AluImm { .. } | Op::Cmp { .. } | Op::Sys => OpClass::Alu,
        Op::Mul { .. } | Op::Mla { .. } => OpClass::Mul,
        Op::Div { .. } => OpClass::Div,
        Op::Ldr { .. } => OpClass::Load,
        Op::Str { .. } => OpClass::Store,
        Op::Ldm { .. } | Op::Stm { .. } | Op::Push { .. } | Op::Pop { .. } => OpClass::Transfer,
        Op::Branch { .. } | Op::Bx { .. } | Op::Cbz { .. } => OpClass::Branch,
        Op::Nop => OpClass::Nop,
        Op::VAlu { .. } => OpClass::FpAlu,
        Op::VMac { .. } => OpClass::FpMac,
        Op::VDiv { .. } => OpClass::FpDiv,
        Op::VSqrt { .. } => OpClass::FpSqrt,
        Op::VLdr { .. } => OpClass::FpLoad,
        Op::VStr { .. } => OpClass::FpStore,
        Op::VLdm { .. } | Op::VStm { .. } => OpClass::FpTransfer,
        Op::Unknown => OpClass::Unknown,
    }
}

/// The generated M4F cycle table. Worst-case entries where the reference
/// manual gives a range (divides, branch refill).
pub fn m4f_cycle_table(class: OpClass) -> M4fTime {
    match class {
        OpClass::Alu | OpClass::Nop => time(1),
        OpClass::Mul => time(1),
        OpClass::Div => M4fTime { dep: true, ..time(12) },
        OpClass::Load => M4fTime { dep: true, ..time(2) },
        OpClass::Store => time(2),
        OpClass::Transfer | OpClass::FpTransfer => M4fTime { multi: true, ..time(1) },
        OpClass::Branch => time(3),
        OpClass::FpAlu => time(1),
        OpClass::FpMac => time(3),
        OpClass::FpDiv | OpClass::FpSqrt => M4fTime { dep: true, ..time(14) },
        OpClass::FpLoad => M4fTime { dep: true, ..time(2) },
        OpClass::FpStore => time(2),
        OpClass::Unknown => UNKNOWN_TIME,
    }
}

pub type CycleTable = fn(OpClass) -> M4fTime;

/// Decode capability of the arm loader. Required by the graph builder; a
/// target description without it cannot be timed.
#[derive(Debug, Clone, Copy)]
pub struct ArmInfo {
    table: CycleTable,
}

impl Default for ArmInfo {
    fn default() -> Self {
        ArmInfo { table: m4f_cycle_table }
    }
}

impl ArmInfo {
    /// Swap in a different cycle table (scenario tests).
    pub fn with_table(table: CycleTable) -> Self {
        ArmInfo { table }
    }

    /// Fetch the decode capability from a target description. Fatal when the
    /// target was described without a loader; the whole analysis stops here.
    pub fn from_target(target: &TargetDesc) -> Result<&ArmInfo> {
        target
            .arm
            .as_ref()
            .context("arm loader with Thumb-2 timing info is required")
    }

    /// Decode one instruction. The returned handle is only valid while the
    /// instruction is borrowed; extraction happens through it.
    pub fn decode<'a>(&'a self, inst: &'a Inst) -> InstInfo<'a> {
        InstInfo { info: self, inst }
    }
}

/// Scoped decode result. Dropping it releases the decode.
pub struct InstInfo<'a> {
    info: &'a ArmInfo,
    inst: &'a Inst,
}

impl InstInfo<'_> {
    /// The cycle timing behavior of the decoded instruction.
    pub fn cycle_timing(&self) -> M4fTime {
        (self.info.table)(class_of(&self.inst.op))
    }

    /// Register operand count; only meaningful for `multi` instructions.
    pub fn reg_count(&self) -> u32 {
        self.inst.transfer_count().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Inst;

    #[test]
    fn table_entries() {
        assert_eq!(m4f_cycle_table(OpClass::Alu), time(1));
        let div = m4f_cycle_table(OpClass::Div);
        assert!(div.dep && div.ex_cost == 12);
        let ldm = m4f_cycle_table(OpClass::Transfer);
        assert!(ldm.multi && ldm.ex_cost == 1);
        let unk = m4f_cycle_table(OpClass::Unknown);
        assert!(unk.unknown && unk.ex_cost == 0);
    }

    #[test]
    fn decode_handle_extraction() {
        let info = ArmInfo::default();
        // ldmia r0!, {r1, r2, r3}
        let inst = Inst::decode(0x100, 0xC80E, false);
        let h = info.decode(&inst);
        assert!(h.cycle_timing().multi);
        assert_eq!(h.reg_count(), 3);
        // adds r0, r0, r1 is not a transfer
        let inst = Inst::decode(0x102, 0x1840, false);
        assert_eq!(info.decode(&inst).reg_count(), 0);
    }

    #[test]
    fn unknown_is_not_an_error() {
        let info = ArmInfo::default();
        let inst = Inst::decode(0x100, 0xDE00, false);
        let t = info.decode(&inst).cycle_timing();
        assert!(t.unknown);
        assert_eq!(t.ex_cost, 0);
    }
}
