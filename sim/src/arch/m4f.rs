//! Cortex-M4F edge rules and block graph.
//!
//! Three rule hooks on top of the generic engine:
//!
//! - pipeline order: multi-cycle instructions occupy their functional unit
//!   for `cost` cycles, expressed as extra latency on the first unit node;
//! - memory order: one memory port per functional unit pipeline, so loads
//!   issued through the same unit are strictly serialized;
//! - data dependency: a `dep`-classified instruction cannot be pipelined
//!   with its neighbors, so its successor's fetch stalls a cycle behind the
//!   predecessor's execute. The stall is planted one step ahead as well,
//!   which doubles the edge between two adjacent `dep` instructions; that
//!   matches the reference timing and is kept deliberately.

use std::collections::BTreeSet;
use std::io::Write;

use anyhow::Result;

use crate::graph::{BlockTime, EdgeRules, ExeGraph, NodeId};
use crate::hardware::TargetDesc;
use crate::isa::{Addr, Inst};
use crate::timing::{ArmInfo, M4fTime};

const DATA_DEP: &str = "Data dep";
const MEMORY_ORDER: &str = "memory order";

struct M4fRules<'i> {
    info: &'i ArmInfo,
}

impl M4fRules<'_> {
    fn inst_cycle_timing(&self, inst: &Inst) -> M4fTime {
        self.info.decode(inst).cycle_timing()
    }

    fn inst_reg_count(&self, inst: &Inst) -> u32 {
        self.info.decode(inst).reg_count()
    }
}

impl EdgeRules for M4fRules<'_> {
    /// Add latency to the Exec-FU nodes of multi-cycle instructions.
    fn pipeline_order(&mut self, g: &mut ExeGraph) -> Result<()> {
        for (i, inst) in g.seq().iter().enumerate() {
            let timing = self.inst_cycle_timing(inst);
            let mut cost = timing.ex_cost;
            if timing.multi && !inst.is_float() {
                cost += self.inst_reg_count(inst);
            }
            if cost > 1 {
                g.set_latency(g.first_fu_node(i), cost - 1);
            }
        }
        Ok(())
    }

    /// Serialize loads contending for one functional unit's memory port.
    fn memory_order(&mut self, g: &mut ExeGraph) -> Result<()> {
        for fu in [g.refs().exec_f, g.refs().exec_m4] {
            let mut previous_load: Option<NodeId> = None;
            for node in g.fu_first_stage_nodes(fu) {
                let inst = g.node(node).inst;
                if !g.seq()[inst].is_load() {
                    continue;
                }
                if let Some(prev) = previous_load {
                    if g.node(prev).inst != inst {
                        g.add_edge(prev, node, 0, MEMORY_ORDER);
                    }
                }
                // the new previous load is this instruction's last unit node
                previous_load = Some(g.last_fu_node(inst));
            }
        }
        Ok(())
    }

    /// Conservative stall around `dep`-classified instructions.
    // TODO: refine once reference measurements separate the producer-side
    // and consumer-side stalls; for now every dep instruction blocks both
    // neighbors.
    fn data_dependency(&mut self, g: &mut ExeGraph) -> Result<()> {
        let mut prev: Option<usize> = None;
        let mut prev_dep = false;
        for i in 0..g.seq().len() {
            if prev_dep {
                if let Some(p) = prev {
                    prev_dep = false;
                    g.add_edge(g.last_fu_node(p), g.fetch_node(i), 1, DATA_DEP);
                }
            }
            if self.inst_cycle_timing(&g.seq()[i]).dep {
                if let Some(p) = prev {
                    prev_dep = true;
                    g.add_edge(g.last_fu_node(p), g.fetch_node(i), 1, DATA_DEP);
                }
            }
            prev = Some(i);
        }
        Ok(())
    }
}

/// Execution graph of one basic block on the Cortex-M4F.
#[derive(Debug)]
pub struct M4fGraph<'a> {
    graph: ExeGraph<'a>,
}

impl<'a> M4fGraph<'a> {
    /// Build the block graph. `out` is the unknown-instruction sink;
    /// `unknown_inst_addrs` deduplicates reports across the blocks of one
    /// run and is owned by the caller.
    pub fn build(
        seq: &'a [Inst],
        target: &'a TargetDesc,
        out: Option<&mut dyn Write>,
        unknown_inst_addrs: &mut BTreeSet<Addr>,
    ) -> Result<M4fGraph<'a>> {
        let info = ArmInfo::from_target(target)?;
        let mut rules = M4fRules { info };
        let graph = ExeGraph::build(seq, &target.proc, &mut rules)?;
        let g = M4fGraph { graph };
        g.dump_unknown_insts(info, out, unknown_inst_addrs);
        Ok(g)
    }

    /// Report instructions whose cycle timing was not classified, once per
    /// address per run. Best effort: sink errors are not handled.
    fn dump_unknown_insts(
        &self,
        info: &ArmInfo,
        out: Option<&mut dyn Write>,
        seen: &mut BTreeSet<Addr>,
    ) {
        let Some(out) = out else {
            return;
        };
        for inst in self.graph.seq() {
            if !info.decode(inst).cycle_timing().unknown {
                continue;
            }
            if seen.contains(&inst.addr) {
                continue;
            }
            seen.insert(inst.addr);
            let _ = writeln!(out, "{:#010x}; {}", inst.addr, inst);
        }
    }

    pub fn solve(&self) -> Result<BlockTime> {
        self.graph.solve()
    }

    pub fn graph(&self) -> &ExeGraph<'a> {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::FuDesc;
    use crate::timing::{m4f_cycle_table, M4fTime, OpClass};

    fn block(encs: &[(u32, bool)]) -> Vec<Inst> {
        let mut addr = 0x8000_0100;
        encs.iter()
            .map(|&(raw, wide)| {
                let i = Inst::decode(addr, raw, wide);
                addr += if wide { 4 } else { 2 };
                i
            })
            .collect()
    }

    fn build<'a>(seq: &'a [Inst], target: &'a TargetDesc) -> M4fGraph<'a> {
        let mut seen = BTreeSet::new();
        M4fGraph::build(seq, target, None, &mut seen).unwrap()
    }

    #[test]
    fn multi_cycle_latency_includes_register_count() {
        let t = TargetDesc::m4f();
        // ldmia r0!, {r1, r2, r3}: base 1 plus three registers
        let seq = block(&[(0xC80E, false)]);
        let g = build(&seq, &t);
        assert_eq!(g.graph().node(g.graph().first_fu_node(0)).latency, 3);
    }

    #[test]
    fn float_multi_skips_register_count() {
        let t = TargetDesc::m4f();
        // vldmia r0!, {s0-s2}: multi but float, so only the base cost counts
        let seq = block(&[(0xEC90_0A03, true)]);
        let g = build(&seq, &t);
        assert!(seq[0].is_float());
        assert_eq!(g.graph().node(g.graph().first_fu_node(0)).latency, 0);
    }

    #[test]
    fn division_keeps_the_unit_busy() {
        let t = TargetDesc::m4f();
        // sdiv r0, r1, r2 is 12 cycles worst case
        let seq = block(&[(0xFB91_F0F2, true)]);
        let g = build(&seq, &t);
        assert_eq!(g.graph().node(g.graph().first_fu_node(0)).latency, 11);
    }

    #[test]
    fn single_cycle_costs_add_no_latency() {
        let t = TargetDesc::m4f();
        // movs r0, #1
        let seq = block(&[(0x2001, false)]);
        let g = build(&seq, &t);
        for n in g.graph().nodes() {
            assert_eq!(n.latency, 0);
        }
    }

    #[test]
    fn same_unit_loads_are_serialized() {
        let t = TargetDesc::m4f();
        // ldr r0, [r1]; movs r2, #0; ldr r1, [r2]
        let seq = block(&[(0x6808, false), (0x2200, false), (0x6811, false)]);
        let g = build(&seq, &t);
        let gr = g.graph();
        let found: Vec<_> = gr
            .edges()
            .iter()
            .filter(|e| e.label == "memory order")
            .collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].from, gr.last_fu_node(0));
        assert_eq!(found[0].to, gr.first_fu_node(2));
        assert_eq!(found[0].latency, 0);
    }

    #[test]
    fn cross_unit_loads_are_not_ordered() {
        let t = TargetDesc::m4f();
        // ldr r0, [r1]; vldr s0, [r0]: integer and float units
        let seq = block(&[(0x6808, false), (0xED90_0A00, true)]);
        let g = build(&seq, &t);
        assert!(!g.graph().edges().iter().any(|e| e.label == "memory order"));
    }

    #[test]
    fn memory_order_tracks_last_unit_node() {
        // stretch the float unit into two sub-stages so the tracked
        // "previous load" advances past the first one
        let mut t = TargetDesc::m4f();
        t.proc.stages[2].fus = vec![
            FuDesc::new(["EXEC_F1", "EXEC_F2"]),
            FuDesc::new(["EXEC_M4"]),
        ];
        // vldr s0, [r0]; vldr s1, [r1]
        let seq = block(&[(0xED90_0A00, true), (0xED91_0A00, true)]);
        let g = build(&seq, &t);
        let gr = g.graph();
        let found: Vec<_> = gr
            .edges()
            .iter()
            .filter(|e| e.label == "memory order")
            .collect();
        assert_eq!(found.len(), 1);
        // from the *last* unit node of the first load to the *first* unit
        // node of the second
        assert_eq!(found[0].from, gr.last_fu_node(0));
        assert_ne!(found[0].from, gr.first_fu_node(0));
        assert_eq!(found[0].to, gr.first_fu_node(1));
    }

    #[test]
    fn dep_stalls_both_neighbors() {
        let t = TargetDesc::m4f();
        // movs r0, #1; sdiv r0, r1, r2; movs r2, #0; movs r3, #0
        let seq = block(&[
            (0x2001, false),
            (0xFB91_F0F2, true),
            (0x2200, false),
            (0x2300, false),
        ]);
        let g = build(&seq, &t);
        let gr = g.graph();
        let dep: Vec<_> = gr
            .edges()
            .iter()
            .filter(|e| e.label == "Data dep")
            .collect();
        assert_eq!(dep.len(), 2);
        // predecessor -> sdiv's fetch
        assert!(dep
            .iter()
            .any(|e| e.from == gr.last_fu_node(0) && e.to == gr.fetch_node(1) && e.latency == 1));
        // sdiv -> successor's fetch, planted one step ahead
        assert!(dep
            .iter()
            .any(|e| e.from == gr.last_fu_node(1) && e.to == gr.fetch_node(2) && e.latency == 1));
    }

    #[test]
    fn adjacent_dep_instructions_double_the_edge() {
        let t = TargetDesc::m4f();
        // movs r0, #1; sdiv r0, r1, r2; sdiv r3, r4, r5
        let seq = block(&[
            (0x2001, false),
            (0xFB91_F0F2, true),
            (0xFB94_F3F5, true),
        ]);
        let g = build(&seq, &t);
        let gr = g.graph();
        let doubled = gr
            .edges()
            .iter()
            .filter(|e| {
                e.label == "Data dep"
                    && e.from == gr.last_fu_node(1)
                    && e.to == gr.fetch_node(2)
            })
            .count();
        // once from the pending flag, once from the immediate branch
        assert_eq!(doubled, 2);
    }

    #[test]
    fn leading_dep_instruction_has_no_predecessor_edge() {
        let t = TargetDesc::m4f();
        // sdiv first: nothing to stall against, and the pending flag is not
        // planted either
        let seq = block(&[(0xFB91_F0F2, true), (0x2001, false)]);
        let g = build(&seq, &t);
        assert!(!g.graph().edges().iter().any(|e| e.label == "Data dep"));
    }

    #[test]
    fn unknown_instructions_are_reported_once() {
        let t = TargetDesc::m4f();
        let seq = block(&[(0xDE00, false), (0x2001, false)]);
        let mut seen = BTreeSet::new();
        let mut out: Vec<u8> = Vec::new();
        let g = M4fGraph::build(&seq, &t, Some(&mut out), &mut seen).unwrap();
        drop(g);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "0x80000100; .hword 0xde00\n");
        // same address again in a later block of the same run: suppressed
        let mut out2: Vec<u8> = Vec::new();
        let _ = M4fGraph::build(&seq, &t, Some(&mut out2), &mut seen).unwrap();
        assert!(out2.is_empty());
    }

    #[test]
    fn missing_arm_info_is_fatal() {
        let mut t = TargetDesc::m4f();
        t.arm = None;
        let seq = block(&[(0x2001, false)]);
        let mut seen = BTreeSet::new();
        let err = M4fGraph::build(&seq, &t, None, &mut seen).unwrap_err();
        assert!(err.to_string().contains("arm loader"));
    }

    #[test]
    fn custom_tables_reach_the_rules() {
        fn flat(_c: OpClass) -> M4fTime {
            M4fTime { ex_cost: 1, multi: false, dep: false, unknown: false }
        }
        let mut t = TargetDesc::m4f();
        t.arm = Some(ArmInfo::with_table(flat));
        // sdiv costs 1 under the flat table
        let seq = block(&[(0xFB91_F0F2, true)]);
        let g = build(&seq, &t);
        assert_eq!(g.graph().node(g.graph().first_fu_node(0)).latency, 0);
        // sanity: the default table says otherwise
        assert_eq!(m4f_cycle_table(OpClass::Div).ex_cost, 12);
    }
}
