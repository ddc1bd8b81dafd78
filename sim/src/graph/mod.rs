//! Generic execution graph over one basic block.
//!
//! One node per (instruction, pipeline slot) occupancy, directed edges for
//! ordering and latency constraints. The engine owns the structural passes
//! every in-order pipeline shares (stage chaining, fetch order, program
//! order, register dependencies) and exposes three extension points for the
//! architecture model; see [`EdgeRules`]. Nodes and edges live in arenas and
//! are addressed by index, so nothing here borrows into the processor
//! description beyond the lifetime of one build.

mod solve;

pub use solve::BlockTime;

use crate::hardware::{
    ProcDesc, FU_FLOAT_PREFIX, FU_INT_PREFIX, STAGE_DECODE, STAGE_EXE, STAGE_FETCH, STAGE_WRITE,
};
use crate::isa::Inst;
use anyhow::{bail, ensure, Context, Result};

pub type NodeId = usize;

/// Where a node sits: a pipeline stage, and for the execute stage the
/// functional unit and sub-stage within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub stage: usize,
    pub fu: Option<(usize, usize)>,
}

#[derive(Debug, Clone, Copy)]
pub struct Node {
    /// Index of the instruction in the block sequence.
    pub inst: usize,
    pub slot: Slot,
    /// Extra occupancy cycles beyond the implicit single cycle.
    pub latency: u32,
}

impl Node {
    /// Cycles this node occupies its slot.
    pub fn occupancy(&self) -> u32 {
        1 + self.latency
    }
}

/// Edge kind; this model only ever emits solid precedence edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Solid,
}

#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    /// Extra cycles on top of the producer's occupancy.
    pub latency: u32,
    /// Provenance tag, for diagnostics only.
    pub label: &'static str,
}

/// Stage and functional unit indices resolved from the processor
/// description, valid for one graph build.
#[derive(Debug, Clone, Copy)]
pub struct PipelineRefs {
    pub fetch: usize,
    pub decode: usize,
    pub exec: usize,
    pub write: usize,
    /// Functional unit indices within the execute stage.
    pub exec_f: usize,
    pub exec_m4: usize,
}

/// Bind the pipeline skeleton by name. One linear scan; anything missing or
/// unrecognized is a fatal configuration error.
pub fn locate(proc: &ProcDesc) -> Result<PipelineRefs> {
    let mut fetch = None;
    let mut decode = None;
    let mut exec = None;
    let mut write = None;
    let mut exec_f = None;
    let mut exec_m4 = None;

    for (si, stage) in proc.stages.iter().enumerate() {
        match stage.name.as_str() {
            STAGE_FETCH => fetch = Some(si),
            STAGE_DECODE => decode = Some(si),
            STAGE_EXE => {
                exec = Some(si);
                for (fi, fu) in stage.fus.iter().enumerate() {
                    let name = fu.first_stage();
                    if name.starts_with(FU_FLOAT_PREFIX) {
                        ensure!(exec_f.is_none(), "duplicate FPU fu '{}'", name);
                        exec_f = Some(fi);
                    } else if name.starts_with(FU_INT_PREFIX) {
                        ensure!(exec_m4.is_none(), "duplicate M4 fu '{}'", name);
                        exec_m4 = Some(fi);
                    } else {
                        bail!("unrecognized functional unit '{}'", name);
                    }
                }
            }
            STAGE_WRITE => write = Some(si),
            _ => {}
        }
    }

    Ok(PipelineRefs {
        fetch: fetch.context("no 'Fetch' stage found")?,
        decode: decode.context("no 'Decode' stage found")?,
        exec: exec.context("no 'EXE' stage found")?,
        write: write.context("no 'Write' stage found")?,
        exec_f: exec_f.context("no FPU fu found")?,
        exec_m4: exec_m4.context("no M4 fu found")?,
    })
}

/// Architecture-specific edge construction hooks, invoked at fixed points of
/// [`ExeGraph::build`]. Defaults do nothing.
pub trait EdgeRules {
    /// Runs after the structural stage-chaining edges; typically raises
    /// functional unit latencies.
    fn pipeline_order(&mut self, _g: &mut ExeGraph) -> Result<()> {
        Ok(())
    }

    fn memory_order(&mut self, _g: &mut ExeGraph) -> Result<()> {
        Ok(())
    }

    fn data_dependency(&mut self, _g: &mut ExeGraph) -> Result<()> {
        Ok(())
    }
}

/// The engine's no-op rule set.
pub struct DefaultRules;

impl EdgeRules for DefaultRules {}

#[derive(Debug)]
pub struct ExeGraph<'a> {
    seq: &'a [Inst],
    proc: &'a ProcDesc,
    refs: PipelineRefs,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// Start of each instruction's node range, plus one sentinel.
    inst_first: Vec<usize>,
}

impl<'a> ExeGraph<'a> {
    /// Build the graph for one block: locate, create nodes, then run the
    /// structural passes with the rule hooks interleaved in fixed order.
    pub fn build(
        seq: &'a [Inst],
        proc: &'a ProcDesc,
        rules: &mut dyn EdgeRules,
    ) -> Result<ExeGraph<'a>> {
        let refs = locate(proc)?;
        let mut g = ExeGraph {
            seq,
            proc,
            refs,
            nodes: Vec::new(),
            edges: Vec::new(),
            inst_first: Vec::new(),
        };
        g.create_nodes();
        g.add_edges_for_pipeline_order();
        rules.pipeline_order(&mut g)?;
        g.add_edges_for_fetch();
        g.add_edges_for_program_order();
        g.add_edges_for_register_deps();
        rules.memory_order(&mut g)?;
        rules.data_dependency(&mut g)?;
        tracing::trace!(
            insts = seq.len(),
            nodes = g.nodes.len(),
            edges = g.edges.len(),
            "execution graph built"
        );
        Ok(g)
    }

    /// One node per stage, with the execute stage expanded into the chosen
    /// functional unit's sub-stage chain.
    fn create_nodes(&mut self) {
        let seq = self.seq;
        for (i, inst) in seq.iter().enumerate() {
            self.inst_first.push(self.nodes.len());
            let fu = if inst.is_float() {
                self.refs.exec_f
            } else {
                self.refs.exec_m4
            };
            self.push_node(i, Slot { stage: self.refs.fetch, fu: None });
            self.push_node(i, Slot { stage: self.refs.decode, fu: None });
            let subs = self.proc.stages[self.refs.exec].fus[fu].stages.len();
            for sub in 0..subs {
                self.push_node(i, Slot { stage: self.refs.exec, fu: Some((fu, sub)) });
            }
            self.push_node(i, Slot { stage: self.refs.write, fu: None });
        }
        self.inst_first.push(self.nodes.len());
    }

    fn push_node(&mut self, inst: usize, slot: Slot) {
        self.nodes.push(Node { inst, slot, latency: 0 });
    }

    /// Chain each instruction's own nodes in stage order.
    fn add_edges_for_pipeline_order(&mut self) {
        for i in 0..self.seq.len() {
            for id in self.inst_first[i]..self.inst_first[i + 1] - 1 {
                self.add_edge(id, id + 1, 0, "pipeline order");
            }
        }
    }

    /// In-order single-issue fetch: consecutive fetches at least one cycle
    /// apart (the producer's occupancy is implicit in the edge weight).
    fn add_edges_for_fetch(&mut self) {
        for i in 1..self.seq.len() {
            self.add_edge(self.fetch_node(i - 1), self.fetch_node(i), 0, "fetch order");
        }
    }

    /// Single-slot in-order Decode and Write.
    fn add_edges_for_program_order(&mut self) {
        for i in 1..self.seq.len() {
            self.add_edge(self.decode_node(i - 1), self.decode_node(i), 0, "program order");
            self.add_edge(self.write_node(i - 1), self.write_node(i), 0, "program order");
        }
    }

    /// Generic register dependencies: the consumer's first functional unit
    /// node waits for the producer's last.
    fn add_edges_for_register_deps(&mut self) {
        let mut last_writer: [Option<usize>; 64] = [None; 64];
        for i in 0..self.seq.len() {
            let uses = self.seq[i].uses();
            let mut producers: Vec<usize> = Vec::new();
            for b in 0..64 {
                if uses & (1 << b) != 0 {
                    if let Some(p) = last_writer[b] {
                        if p != i && !producers.contains(&p) {
                            producers.push(p);
                        }
                    }
                }
            }
            for p in producers {
                self.add_edge(self.last_fu_node(p), self.first_fu_node(i), 0, "register dep");
            }
            let defs = self.seq[i].defs();
            for b in 0..64 {
                if defs & (1 << b) != 0 {
                    last_writer[b] = Some(i);
                }
            }
        }
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId, latency: u32, label: &'static str) {
        self.edges.push(Edge {
            from,
            to,
            kind: EdgeKind::Solid,
            latency,
            label,
        });
    }

    /// Raise a node's extra occupancy.
    pub fn set_latency(&mut self, id: NodeId, latency: u32) {
        self.nodes[id].latency = latency;
    }

    pub fn fetch_node(&self, inst: usize) -> NodeId {
        self.inst_first[inst]
    }

    pub fn decode_node(&self, inst: usize) -> NodeId {
        self.inst_first[inst] + 1
    }

    pub fn first_fu_node(&self, inst: usize) -> NodeId {
        self.inst_first[inst] + 2
    }

    pub fn last_fu_node(&self, inst: usize) -> NodeId {
        self.inst_first[inst + 1] - 2
    }

    pub fn write_node(&self, inst: usize) -> NodeId {
        self.inst_first[inst + 1] - 1
    }

    /// Nodes of one functional unit's first sub-stage, in program order.
    pub fn fu_first_stage_nodes(&self, fu: usize) -> Vec<NodeId> {
        self.nodes_in_slot(fu, 0)
    }

    fn nodes_in_slot(&self, fu: usize, sub: usize) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| self.nodes[id].slot.fu == Some((fu, sub)))
            .collect()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn seq(&self) -> &'a [Inst] {
        self.seq
    }

    pub fn refs(&self) -> &PipelineRefs {
        &self.refs
    }

    /// Human readable name of a node's slot.
    pub fn slot_name(&self, id: NodeId) -> &str {
        let slot = self.nodes[id].slot;
        match slot.fu {
            Some((fu, sub)) => &self.proc.stages[slot.stage].fus[fu].stages[sub],
            None => &self.proc.stages[slot.stage].name,
        }
    }

    /// Plain-text dump of nodes and edges, for diagnostics.
    pub fn dump<W: std::io::Write>(&self, w: &mut W) -> std::io::Result<()> {
        for (i, inst) in self.seq.iter().enumerate() {
            writeln!(w, "{:#010x} {}", inst.addr, inst)?;
            for id in self.inst_first[i]..self.inst_first[i + 1] {
                let n = &self.nodes[id];
                if n.latency > 0 {
                    writeln!(w, "  [{}] {} +{}", id, self.slot_name(id), n.latency)?;
                } else {
                    writeln!(w, "  [{}] {}", id, self.slot_name(id))?;
                }
            }
        }
        for e in &self.edges {
            writeln!(w, "  {} -> {} ({}, +{})", e.from, e.to, e.label, e.latency)?;
        }
        Ok(())
    }
}
