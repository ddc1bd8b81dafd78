//! Per-run driver: configuration checks, the unknown-instruction log and
//! one [`M4fGraph`] per basic block.
//!
//! Blocks are timed strictly sequentially; the unknown-address set lives
//! here so duplicate reports are suppressed across all blocks of one run.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};

use crate::arch::M4fGraph;
use crate::graph::BlockTime;
use crate::hardware::TargetDesc;
use crate::isa::{Addr, Inst};
use crate::timing::ArmInfo;

/// Options for one analysis run.
#[derive(Debug, Default, Clone)]
pub struct BlockTimerOption {
    write_log: bool,
    log_path: Option<PathBuf>,
}

impl BlockTimerOption {
    pub fn set_write_log(mut self, write_log: bool) -> Self {
        self.write_log = write_log;
        self
    }

    /// Override the default `<program>.log` location.
    pub fn set_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}

/// Times the basic blocks of one program on the Cortex-M4F.
#[derive(Debug)]
pub struct BlockTimer {
    target: TargetDesc,
    log: Option<File>,
    unknown_inst_addrs: BTreeSet<Addr>,
}

impl BlockTimer {
    /// Validate the target description and open the run log. Every failure
    /// here is a configuration error; there is nothing to retry.
    pub fn new(target: TargetDesc, program: &Path, opt: BlockTimerOption) -> Result<Self> {
        ArmInfo::from_target(&target)?;
        ensure!(target.mem.is_some(), "memory feature not found");
        if target.cache.is_some() {
            bail!("cache support is not implemented for the Cortex M4");
        }

        let log = if opt.write_log {
            let path = opt
                .log_path
                .unwrap_or_else(|| PathBuf::from(format!("{}.log", program.display())));
            Some(open_log(&path, program)?)
        } else {
            None
        };

        Ok(BlockTimer {
            target,
            log,
            unknown_inst_addrs: BTreeSet::new(),
        })
    }

    /// Time one basic block.
    pub fn time_block(&mut self, seq: &[Inst]) -> Result<BlockTime> {
        let out = self.log.as_mut().map(|f| f as &mut dyn Write);
        let graph = M4fGraph::build(seq, &self.target, out, &mut self.unknown_inst_addrs)?;
        let time = graph.solve()?;
        tracing::debug!(cycles = time.cycles, insts = seq.len(), "block timed");
        Ok(time)
    }

    /// Build one block's graph without solving it (graph dumps).
    pub fn build_graph<'a>(&'a mut self, seq: &'a [Inst]) -> Result<M4fGraph<'a>> {
        let out = self.log.as_mut().map(|f| f as &mut dyn Write);
        M4fGraph::build(seq, &self.target, out, &mut self.unknown_inst_addrs)
    }

    /// Addresses reported to the log so far this run.
    pub fn unknown_inst_addrs(&self) -> &BTreeSet<Addr> {
        &self.unknown_inst_addrs
    }
}

/// Open the run log for appending; the header goes in only when the file is
/// created, otherwise a blank line separates the runs.
fn open_log(path: &Path, program: &Path) -> Result<File> {
    let write_header = !path.exists();
    let mut f = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("could not open log file `{}`", path.display()))?;
    if write_header {
        writeln!(f, "########################################################")?;
        writeln!(f, "# Static analysis on {}", program.display())?;
        writeln!(f, "# Overestimated instructions")?;
        writeln!(f, "# Address (hex); Instruction")?;
        writeln!(f, "########################################################")?;
    } else {
        writeln!(f)?;
    }
    Ok(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::CacheDesc;

    fn inst(raw: u32, wide: bool, addr: Addr) -> Inst {
        Inst::decode(addr, raw, wide)
    }

    #[test]
    fn cache_configuration_is_rejected() {
        let mut target = TargetDesc::m4f();
        target.cache = Some(CacheDesc { name: "icache".into() });
        let err = BlockTimer::new(target, Path::new("prog.elf"), BlockTimerOption::default())
            .unwrap_err();
        assert!(err.to_string().contains("cache support"));
    }

    #[test]
    fn missing_memory_feature_is_rejected() {
        let mut target = TargetDesc::m4f();
        target.mem = None;
        assert!(
            BlockTimer::new(target, Path::new("prog.elf"), BlockTimerOption::default()).is_err()
        );
    }

    #[test]
    fn times_a_block_without_a_log() {
        let target = TargetDesc::m4f();
        let mut timer =
            BlockTimer::new(target, Path::new("prog.elf"), BlockTimerOption::default()).unwrap();
        let seq = vec![inst(0x2001, false, 0x100)];
        assert_eq!(timer.time_block(&seq).unwrap().cycles, 4);
    }

    #[test]
    fn log_header_and_dedup_across_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("prog.elf.log");
        let opt = BlockTimerOption::default()
            .set_write_log(true)
            .set_log_path(&log_path);
        let mut timer = BlockTimer::new(TargetDesc::m4f(), Path::new("prog.elf"), opt).unwrap();

        // the same unknown encoding appears in two blocks at one address
        let a = vec![inst(0xDE00, false, 0x100), inst(0x2001, false, 0x102)];
        let b = vec![inst(0xDE00, false, 0x100)];
        timer.time_block(&a).unwrap();
        timer.time_block(&b).unwrap();
        drop(timer);

        let text = std::fs::read_to_string(&log_path).unwrap();
        assert!(text.starts_with("####"));
        assert!(text.contains("# Static analysis on prog.elf"));
        assert_eq!(text.matches("0x00000100;").count(), 1);

        // a second run appends a separator, not a second header
        let opt = BlockTimerOption::default()
            .set_write_log(true)
            .set_log_path(&log_path);
        let mut timer = BlockTimer::new(TargetDesc::m4f(), Path::new("prog.elf"), opt).unwrap();
        timer.time_block(&b).unwrap();
        drop(timer);
        let text = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(text.matches("# Static analysis").count(), 1);
        // fresh run, fresh set: the address is reported again
        assert_eq!(text.matches("0x00000100;").count(), 2);
    }
}
