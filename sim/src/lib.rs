mod arch;
mod builder;
mod graph;
mod hardware;
pub mod isa;
mod loader;
mod timing;
mod utils;

pub use arch::M4fGraph;
pub use builder::{BlockTimer, BlockTimerOption};
pub use graph::{locate, BlockTime, DefaultRules, EdgeKind, EdgeRules, ExeGraph};
pub use hardware::{CacheDesc, FuDesc, MemDesc, ProcDesc, StageDesc, TargetDesc};
pub use loader::parse_listing;
pub use timing::{m4f_cycle_table, ArmInfo, CycleTable, M4fTime, OpClass};
