//! Hardware description of the analyzed target.
//!
//! The pipeline is described as plain data: an ordered stage list, each stage
//! optionally carrying functional units, each unit its own sub-stage chain.
//! The graph builder resolves everything by name once per block and keeps
//! indices, never references into this structure.

use crate::timing::ArmInfo;

/// Stage names the locator binds. These come from the processor description,
/// not from this crate.
pub const STAGE_FETCH: &str = "Fetch";
pub const STAGE_DECODE: &str = "Decode";
pub const STAGE_EXE: &str = "EXE";
pub const STAGE_WRITE: &str = "Write";

/// Functional unit name prefixes under the EXE stage.
pub const FU_FLOAT_PREFIX: &str = "EXEC_F";
pub const FU_INT_PREFIX: &str = "EXEC_M4";

#[derive(Debug, Clone)]
pub struct FuDesc {
    /// Sub-stage names; the first one carries the unit's identity.
    pub stages: Vec<String>,
}

impl FuDesc {
    pub fn new<S: Into<String>>(stages: impl IntoIterator<Item = S>) -> Self {
        FuDesc {
            stages: stages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn first_stage(&self) -> &str {
        self.stages.first().map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone)]
pub struct StageDesc {
    pub name: String,
    pub fus: Vec<FuDesc>,
}

impl StageDesc {
    pub fn simple(name: &str) -> Self {
        StageDesc {
            name: name.to_string(),
            fus: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcDesc {
    pub stages: Vec<StageDesc>,
}

/// Memory feature of the target. The model carries no per-access latency
/// terms (they are folded into the instruction costs), but a target without
/// a memory description cannot be analyzed at all.
#[derive(Debug, Clone)]
pub struct MemDesc {
    pub name: String,
}

/// Cache feature. Its presence is a configuration error for this model.
#[derive(Debug, Clone)]
pub struct CacheDesc {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct TargetDesc {
    pub proc: ProcDesc,
    pub mem: Option<MemDesc>,
    pub cache: Option<CacheDesc>,
    /// Loader decode capability; absent when the program was loaded without
    /// arm support.
    pub arm: Option<ArmInfo>,
}

impl TargetDesc {
    /// The Cortex-M4F: three in-order stages around a split execute stage
    /// with one floating point and one integer unit.
    pub fn m4f() -> Self {
        TargetDesc {
            proc: ProcDesc {
                stages: vec![
                    StageDesc::simple(STAGE_FETCH),
                    StageDesc::simple(STAGE_DECODE),
                    StageDesc {
                        name: STAGE_EXE.to_string(),
                        fus: vec![
                            FuDesc::new(["EXEC_F"]),
                            FuDesc::new(["EXEC_M4"]),
                        ],
                    },
                    StageDesc::simple(STAGE_WRITE),
                ],
            },
            mem: Some(MemDesc {
                name: "sram".to_string(),
            }),
            cache: None,
            arm: Some(ArmInfo::default()),
        }
    }
}
