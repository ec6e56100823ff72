//! Background work, cooperative main-thread steps and LOD decisions

pub mod stop;
pub mod priority;
pub mod work_queue;
pub mod step_queue;
pub mod lod;

pub use stop::{StopToken, TokenState};
pub use priority::{DRAFT_PRIORITY_BOOST, level_priority, priority_from_distance};
pub use work_queue::{Job, ManualWorkQueue, ThreadedWorkQueue, WorkId, WorkItem, WorkQueue};
pub use step_queue::{QueuedStep, StepId, StepQueue, StepStatus};
pub use lod::{LevelReadiness, LodChoice, LodInputs, LodPolicy, decide_lod, main_apply_wanted};
