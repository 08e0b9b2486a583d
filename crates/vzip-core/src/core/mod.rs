pub mod dispatch;
pub mod partition;
pub mod ready_queue;
pub mod slot_table;
pub mod stage_pool;
pub mod sync;

pub use dispatch::DispatchCounter;
pub use partition::{PartitionStrategy, WorkPlan};
pub use ready_queue::ReadyQueue;
pub use slot_table::SlotTable;
pub use stage_pool::{
    Interrupt, PoolRuntimeSnapshot, StageAssignment, StageMeter, StagePool, StagePoolHandle,
    StageRole, StageRuntimeSnapshot,
};
pub use sync::{CancellationToken, WaitPolicy};
