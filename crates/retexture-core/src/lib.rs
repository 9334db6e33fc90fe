//! # Retexture Core
//!
//! Runtime pieces shared by the Retexture crates.
//!
//! - **Tasks**: worker pool for fire-and-forget I/O and encode work
//! - **Time**: session clocks, real and manual
//! - **Memory**: purge budgets driven by resident-size pressure

pub mod job;
pub mod memory;
pub mod time;

pub use job::{ShutdownMode, Task, TaskHandle, TaskKind, TaskPool, TaskPriority};
pub use memory::{CacheBudget, ResidentStats};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};
