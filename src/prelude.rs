pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{Error, Result};
pub use crate::pool::{Spawner, ThreadPool};
pub use crate::queue::{Context, Task, TaskQueue};
pub use crate::supervisor::{ForkRole, ForkStatus, Supervisor};

pub use crate::{defer, enqueue, has_queue, perform};
