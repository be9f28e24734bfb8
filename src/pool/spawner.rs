//! Thread construction for pool workers.
//!
//! Pools never call `std::thread` directly; they go through a [`Spawner`] so
//! embedders can bring their own thread setup.

use crate::config::Config;
use std::io;
use std::thread::{self, JoinHandle};

/// Body of one worker thread.
pub type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

pub trait Spawner {
    /// Start the worker at `index` running `body`.
    fn spawn(&self, index: usize, body: WorkerBody) -> io::Result<JoinHandle<()>>;
}

/// Default spawner: named OS threads with an optional stack size.
#[derive(Debug, Clone)]
pub struct ThreadSpawner {
    name_prefix: String,
    stack_size: Option<usize>,
}

impl ThreadSpawner {
    pub fn new<S: Into<String>>(name_prefix: S) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            stack_size: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            name_prefix: config.thread_name_prefix.clone(),
            stack_size: config.stack_size,
        }
    }
}

impl Default for ThreadSpawner {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Spawner for ThreadSpawner {
    fn spawn(&self, index: usize, body: WorkerBody) -> io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(format!("{}-{}", self.name_prefix, index));

        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        builder.spawn(body)
    }
}
