//! Resource memoization
//!
//! - [`manager`] - single-flight, semaphore-bounded resource manager

pub mod manager;

pub use manager::{
    ResourceCategory, ResourceKey, ResourceManager, ResourceManagerStats, SharedResource,
};
