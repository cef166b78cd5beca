//! Object and thread pools shared by the deserializer and the loader.

mod object_pool;
mod worker_pool;

pub use object_pool::*;
pub use worker_pool::*;
