pub mod batch;
pub mod chunks;
pub mod common;
pub mod map;
pub mod variables;
