//! Configuration sources, lowest precedence first.

pub mod container_file;
pub mod environment;
pub mod global_file;
