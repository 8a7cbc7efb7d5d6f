//! データモデル

mod cluster;
mod distribution;

pub use cluster::*;
pub use distribution::*;
