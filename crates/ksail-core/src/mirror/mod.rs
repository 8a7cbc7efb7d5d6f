//! ミラーレジストリ定義と解決ロジック

mod resolver;
mod spec;

pub use resolver::*;
pub use spec::*;
