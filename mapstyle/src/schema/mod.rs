mod parser;
mod types;

pub use parser::{parse_snapshot, parse_snapshot_str};
pub use types::*;
