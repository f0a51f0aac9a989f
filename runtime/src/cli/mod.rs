//! CLI subcommand implementations for the motion-probe binary.

pub mod analyze_cmd;
pub mod categories_cmd;
pub mod inspect_cmd;
pub mod output;
