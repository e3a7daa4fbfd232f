//! CLI command implementations

pub mod completions;
pub mod graph;
pub mod init;
pub mod replace;
pub mod similar;
pub mod track;
pub mod where_used;
