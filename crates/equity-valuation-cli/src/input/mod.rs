pub mod config;
pub mod file;
pub mod statements;
pub mod stdin;
