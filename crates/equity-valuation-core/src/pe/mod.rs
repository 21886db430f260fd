pub mod lbo;
pub mod returns;
pub mod structure;
pub mod sweep;
