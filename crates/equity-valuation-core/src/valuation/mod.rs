pub mod dcf;
pub mod projection;
pub mod wacc;
