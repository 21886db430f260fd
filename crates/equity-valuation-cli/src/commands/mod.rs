pub mod analysis;
pub mod pe;
pub mod valuation;
