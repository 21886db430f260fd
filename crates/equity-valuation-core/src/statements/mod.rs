//! Normalized financial-statement table and the figures derived from it.

pub mod derive;
pub mod table;

pub use derive::{
    derive_gross_debt, derive_market_cap, derive_net_debt, derive_shares_outstanding, DerivedFigure,
};
pub use table::{FinancialStatementRow, FinancialStatements, StatementField};
