//! Collaborator ports of the pipeline: market data in, comparables in,
//! reports out. Concrete transports and file formats live with the caller.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ValuationError;
use crate::pipeline::ValuationReport;
use crate::statements::FinancialStatements;
use crate::types::{Money, Multiple};
use crate::ValuationResult;

/// Source of statements and market quotes for a ticker.
pub trait FinancialDataProvider: Send + Sync {
    fn statements(&self, ticker: &str) -> ValuationResult<FinancialStatements>;

    /// Observed equity beta, if the provider publishes one
    fn beta(&self, ticker: &str) -> ValuationResult<Option<Decimal>>;

    fn market_price(&self, ticker: &str) -> ValuationResult<Option<Money>>;

    fn market_cap(&self, ticker: &str) -> ValuationResult<Option<Money>>;
}

/// Trading multiples of a peer company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparableCompany {
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pe: Option<Multiple>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ev_ebitda: Option<Multiple>,
}

/// Source of peer multiples. An empty table is a valid answer.
pub trait ComparablesProvider: Send + Sync {
    fn comparables(&self, ticker: &str) -> ValuationResult<Vec<ComparableCompany>>;
}

/// Writes a finished report somewhere and returns where it went.
pub trait ReportExporter: Send + Sync {
    fn export(&self, report: &ValuationReport, path: &Path) -> ValuationResult<PathBuf>;
}

// ---------------------------------------------------------------------------
// In-memory provider
// ---------------------------------------------------------------------------

/// Everything the pipeline needs to know about one company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyData {
    pub statements: FinancialStatements,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Money>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comparables: Vec<ComparableCompany>,
}

impl CompanyData {
    pub fn new(statements: FinancialStatements) -> Self {
        Self {
            statements,
            beta: None,
            price: None,
            market_cap: None,
            comparables: Vec::new(),
        }
    }
}

/// Provider backed by a fixed map of tickers, loadable from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticDataProvider {
    companies: HashMap<String, CompanyData>,
}

impl StaticDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_company(mut self, ticker: impl Into<String>, data: CompanyData) -> Self {
        self.insert(ticker, data);
        self
    }

    pub fn insert(&mut self, ticker: impl Into<String>, data: CompanyData) {
        self.companies.insert(ticker.into(), data);
    }

    fn company(&self, ticker: &str) -> ValuationResult<&CompanyData> {
        self.companies
            .iter()
            .find(|(symbol, _)| symbol.eq_ignore_ascii_case(ticker))
            .map(|(_, data)| data)
            .ok_or_else(|| ValuationError::Provider(format!("Unknown ticker '{ticker}'")))
    }
}

impl FinancialDataProvider for StaticDataProvider {
    fn statements(&self, ticker: &str) -> ValuationResult<FinancialStatements> {
        Ok(self.company(ticker)?.statements.clone())
    }

    fn beta(&self, ticker: &str) -> ValuationResult<Option<Decimal>> {
        Ok(self.company(ticker)?.beta)
    }

    fn market_price(&self, ticker: &str) -> ValuationResult<Option<Money>> {
        Ok(self.company(ticker)?.price)
    }

    fn market_cap(&self, ticker: &str) -> ValuationResult<Option<Money>> {
        Ok(self.company(ticker)?.market_cap)
    }
}

impl ComparablesProvider for StaticDataProvider {
    fn comparables(&self, ticker: &str) -> ValuationResult<Vec<ComparableCompany>> {
        Ok(self.company(ticker)?.comparables.clone())
    }
}
