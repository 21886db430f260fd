use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::*;
use crate::ValuationResult;

/// Entry capital structure of a buyout: the purchase price funded by sponsor
/// equity and acquisition debt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LboStructure {
    pub purchase_price: Money,
    pub equity_ratio: Rate,
    pub equity_contribution: Money,
    pub debt: Money,
}

impl LboStructure {
    /// Split a purchase price into equity (`equity_ratio` of it) and debt.
    pub fn from_purchase_price(purchase_price: Money, equity_ratio: Rate) -> ValuationResult<Self> {
        if purchase_price <= Decimal::ZERO {
            return Err(ValuationError::invalid(
                "purchase_price",
                "Purchase price must be positive",
            ));
        }
        if equity_ratio <= Decimal::ZERO || equity_ratio > Decimal::ONE {
            return Err(ValuationError::invalid(
                "equity_ratio",
                format!("Equity ratio must be in (0, 1], got {equity_ratio}"),
            ));
        }
        let equity_contribution = purchase_price * equity_ratio;
        Ok(Self {
            purchase_price,
            equity_ratio,
            equity_contribution,
            debt: purchase_price - equity_contribution,
        })
    }

    /// Sources of funds: sponsor equity, then debt when there is any.
    pub fn sources(&self) -> Vec<(String, Money)> {
        let mut sources = vec![("Sponsor Equity".to_string(), self.equity_contribution)];
        if self.debt > Decimal::ZERO {
            sources.push(("Acquisition Debt".to_string(), self.debt));
        }
        sources
    }

    /// Entry debt over the given EBITDA; undefined for non-positive EBITDA.
    pub fn entry_leverage(&self, ebitda: Money) -> Option<Multiple> {
        if ebitda <= Decimal::ZERO {
            None
        } else {
            Some(self.debt / ebitda)
        }
    }
}
