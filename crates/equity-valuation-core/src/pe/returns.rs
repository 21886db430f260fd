use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::pe::lbo::LboResult;
use crate::types::*;
use crate::ValuationResult;

/// Input for sponsor returns over annual cash flows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsInput {
    /// Annual equity cash flows (index 0 = initial investment, negative)
    pub cash_flows: Vec<Money>,
    /// Equity invested at entry
    pub entry_equity: Money,
    /// Equity received at exit
    pub exit_equity: Money,
}

impl From<&LboResult> for ReturnsInput {
    fn from(result: &LboResult) -> Self {
        Self {
            cash_flows: result.equity_cash_flows.clone(),
            entry_equity: result
                .equity_cash_flows
                .first()
                .map(|cf| -*cf)
                .unwrap_or(Decimal::ZERO),
            exit_equity: result.final_equity,
        }
    }
}

/// Output of returns calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsOutput {
    /// Internal Rate of Return, undefined when the flows have none
    pub irr: Option<Rate>,
    /// Total returned / total invested, interim distributions included
    pub moic: Multiple,
    /// Exit equity / entry equity
    pub cash_on_cash: Multiple,
    pub total_invested: Money,
    pub total_returned: Money,
    /// Holding period in years
    pub holding_period: Decimal,
}

/// Calculate sponsor returns: IRR, MOIC, Cash-on-Cash.
pub fn calculate_returns(input: &ReturnsInput) -> ValuationResult<ComputationOutput<ReturnsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.entry_equity <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "entry_equity",
            "Entry equity must be positive",
        ));
    }

    // Totals come from the cash flows when available, otherwise from
    // entry/exit equity directly
    let (total_invested, total_returned) = if input.cash_flows.is_empty() {
        (input.entry_equity, input.exit_equity)
    } else {
        let invested = input
            .cash_flows
            .iter()
            .filter(|cf| cf.is_sign_negative())
            .map(|cf| cf.abs())
            .sum::<Decimal>();
        let returned = input
            .cash_flows
            .iter()
            .filter(|cf| cf.is_sign_positive())
            .sum::<Decimal>();
        (invested, returned)
    };

    if total_invested.is_zero() {
        return Err(ValuationError::DegenerateMath(
            "Total invested is zero; MOIC undefined".into(),
        ));
    }

    let moic = total_returned / total_invested;
    let cash_on_cash = input.exit_equity / input.entry_equity;

    let holding_period = match input.cash_flows.len() {
        0 | 1 => {
            warnings.push("Fewer than 2 cash flows; holding period set to 0".into());
            Decimal::ZERO
        }
        n => Decimal::from((n - 1) as i64),
    };

    let irr = if input.cash_flows.len() >= 2 {
        match crate::time_value::irr(&input.cash_flows, dec!(0.10)) {
            Ok(r) => Some(r),
            Err(e) => {
                warnings.push(format!("IRR undefined: {e}"));
                None
            }
        }
    } else {
        None
    };

    let output = ReturnsOutput {
        irr,
        moic,
        cash_on_cash,
        total_invested,
        total_returned,
        holding_period,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sponsor returns: IRR, MOIC, Cash-on-Cash",
        &serde_json::json!({
            "entry_equity": input.entry_equity.to_string(),
            "exit_equity": input.exit_equity.to_string(),
            "periods": input.cash_flows.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_moic_includes_interim_distributions() {
        let input = ReturnsInput {
            cash_flows: vec![dec!(-100), dec!(50), dec!(50), dec!(150)],
            entry_equity: dec!(100),
            exit_equity: dec!(150),
        };
        let result = calculate_returns(&input).unwrap();
        // MOIC = (50+50+150) / 100 = 2.5
        assert_eq!(result.result.moic, dec!(2.5));
        assert_eq!(result.result.cash_on_cash, dec!(1.5));
        assert_eq!(result.result.holding_period, dec!(3));
    }

    #[test]
    fn test_cash_on_cash_without_flows() {
        let input = ReturnsInput {
            cash_flows: vec![],
            entry_equity: dec!(200),
            exit_equity: dec!(500),
        };
        let result = calculate_returns(&input).unwrap();
        assert_eq!(result.result.cash_on_cash, dec!(2.5));
        assert!(result.result.irr.is_none());
    }

    #[test]
    fn test_irr_calculation() {
        let input = ReturnsInput {
            cash_flows: vec![dec!(-1000), dec!(400), dec!(400), dec!(400)],
            entry_equity: dec!(1000),
            exit_equity: dec!(400),
        };
        let result = calculate_returns(&input).unwrap();
        let irr_val = result.result.irr.unwrap();
        // IRR ~9.7%
        assert!((irr_val - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_zero_entry_equity_error() {
        let input = ReturnsInput {
            cash_flows: vec![],
            entry_equity: dec!(0),
            exit_equity: dec!(100),
        };
        assert!(calculate_returns(&input).is_err());
    }
}
