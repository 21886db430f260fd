use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::assumptions::{AssumptionLog, Provenance};
use crate::config::WaccConfig;
use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::ValuationResult;

/// Inputs to the discount-rate estimate. Every field is optional; missing
/// values fall back to the configuration and are recorded as defaulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaccInput {
    /// Market value of equity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity_value: Option<Money>,
    /// Value of debt for the capital weights (net debt in the pipeline)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt_value: Option<Money>,
    /// Debt the interest accrues on; the cost-of-debt denominator, ahead of
    /// `debt_value`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_debt: Option<Money>,
    /// Interest expense, either sign; used with debt for the cost of debt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_expense: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<Rate>,
    /// Effective tax rate read from the statements; used when `tax_rate` is
    /// not supplied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_tax_rate: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_free_rate: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_risk_premium: Option<Rate>,
    /// Beta reported by the data provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_beta: Option<Decimal>,
    /// Caller-supplied beta replacing any observed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta_override: Option<Decimal>,
}

/// Output of the WACC estimate with a per-field audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaccResult {
    pub wacc: Rate,
    pub cost_of_equity: Rate,
    /// Pre-tax cost of debt
    pub cost_of_debt: Rate,
    pub after_tax_cost_of_debt: Rate,
    pub equity_weight: Rate,
    pub debt_weight: Rate,
    /// Levered beta used in CAPM
    pub beta: Decimal,
    /// Unlevered beta when the beta was re-levered to a target D/E
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlevered_beta: Option<Decimal>,
    pub risk_free_rate: Rate,
    pub market_risk_premium: Rate,
    pub tax_rate: Rate,
    pub audit: AssumptionLog,
}

/// Estimate the weighted average cost of capital.
///
/// Ke = Rf + β × MRP; WACC = Ke × We + Kd × (1 − t) × Wd.
///
/// Cost of debt is |interest| / debt when both are known and debt is
/// positive, where debt is `gross_debt` when given and `debt_value`
/// otherwise. With neither capital value known the configured 40/60 split is
/// used; with only one known the other is taken as zero.
pub fn estimate_wacc(
    input: &WaccInput,
    config: &WaccConfig,
) -> ValuationResult<ComputationOutput<WaccResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let mut audit = AssumptionLog::new();

    let risk_free_rate = supplied_or_default(
        &mut audit,
        "risk_free_rate",
        input.risk_free_rate,
        config.risk_free_rate,
    );
    let market_risk_premium = supplied_or_default(
        &mut audit,
        "market_risk_premium",
        input.market_risk_premium,
        config.market_risk_premium,
    );
    let tax_rate = match (input.tax_rate, input.observed_tax_rate) {
        (Some(t), _) => {
            audit.record("tax_rate", Provenance::Supplied, Some(t));
            t
        }
        (None, Some(t)) => {
            audit.record("tax_rate", Provenance::Observed, Some(t));
            t
        }
        (None, None) => {
            audit.record("tax_rate", Provenance::Defaulted, Some(config.tax_rate));
            config.tax_rate
        }
    };
    if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
        return Err(ValuationError::invalid(
            "tax_rate",
            "Tax rate must be between 0 and 1",
        ));
    }

    // --- Capital structure ---
    let (equity_weight, debt_weight) = compute_weights(input, config, &mut audit, &mut warnings)?;

    // --- Beta ---
    let (beta, unlevered_beta) = resolve_beta(
        input,
        config,
        tax_rate,
        equity_weight,
        debt_weight,
        &mut audit,
        &mut warnings,
    )?;

    // --- Cost of debt ---
    let (kd_debt, kd_basis) = match input.gross_debt {
        Some(gross) => (Some(gross), "gross debt"),
        None => (input.debt_value, "debt"),
    };
    let cost_of_debt = match (input.interest_expense, kd_debt) {
        (Some(interest), Some(debt)) if debt > Decimal::ZERO => {
            let kd = interest.abs() / debt;
            audit.record_with_note(
                "cost_of_debt",
                Provenance::Derived,
                Some(kd),
                format!("|interest expense| / {kd_basis}"),
            );
            kd
        }
        _ => {
            audit.record("cost_of_debt", Provenance::Defaulted, Some(config.cost_of_debt));
            config.cost_of_debt
        }
    };

    let cost_of_equity = risk_free_rate + beta * market_risk_premium;
    let after_tax_cost_of_debt = cost_of_debt * (Decimal::ONE - tax_rate);
    let wacc = cost_of_equity * equity_weight + after_tax_cost_of_debt * debt_weight;

    // --- Reasonableness warnings ---
    if beta > dec!(3.0) {
        warnings.push(format!(
            "High beta ({beta}): verify market data; betas above 3.0 are unusual"
        ));
    }
    if cost_of_debt > dec!(0.20) {
        warnings.push(format!(
            "Cost of debt of {cost_of_debt} exceeds 20%; check interest expense against debt"
        ));
    }
    if wacc > dec!(0.20) {
        warnings.push(format!(
            "WACC of {wacc} exceeds 20%; appropriate for high-risk situations only"
        ));
    }

    let output = WaccResult {
        wacc,
        cost_of_equity,
        cost_of_debt,
        after_tax_cost_of_debt,
        equity_weight,
        debt_weight,
        beta,
        unlevered_beta,
        risk_free_rate,
        market_risk_premium,
        tax_rate,
        audit,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "WACC via CAPM",
        input,
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn supplied_or_default(
    audit: &mut AssumptionLog,
    field: &str,
    supplied: Option<Decimal>,
    default: Decimal,
) -> Decimal {
    match supplied {
        Some(v) => {
            audit.record(field, Provenance::Supplied, Some(v));
            v
        }
        None => {
            audit.record(field, Provenance::Defaulted, Some(default));
            default
        }
    }
}

/// Returns (equity_weight, debt_weight).
fn compute_weights(
    input: &WaccInput,
    config: &WaccConfig,
    audit: &mut AssumptionLog,
    warnings: &mut Vec<String>,
) -> ValuationResult<(Rate, Rate)> {
    let (equity, debt) = match (input.equity_value, input.debt_value) {
        (None, None) => {
            audit.record_with_note(
                "equity_weight",
                Provenance::Defaulted,
                Some(config.default_equity_weight),
                "no equity or debt value supplied",
            );
            audit.record_with_note(
                "debt_weight",
                Provenance::Defaulted,
                Some(config.default_debt_weight),
                "no equity or debt value supplied",
            );
            return Ok((config.default_equity_weight, config.default_debt_weight));
        }
        (Some(e), Some(d)) => {
            audit.record("equity_value", Provenance::Supplied, Some(e));
            audit.record("debt_value", Provenance::Supplied, Some(d));
            (e, d)
        }
        (Some(e), None) => {
            audit.record("equity_value", Provenance::Supplied, Some(e));
            audit.record("debt_value", Provenance::Defaulted, Some(Decimal::ZERO));
            (e, Decimal::ZERO)
        }
        (None, Some(d)) => {
            audit.record("equity_value", Provenance::Defaulted, Some(Decimal::ZERO));
            audit.record("debt_value", Provenance::Supplied, Some(d));
            (Decimal::ZERO, d)
        }
    };

    let total = equity + debt;
    if total.is_zero() {
        return Err(ValuationError::invalid(
            "equity_value + debt_value",
            "Total capital is zero; weights are undefined",
        ));
    }
    let equity_weight = equity / total;
    let debt_weight = debt / total;
    if equity_weight < Decimal::ZERO || debt_weight < Decimal::ZERO {
        warnings.push(format!(
            "Negative capital weight (equity {equity_weight}, debt {debt_weight}); check inputs"
        ));
    }
    audit.record("equity_weight", Provenance::Derived, Some(equity_weight));
    audit.record("debt_weight", Provenance::Derived, Some(debt_weight));
    Ok((equity_weight, debt_weight))
}

/// Returns (levered_beta, Option<unlevered_beta>).
fn resolve_beta(
    input: &WaccInput,
    config: &WaccConfig,
    tax_rate: Rate,
    equity_weight: Rate,
    debt_weight: Rate,
    audit: &mut AssumptionLog,
    warnings: &mut Vec<String>,
) -> ValuationResult<(Decimal, Option<Decimal>)> {
    let beta = if let Some(b) = input.beta_override.or(config.beta_override) {
        audit.record("beta", Provenance::Overridden, Some(b));
        b
    } else if let Some(b) = input.observed_beta {
        audit.record("beta", Provenance::Observed, Some(b));
        b
    } else {
        audit.record("beta", Provenance::Defaulted, Some(config.beta));
        config.beta
    };

    let Some(target_de) = config.target_debt_equity else {
        return Ok((beta, None));
    };
    if target_de < Decimal::ZERO {
        return Err(ValuationError::invalid(
            "target_debt_equity",
            "Target D/E ratio cannot be negative",
        ));
    }
    if equity_weight <= Decimal::ZERO {
        warnings.push("Equity weight is not positive; beta not re-levered to target D/E".into());
        return Ok((beta, None));
    }

    let current_de = debt_weight / equity_weight;
    let unlevered = unlever_beta(beta, tax_rate, current_de)?;
    let relevered = relever_beta(unlevered, tax_rate, target_de);
    audit.record_with_note(
        "beta",
        Provenance::Derived,
        Some(relevered),
        format!("Hamada re-levered from {beta} at D/E {current_de} to D/E {target_de}"),
    );
    Ok((relevered, Some(unlevered)))
}

/// Unlever a beta using the Hamada equation.
///
/// Beta_U = Beta_L / (1 + (1 - t) * D/E)
pub fn unlever_beta(
    levered_beta: Decimal,
    tax_rate: Rate,
    debt_equity: Decimal,
) -> ValuationResult<Decimal> {
    let denom = Decimal::ONE + (Decimal::ONE - tax_rate) * debt_equity;
    if denom.is_zero() {
        return Err(ValuationError::DegenerateMath(
            "Hamada unlever denominator is zero".into(),
        ));
    }
    Ok(levered_beta / denom)
}

/// Re-lever a beta using the Hamada equation.
///
/// Beta_L = Beta_U * (1 + (1 - t) * D/E)
pub fn relever_beta(unlevered_beta: Decimal, tax_rate: Rate, debt_equity: Decimal) -> Decimal {
    unlevered_beta * (Decimal::ONE + (Decimal::ONE - tax_rate) * debt_equity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
