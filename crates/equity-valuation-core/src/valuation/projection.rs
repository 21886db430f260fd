use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::assumptions::{AssumptionLog, Provenance};
use crate::config::ProjectionConfig;
use crate::error::ValuationError;
use crate::ratios::RatioRow;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How the change in net working capital is projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingCapitalMethod {
    /// ΔNWC = fraction × change between projected revenues; zero in year 1
    ProjectedChangeOnly,
    /// As above, but year 1 is measured against the last historical revenue
    FromLastHistorical,
    /// Fraction taken from the observed ΔNWC / ΔRevenue of the two latest periods
    HistoricalIntensity,
}

/// Free cash flow to firm formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FcffMethod {
    /// NOPAT − capex − ΔNWC
    NopatLessCapex,
    /// NOPAT + depreciation − capex − ΔNWC
    NopatPlusDepreciation,
    /// EBITDA − capex
    EbitdaLessCapex,
}

/// One projected year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionRow {
    pub year: i32,
    pub revenue: Money,
    /// Absent when rows are supplied without EBITDA; the projector always sets it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ebitda: Option<Money>,
    pub ebit: Money,
    pub depreciation: Money,
    pub capex: Money,
    pub nopat: Money,
    pub delta_nwc: Money,
    pub fcff: Money,
    #[serde(default)]
    pub capex_is_estimate: bool,
    #[serde(default)]
    pub delta_nwc_is_estimate: bool,
}

impl ProjectionRow {
    /// Minimal row carrying only a year and its FCFF, with other figures zero.
    pub fn from_fcff(year: i32, fcff: Money) -> Self {
        Self {
            year,
            revenue: Decimal::ZERO,
            ebitda: None,
            ebit: Decimal::ZERO,
            depreciation: Decimal::ZERO,
            capex: Decimal::ZERO,
            nopat: Decimal::ZERO,
            delta_nwc: Decimal::ZERO,
            fcff,
            capex_is_estimate: false,
            delta_nwc_is_estimate: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionInput {
    /// Number of years to project
    pub years: u32,
    /// Annual revenue growth
    pub revenue_growth: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub rows: Vec<ProjectionRow>,
    pub assumptions: AssumptionLog,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Project free cash flow to firm from the latest historical ratios.
///
/// Revenue compounds from the last historical value. EBITDA and EBIT margins
/// are held at their latest level. Capex follows the latest historical
/// intensity when reported, else the configured share of revenue.
pub fn project_cash_flows(
    ratios: &[RatioRow],
    input: &ProjectionInput,
    config: &ProjectionConfig,
) -> ValuationResult<ComputationOutput<Projection>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let mut log = AssumptionLog::new();

    // --- Validation ---
    if input.years == 0 {
        return Err(ValuationError::invalid(
            "years",
            "Projection requires at least one year",
        ));
    }
    if input.revenue_growth < -Decimal::ONE {
        return Err(ValuationError::invalid(
            "revenue_growth",
            format!("Growth below -100% is meaningless, got {}", input.revenue_growth),
        ));
    }
    if input.revenue_growth.abs() > config.plausible_growth_bound {
        warnings.push(format!(
            "Revenue growth of {} is outside ±{}; verify the assumption",
            input.revenue_growth, config.plausible_growth_bound
        ));
    }
    if config.tax_rate < Decimal::ZERO || config.tax_rate > Decimal::ONE {
        return Err(ValuationError::invalid(
            "tax_rate",
            "Tax rate must be between 0 and 1",
        ));
    }

    let latest = ratios.last().ok_or_else(|| {
        ValuationError::InsufficientData("Projection requires at least one ratio row".into())
    })?;
    let base_revenue = latest
        .revenue
        .ok_or_else(|| ValuationError::missing("revenue", "latest historical period"))?;
    let ebitda_margin = latest
        .ebitda_margin
        .ok_or_else(|| ValuationError::missing("ebitda_margin", "latest historical period"))?;
    let ebit_margin = latest
        .ebit_margin
        .ok_or_else(|| ValuationError::missing("ebit_margin", "latest historical period"))?;

    log.record("base_revenue", Provenance::Observed, Some(base_revenue));
    log.record("revenue_growth", Provenance::Supplied, Some(input.revenue_growth));
    log.record("ebitda_margin", Provenance::Observed, Some(ebitda_margin));
    log.record("ebit_margin", Provenance::Observed, Some(ebit_margin));
    let defaults = ProjectionConfig::default();
    record_configured(&mut log, "tax_rate", config.tax_rate, defaults.tax_rate);

    // --- Capex intensity ---
    let historical_capex_pct = latest
        .capex
        .filter(|_| config.use_historical_capex && !base_revenue.is_zero())
        .map(|capex| capex.abs() / base_revenue);
    let (capex_pct, capex_is_estimate) = match historical_capex_pct {
        Some(pct) => {
            log.record_with_note(
                "capex_pct_revenue",
                Provenance::Derived,
                Some(pct),
                "latest historical capex / revenue",
            );
            (pct, false)
        }
        None => {
            record_configured(
                &mut log,
                "capex_pct_revenue",
                config.capex_pct_revenue,
                defaults.capex_pct_revenue,
            );
            (config.capex_pct_revenue, true)
        }
    };

    // --- Working capital intensity ---
    let (nwc_pct, delta_nwc_is_estimate) = match config.working_capital {
        WorkingCapitalMethod::HistoricalIntensity => {
            let pct = historical_nwc_intensity(ratios)?;
            log.record_with_note(
                "nwc_pct_revenue_change",
                Provenance::Derived,
                Some(pct),
                "ΔNWC / ΔRevenue over the two latest periods",
            );
            (pct, false)
        }
        _ => {
            record_configured(
                &mut log,
                "nwc_pct_revenue_change",
                config.nwc_pct_revenue_change,
                defaults.nwc_pct_revenue_change,
            );
            (config.nwc_pct_revenue_change, true)
        }
    };
    let mut prior_revenue = match config.working_capital {
        WorkingCapitalMethod::ProjectedChangeOnly => None,
        _ => Some(base_revenue),
    };

    // --- Project ---
    let tax_keep = Decimal::ONE - config.tax_rate;
    let growth_factor = Decimal::ONE + input.revenue_growth;
    let mut revenue = base_revenue;
    let mut rows = Vec::with_capacity(input.years as usize);

    for i in 1..=input.years {
        revenue = revenue.checked_mul(growth_factor).ok_or_else(|| {
            ValuationError::DegenerateMath(format!("Revenue overflow in projection year {i}"))
        })?;
        let ebitda = revenue * ebitda_margin;
        let ebit = revenue * ebit_margin;
        let depreciation = ebitda - ebit;
        let capex = revenue * capex_pct;
        let nopat = ebit * tax_keep;
        let delta_nwc = prior_revenue
            .map(|prev| nwc_pct * (revenue - prev))
            .unwrap_or(Decimal::ZERO);

        let fcff = match config.fcff_method {
            FcffMethod::NopatLessCapex => nopat - capex - delta_nwc,
            FcffMethod::NopatPlusDepreciation => nopat + depreciation - capex - delta_nwc,
            FcffMethod::EbitdaLessCapex => ebitda - capex,
        };

        rows.push(ProjectionRow {
            year: latest.fiscal_year + i as i32,
            revenue,
            ebitda: Some(ebitda),
            ebit,
            depreciation,
            capex,
            nopat,
            delta_nwc,
            fcff,
            capex_is_estimate,
            delta_nwc_is_estimate,
        });
        prior_revenue = Some(revenue);
    }

    if rows.iter().any(|r| r.fcff < Decimal::ZERO) {
        warnings.push("Projected FCFF is negative in at least one year".into());
    }

    let output = Projection {
        rows,
        assumptions: log,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        &format!("FCFF projection ({:?})", config.fcff_method),
        &serde_json::json!({
            "input": input,
            "working_capital": config.working_capital,
            "fcff_method": config.fcff_method,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// A setting equal to the built-in default is an assumption; anything else
/// was chosen by the caller's configuration.
fn record_configured(log: &mut AssumptionLog, field: &str, value: Rate, default: Rate) {
    if value == default {
        log.record(field, Provenance::Defaulted, Some(value));
    } else {
        log.record_with_note(field, Provenance::Supplied, Some(value), "configured");
    }
}

fn historical_nwc_intensity(ratios: &[RatioRow]) -> ValuationResult<Rate> {
    let [previous, latest] = match ratios {
        [.., a, b] => [a, b],
        _ => {
            return Err(ValuationError::InsufficientData(
                "Historical working-capital intensity needs two periods".into(),
            ))
        }
    };
    let nwc = |r: &RatioRow| {
        r.net_working_capital
            .ok_or_else(|| ValuationError::missing("net_working_capital", format!("period {}", r.period_end)))
    };
    let revenue = |r: &RatioRow| {
        r.revenue
            .ok_or_else(|| ValuationError::missing("revenue", format!("period {}", r.period_end)))
    };

    let delta_revenue = revenue(latest)? - revenue(previous)?;
    if delta_revenue.is_zero() {
        return Err(ValuationError::DegenerateMath(
            "Revenue unchanged between the two latest periods; NWC intensity undefined".into(),
        ));
    }
    Ok((nwc(latest)? - nwc(previous)?) / delta_revenue)
}
