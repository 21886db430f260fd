//! Named configuration for every component.
//!
//! All documented default constants live here. A `ValuationConfig` is passed
//! explicitly into each component; nothing reads ambient state.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::pe::lbo::{ExitBasis, RepaymentPolicy};
use crate::types::{Money, Multiple, Rate};
use crate::valuation::projection::{FcffMethod, WorkingCapitalMethod};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    pub projection: ProjectionConfig,
    pub wacc: WaccConfig,
    pub dcf: DcfConfig,
    pub sensitivity: SensitivityConfig,
    pub lbo: LboConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Tax rate applied to EBIT for NOPAT
    pub tax_rate: Rate,
    /// Capex as a fraction of revenue when no historical capex is used
    pub capex_pct_revenue: Rate,
    /// Hold the latest historical capex intensity when capex is reported
    pub use_historical_capex: bool,
    /// ΔNWC as a fraction of the year-over-year revenue change
    pub nwc_pct_revenue_change: Rate,
    pub working_capital: WorkingCapitalMethod,
    pub fcff_method: FcffMethod,
    /// Growth rates outside ±this bound are flagged as implausible
    pub plausible_growth_bound: Rate,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.21),
            capex_pct_revenue: dec!(0.05),
            use_historical_capex: true,
            nwc_pct_revenue_change: dec!(0.10),
            working_capital: WorkingCapitalMethod::ProjectedChangeOnly,
            fcff_method: FcffMethod::NopatPlusDepreciation,
            plausible_growth_bound: dec!(0.5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaccConfig {
    pub risk_free_rate: Rate,
    pub market_risk_premium: Rate,
    pub tax_rate: Rate,
    pub cost_of_debt: Rate,
    pub beta: Decimal,
    /// Capital split used when neither equity nor debt value is known
    pub default_equity_weight: Rate,
    pub default_debt_weight: Rate,
    /// Replaces any observed beta when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta_override: Option<Decimal>,
    /// Re-lever the beta to this D/E via Hamada when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_debt_equity: Option<Decimal>,
}

impl Default for WaccConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: dec!(0.035),
            market_risk_premium: dec!(0.06),
            tax_rate: dec!(0.21),
            cost_of_debt: dec!(0.05),
            beta: dec!(1.0),
            default_equity_weight: dec!(0.4),
            default_debt_weight: dec!(0.6),
            beta_override: None,
            target_debt_equity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcfConfig {
    pub terminal_growth: Rate,
    pub exit_multiple: Multiple,
    /// EBITDA ≈ FCFF / ratio when EBITDA is unavailable for exit multiples
    pub fcff_to_ebitda_ratio: Rate,
    /// Terminal share of EV above which a warning is raised
    pub terminal_share_warning: Rate,
    /// Spread between WACC and terminal growth below which a warning is raised
    pub min_wacc_growth_spread: Rate,
}

impl Default for DcfConfig {
    fn default() -> Self {
        Self {
            terminal_growth: dec!(0.02),
            exit_multiple: dec!(10),
            fcff_to_ebitda_ratio: dec!(0.7),
            terminal_share_warning: dec!(0.75),
            min_wacc_growth_spread: dec!(0.005),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityConfig {
    /// Step around the estimated WACC for grid rows
    pub wacc_step: Rate,
    /// Number of grid rows, centred on the estimated WACC
    pub wacc_points: u32,
    /// Terminal growth rates for grid columns
    pub terminal_growth_rates: Vec<Rate>,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            wacc_step: dec!(0.01),
            wacc_points: 3,
            terminal_growth_rates: vec![dec!(0.01), dec!(0.02), dec!(0.03)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LboConfig {
    pub equity_ratio: Rate,
    pub interest_rate: Rate,
    pub exit_multiple: Multiple,
    pub exit_basis: ExitBasis,
    pub repayment: RepaymentPolicy,
    pub sweep_equity_ratios: Vec<Rate>,
    pub sweep_interest_rates: Vec<Rate>,
    pub sweep_exit_multiples: Vec<Multiple>,
    /// Purchase price used when the caller asks for an LBO without one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_purchase_price: Option<Money>,
}

impl Default for LboConfig {
    fn default() -> Self {
        Self {
            equity_ratio: dec!(0.3),
            interest_rate: dec!(0.06),
            exit_multiple: dec!(10),
            exit_basis: ExitBasis::Ebitda,
            repayment: RepaymentPolicy::FullCashSweep,
            sweep_equity_ratios: vec![dec!(0.3), dec!(0.4), dec!(0.5)],
            sweep_interest_rates: vec![dec!(0.06), dec!(0.08)],
            sweep_exit_multiples: vec![dec!(8), dec!(10), dec!(12)],
            default_purchase_price: None,
        }
    }
}
