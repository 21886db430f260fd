//! End-to-end valuation of one ticker.
//!
//! Statements → ratios → projection → net debt and market cap → WACC → DCF
//! → sensitivity grid → comparables → LBO → export. Every stage returns its
//! own warnings; the pipeline prefixes them with the stage name and carries
//! them into the final envelope.

pub mod provider;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::assumptions::{AssumptionLog, Provenance};
use crate::config::ValuationConfig;
use crate::error::ValuationError;
use crate::pe::lbo::{simulate_lbo, LboInput, LboResult};
use crate::pe::returns::{calculate_returns, ReturnsInput, ReturnsOutput};
use crate::pe::structure::LboStructure;
use crate::pe::sweep::{run_lbo_sweep, LboSweepInput, LboSweepRow};
use crate::ratios::{calculate_ratios, RatioRow};
use crate::scenarios::sensitivity::{build_dcf_sensitivity, centered_sweep, SensitivityGrid, SensitivityInput};
use crate::statements::{
    derive_gross_debt, derive_market_cap, derive_net_debt, derive_shares_outstanding, DerivedFigure,
};
use crate::types::*;
use crate::valuation::dcf::{value_dcf, DcfInput, DcfResult, TerminalKind, TerminalMethod};
use crate::valuation::projection::{project_cash_flows, ProjectionInput, ProjectionRow};
use crate::valuation::wacc::{estimate_wacc, WaccInput, WaccResult};
use crate::ValuationResult;

pub use provider::{
    CompanyData, ComparableCompany, ComparablesProvider, FinancialDataProvider, ReportExporter,
    StaticDataProvider,
};

/// One pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationRequest {
    pub ticker: String,
    /// Number of years to project
    pub years: u32,
    pub revenue_growth: Rate,
    /// Runs the LBO stages when present (or when the config has a default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<Money>,
    /// Exports the report here when an exporter is attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

/// LBO outputs for a given purchase price.
///
/// The two multiples differ when the schedule pays interim distributions:
/// `base_case.moic` is exit equity over the contribution, while
/// `returns.moic` counts interim distributions plus exit equity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LboReport {
    pub structure: LboStructure,
    /// Schedule and exit-equity MOIC
    pub base_case: LboResult,
    /// Total-value MOIC, IRR and cash-on-cash over the equity cash flows
    pub returns: ReturnsOutput,
    pub sweep: Vec<LboSweepRow>,
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationReport {
    pub ticker: String,
    pub ratios: Vec<RatioRow>,
    pub projection: Vec<ProjectionRow>,
    pub net_debt: DerivedFigure,
    pub market_cap: DerivedFigure,
    pub wacc: WaccResult,
    pub dcf: DcfResult,
    pub sensitivity: SensitivityGrid,
    pub comparables: Vec<ComparableCompany>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lbo: Option<LboReport>,
    /// Combined audit trail, scoped by stage
    pub assumptions: AssumptionLog,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,
}

/// Orchestrates the valuation stages over injected collaborators.
pub struct ValuationPipeline<'a> {
    provider: &'a dyn FinancialDataProvider,
    comparables: Option<&'a dyn ComparablesProvider>,
    exporter: Option<&'a dyn ReportExporter>,
    config: ValuationConfig,
}

impl<'a> ValuationPipeline<'a> {
    pub fn new(provider: &'a dyn FinancialDataProvider, config: ValuationConfig) -> Self {
        Self {
            provider,
            comparables: None,
            exporter: None,
            config,
        }
    }

    pub fn with_comparables(mut self, comparables: &'a dyn ComparablesProvider) -> Self {
        self.comparables = Some(comparables);
        self
    }

    pub fn with_exporter(mut self, exporter: &'a dyn ReportExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn config(&self) -> &ValuationConfig {
        &self.config
    }

    /// Run every stage for one ticker.
    ///
    /// Ratio, projection, WACC and DCF failures abort the run. Comparables
    /// failures degrade to an empty table with a warning. An exporter
    /// failure is an error.
    pub fn run(&self, request: &ValuationRequest) -> ValuationResult<ComputationOutput<ValuationReport>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();
        let mut audit = AssumptionLog::new();
        let ticker = request.ticker.trim();

        if ticker.is_empty() {
            return Err(ValuationError::invalid("ticker", "Ticker cannot be empty"));
        }
        info!(ticker, years = request.years, growth = %request.revenue_growth, "starting valuation");

        // --- Statements & ratios ---
        let statements = self.provider.statements(ticker)?;
        debug!(periods = statements.len(), "statements loaded");

        let ratios = calculate_ratios(&statements)?;
        absorb(&mut warnings, "ratios", ratios.warnings);
        let ratios = ratios.result;

        // --- Projection ---
        let projection = project_cash_flows(
            &ratios,
            &ProjectionInput {
                years: request.years,
                revenue_growth: request.revenue_growth,
            },
            &self.config.projection,
        )?;
        absorb(&mut warnings, "projection", projection.warnings);
        let projection = projection.result;
        audit.extend_scoped("projection", &projection.assumptions);
        debug!(years = projection.rows.len(), "cash flows projected");

        // --- Capital structure ---
        let net_debt = derive_net_debt(&statements);
        record_figure(&mut audit, "net_debt", &net_debt);

        let reported_cap = degrade(
            &mut warnings,
            "market_cap",
            "provider market cap",
            self.provider.market_cap(ticker),
        );
        let price = degrade(
            &mut warnings,
            "market_cap",
            "market price",
            self.provider.market_price(ticker),
        );
        let market_cap = derive_market_cap(&statements, reported_cap, price)?;
        record_figure(&mut audit, "market_cap", &market_cap);

        let wacc_debt = if net_debt.value < Decimal::ZERO {
            audit.record_with_note(
                "wacc_debt_value",
                Provenance::Derived,
                Some(Decimal::ZERO),
                format!("net cash position of {} floored at zero", -net_debt.value),
            );
            Decimal::ZERO
        } else {
            net_debt.value
        };

        let observed_beta = match self.provider.beta(ticker) {
            Ok(beta) => beta,
            Err(e) => {
                warn!(error = %e, "beta unavailable");
                warnings.push(format!("wacc: beta unavailable ({e}); using configured beta"));
                None
            }
        };

        // --- WACC ---
        // Interest accrues on gross debt; net debt only sets the weight.
        let latest = statements.latest();
        let gross_debt = derive_gross_debt(&statements);
        let interest_expense = gross_debt.as_ref().and(latest.interest_expense);
        let wacc = estimate_wacc(
            &WaccInput {
                equity_value: Some(market_cap.value),
                debt_value: Some(wacc_debt),
                gross_debt: gross_debt.map(|d| d.value),
                interest_expense,
                observed_tax_rate: latest.tax_rate,
                observed_beta,
                ..Default::default()
            },
            &self.config.wacc,
        )?;
        if let Some(observed) = latest.tax_rate {
            if observed != self.config.projection.tax_rate {
                warnings.push(format!(
                    "wacc: observed tax rate {observed} differs from the projection tax rate {}",
                    self.config.projection.tax_rate
                ));
            }
        }
        absorb(&mut warnings, "wacc", wacc.warnings);
        let wacc = wacc.result;
        audit.extend_scoped("wacc", &wacc.audit);
        info!(wacc = %wacc.wacc, beta = %wacc.beta, "discount rate estimated");

        // --- DCF ---
        let dcf = value_dcf(
            &DcfInput {
                projections: projection.rows.clone(),
                wacc: wacc.wacc,
                terminal: TerminalMethod::GordonGrowth {
                    growth: self.config.dcf.terminal_growth,
                },
                net_debt: Some(net_debt.value),
                shares_outstanding: derive_shares_outstanding(&statements).map(|s| s.value),
            },
            &self.config.dcf,
        )?;
        absorb(&mut warnings, "dcf", dcf.warnings);
        let dcf = dcf.result;
        audit.extend_scoped("dcf", &dcf.assumptions);
        info!(enterprise_value = %dcf.enterprise_value, equity_value = %dcf.equity_value, "DCF complete");

        // --- Sensitivity ---
        let sensitivity = build_dcf_sensitivity(
            &SensitivityInput {
                projections: projection.rows.clone(),
                discount_rates: centered_sweep(
                    wacc.wacc,
                    self.config.sensitivity.wacc_step,
                    self.config.sensitivity.wacc_points,
                ),
                terminal_parameters: self.config.sensitivity.terminal_growth_rates.clone(),
                terminal_kind: TerminalKind::Gordon,
            },
            &self.config.dcf,
        )?;
        absorb(&mut warnings, "sensitivity", sensitivity.warnings);
        let sensitivity = sensitivity.result;

        // --- Comparables ---
        let comparables = match self.comparables {
            Some(source) => match source.comparables(ticker) {
                Ok(peers) => peers,
                Err(e) => {
                    warn!(error = %e, "comparables unavailable");
                    warnings.push(format!("comparables: unavailable ({e})"));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        // --- LBO ---
        let purchase_price = request.purchase_price.or(self.config.lbo.default_purchase_price);
        let lbo = match purchase_price {
            Some(price) => Some(self.run_lbo_stage(price, &projection.rows, &mut warnings)?),
            None => {
                debug!("no purchase price; LBO skipped");
                None
            }
        };

        let mut report = ValuationReport {
            ticker: ticker.to_string(),
            ratios,
            projection: projection.rows,
            net_debt,
            market_cap,
            wacc,
            dcf,
            sensitivity,
            comparables,
            lbo,
            assumptions: audit,
            export_path: None,
        };

        // --- Export ---
        if let Some(path) = &request.output_path {
            match self.exporter {
                Some(exporter) => {
                    let written = exporter.export(&report, path)?;
                    info!(path = %written.display(), "report exported");
                    report.export_path = Some(written);
                }
                None => warnings.push(format!(
                    "export: no exporter configured; {} not written",
                    path.display()
                )),
            }
        }

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Equity valuation pipeline (ratios, projection, WACC, DCF, LBO)",
            request,
            warnings,
            elapsed,
            report,
        ))
    }

    fn run_lbo_stage(
        &self,
        purchase_price: Money,
        projections: &[ProjectionRow],
        warnings: &mut Vec<String>,
    ) -> ValuationResult<LboReport> {
        let cfg = &self.config.lbo;
        let structure = LboStructure::from_purchase_price(purchase_price, cfg.equity_ratio)?;

        let base = simulate_lbo(&LboInput {
            projections: projections.to_vec(),
            initial_debt: structure.debt,
            equity_contribution: structure.equity_contribution,
            interest_rate: cfg.interest_rate,
            repayment: cfg.repayment,
            exit_year: None,
            exit_multiple: cfg.exit_multiple,
            exit_basis: cfg.exit_basis,
        })?;
        absorb(warnings, "lbo", base.warnings);
        let base_case = base.result;

        let returns = calculate_returns(&ReturnsInput::from(&base_case))?;
        absorb(warnings, "returns", returns.warnings);

        let sweep = run_lbo_sweep(&LboSweepInput {
            projections: projections.to_vec(),
            purchase_price,
            equity_ratios: cfg.sweep_equity_ratios.clone(),
            interest_rates: cfg.sweep_interest_rates.clone(),
            exit_multiples: cfg.sweep_exit_multiples.clone(),
            repayment: cfg.repayment,
            exit_basis: cfg.exit_basis,
            exit_year: None,
        })?;
        absorb(warnings, "lbo_sweep", sweep.warnings);
        info!(moic = %base_case.moic, scenarios = sweep.result.len(), "LBO complete");

        Ok(LboReport {
            structure,
            base_case,
            returns: returns.result,
            sweep: sweep.result,
        })
    }
}

fn absorb(warnings: &mut Vec<String>, stage: &str, stage_warnings: Vec<String>) {
    warnings.extend(stage_warnings.into_iter().map(|w| format!("{stage}: {w}")));
}

/// A failed optional lookup becomes a warning and falls through as `None`.
fn degrade<T>(
    warnings: &mut Vec<String>,
    stage: &str,
    what: &str,
    lookup: ValuationResult<Option<T>>,
) -> Option<T> {
    lookup.unwrap_or_else(|e| {
        warn!(error = %e, "{what} unavailable");
        warnings.push(format!("{stage}: {what} unavailable ({e})"));
        None
    })
}

fn record_figure(audit: &mut AssumptionLog, field: &str, figure: &DerivedFigure) {
    audit.record_with_note(field, figure.provenance, Some(figure.value), figure.source.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::lbo::RepaymentPolicy;
    use crate::statements::{FinancialStatementRow, FinancialStatements};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::path::Path;

    fn statements() -> FinancialStatements {
        let rows = [(2022, dec!(900)), (2023, dec!(1000))]
            .into_iter()
            .map(|(year, revenue)| {
                let mut r = FinancialStatementRow::new(NaiveDate::from_ymd_opt(year, 12, 31).unwrap());
                r.revenue = Some(revenue);
                r.ebitda = Some(revenue * dec!(0.25));
                r.ebit = Some(revenue * dec!(0.2));
                r.net_income = Some(revenue * dec!(0.12));
                r.interest_expense = Some(dec!(-20));
                r.total_debt = Some(dec!(400));
                r.cash_and_equivalents = Some(dec!(100));
                r.stockholders_equity = Some(dec!(800));
                r.total_assets = Some(dec!(1600));
                r.current_assets = Some(dec!(500));
                r.current_liabilities = Some(dec!(300));
                r.inventory = Some(dec!(100));
                r.basic_average_shares = Some(dec!(100));
                r
            })
            .collect();
        FinancialStatements::new(rows).unwrap()
    }

    fn provider() -> StaticDataProvider {
        let mut data = CompanyData::new(statements());
        data.price = Some(dec!(30));
        data.beta = Some(dec!(1.2));
        StaticDataProvider::new().with_company("ACME", data)
    }

    fn request() -> ValuationRequest {
        ValuationRequest {
            ticker: "ACME".into(),
            years: 5,
            revenue_growth: dec!(0.05),
            purchase_price: None,
            output_path: None,
        }
    }

    struct FailingComparables;

    impl ComparablesProvider for FailingComparables {
        fn comparables(&self, _ticker: &str) -> ValuationResult<Vec<ComparableCompany>> {
            Err(ValuationError::Provider("timeout".into()))
        }
    }

    struct FailingExporter;

    impl ReportExporter for FailingExporter {
        fn export(&self, _report: &ValuationReport, _path: &Path) -> ValuationResult<PathBuf> {
            Err(ValuationError::Export("disk full".into()))
        }
    }

    #[test]
    fn test_run_without_lbo() {
        let p = provider();
        let out = ValuationPipeline::new(&p, ValuationConfig::default()).run(&request()).unwrap();
        let report = &out.result;
        assert_eq!(report.projection.len(), 5);
        assert_eq!(report.net_debt.value, dec!(300));
        // 30 × 100 shares
        assert_eq!(report.market_cap.value, dec!(3000));
        assert_eq!(report.wacc.beta, dec!(1.2));
        assert_eq!(report.dcf.equity_value, report.dcf.enterprise_value - dec!(300));
        assert_eq!(report.sensitivity.discount_rates.len(), 3);
        assert!(report.lbo.is_none());
    }

    #[test]
    fn test_centre_of_grid_matches_dcf() {
        let p = provider();
        let out = ValuationPipeline::new(&p, ValuationConfig::default()).run(&request()).unwrap();
        let report = &out.result;
        // Middle row is the estimated WACC, middle column the configured 2%
        assert_eq!(report.sensitivity.cell(1, 1), Some(report.dcf.enterprise_value));
    }

    #[test]
    fn test_lbo_runs_with_purchase_price() {
        let p = provider();
        let mut req = request();
        req.purchase_price = Some(dec!(2500));
        let out = ValuationPipeline::new(&p, ValuationConfig::default()).run(&req).unwrap();
        let lbo = out.result.lbo.as_ref().unwrap();
        assert_eq!(lbo.structure.equity_contribution, dec!(750));
        assert_eq!(lbo.sweep.len(), 18);
        assert_eq!(lbo.base_case.schedule.len(), 5);
    }

    #[test]
    fn test_comparables_failure_is_warning() {
        let p = provider();
        let out = ValuationPipeline::new(&p, ValuationConfig::default())
            .with_comparables(&FailingComparables)
            .run(&request())
            .unwrap();
        assert!(out.result.comparables.is_empty());
        assert!(out.warnings.iter().any(|w| w.starts_with("comparables:")));
    }

    #[test]
    fn test_exporter_failure_is_error() {
        let p = provider();
        let mut req = request();
        req.output_path = Some(PathBuf::from("/tmp/unused"));
        let err = ValuationPipeline::new(&p, ValuationConfig::default())
            .with_exporter(&FailingExporter)
            .run(&req)
            .unwrap_err();
        assert!(matches!(err, ValuationError::Export(_)));
    }

    #[test]
    fn test_net_cash_floored_for_wacc_only() {
        let mut data = CompanyData::new(statements());
        data.market_cap = Some(dec!(3000));
        let mut rows = data.statements.rows().to_vec();
        for r in &mut rows {
            r.cash_and_equivalents = Some(dec!(600));
        }
        data.statements = FinancialStatements::new(rows).unwrap();
        let p = StaticDataProvider::new().with_company("ACME", data);

        let out = ValuationPipeline::new(&p, ValuationConfig::default()).run(&request()).unwrap();
        let report = &out.result;
        assert_eq!(report.net_debt.value, dec!(-200));
        assert_eq!(report.wacc.debt_weight, Decimal::ZERO);
        assert_eq!(report.dcf.equity_value, report.dcf.enterprise_value + dec!(200));
        assert_eq!(
            report.assumptions.provenance_of("wacc_debt_value"),
            Some(Provenance::Derived)
        );
    }

    /// Statement data from the static provider; every market-cap lookup fails.
    struct FlakyMarketCap(StaticDataProvider);

    impl FinancialDataProvider for FlakyMarketCap {
        fn statements(&self, ticker: &str) -> ValuationResult<FinancialStatements> {
            self.0.statements(ticker)
        }

        fn beta(&self, ticker: &str) -> ValuationResult<Option<Decimal>> {
            self.0.beta(ticker)
        }

        fn market_price(&self, ticker: &str) -> ValuationResult<Option<Money>> {
            self.0.market_price(ticker)
        }

        fn market_cap(&self, _ticker: &str) -> ValuationResult<Option<Money>> {
            Err(ValuationError::Provider("key_stats timeout".into()))
        }
    }

    fn with_rows(edit: impl Fn(&mut FinancialStatementRow)) -> StaticDataProvider {
        let mut rows = statements().rows().to_vec();
        rows.iter_mut().for_each(|r| edit(r));
        let mut data = CompanyData::new(FinancialStatements::new(rows).unwrap());
        data.price = Some(dec!(30));
        StaticDataProvider::new().with_company("ACME", data)
    }

    #[test]
    fn test_market_cap_lookup_failure_falls_back_to_price() {
        let p = FlakyMarketCap(provider());
        let out = ValuationPipeline::new(&p, ValuationConfig::default()).run(&request()).unwrap();
        assert_eq!(out.result.market_cap.value, dec!(3000));
        assert_eq!(out.result.market_cap.source, "price_x_shares");
        assert!(out
            .warnings
            .iter()
            .any(|w| w.starts_with("market_cap:") && w.contains("key_stats timeout")));
    }

    #[test]
    fn test_cost_of_debt_uses_gross_debt_when_cash_rich() {
        let p = with_rows(|r| r.cash_and_equivalents = Some(dec!(390)));
        let out = ValuationPipeline::new(&p, ValuationConfig::default()).run(&request()).unwrap();
        let report = &out.result;
        assert_eq!(report.net_debt.value, dec!(10));
        // 20 / 400 gross, not 20 / 10 net
        assert_eq!(report.wacc.cost_of_debt, dec!(0.05));
        assert_eq!(report.wacc.debt_weight, dec!(10) / dec!(3010));
        assert!(!out.warnings.iter().any(|w| w.contains("Cost of debt")));
    }

    #[test]
    fn test_interest_without_debt_fields_uses_default_cost_of_debt() {
        let p = with_rows(|r| {
            r.total_debt = None;
            r.net_debt = Some(dec!(50));
        });
        let out = ValuationPipeline::new(&p, ValuationConfig::default()).run(&request()).unwrap();
        let wacc = &out.result.wacc;
        assert_eq!(wacc.cost_of_debt, ValuationConfig::default().wacc.cost_of_debt);
        assert_eq!(wacc.audit.provenance_of("cost_of_debt"), Some(Provenance::Defaulted));
    }

    #[test]
    fn test_observed_tax_rate_is_audited_and_mismatch_warned() {
        let p = with_rows(|r| r.tax_rate = Some(dec!(0.25)));
        let out = ValuationPipeline::new(&p, ValuationConfig::default()).run(&request()).unwrap();
        let report = &out.result;
        assert_eq!(report.wacc.tax_rate, dec!(0.25));
        assert_eq!(
            report.assumptions.provenance_of("wacc.tax_rate"),
            Some(Provenance::Observed)
        );
        assert!(out
            .warnings
            .iter()
            .any(|w| w.starts_with("wacc: observed tax rate 0.25")));
    }

    #[test]
    fn test_lbo_multiples_with_interim_distributions() {
        let p = provider();
        let mut config = ValuationConfig::default();
        config.lbo.repayment = RepaymentPolicy::FractionalSweep { fraction: dec!(0.5) };
        let mut req = request();
        req.purchase_price = Some(dec!(2500));
        let out = ValuationPipeline::new(&p, config).run(&req).unwrap();
        let lbo = out.result.lbo.as_ref().unwrap();
        let base = &lbo.base_case;
        let contribution = lbo.structure.equity_contribution;

        assert!(base.cumulative_equity_cash_flow > Decimal::ZERO);
        assert_eq!(base.moic, base.final_equity / contribution);
        let total_value = (base.final_equity + base.cumulative_equity_cash_flow) / contribution;
        assert!((lbo.returns.moic - total_value).abs() < dec!(0.0000001));
        assert!(lbo.returns.moic > base.moic);
        assert!((lbo.returns.cash_on_cash - base.moic).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_missing_market_cap_is_fatal() {
        let p = StaticDataProvider::new().with_company("ACME", CompanyData::new(statements()));
        let err = ValuationPipeline::new(&p, ValuationConfig::default())
            .run(&request())
            .unwrap_err();
        assert!(matches!(err, ValuationError::MissingData { .. }));
    }
}
