use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::DcfConfig;
use crate::error::ValuationError;
use crate::types::*;
use crate::valuation::dcf::{compute_dcf, ordered_projections, DcfInput, TerminalKind};
use crate::valuation::projection::ProjectionRow;
use crate::ValuationResult;

/// Input for a WACC × terminal-parameter DCF grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityInput {
    pub projections: Vec<ProjectionRow>,
    /// Grid rows
    pub discount_rates: Vec<Rate>,
    /// Grid columns: growth rates for Gordon, multiples for exit multiple
    pub terminal_parameters: Vec<Decimal>,
    pub terminal_kind: TerminalKind,
}

/// Enterprise value per (discount rate, terminal parameter) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityGrid {
    pub discount_rates: Vec<Rate>,
    pub terminal_parameters: Vec<Decimal>,
    pub terminal_kind: TerminalKind,
    /// matrix[i][j] = EV at discount_rates[i], terminal_parameters[j];
    /// `None` where that DCF is degenerate
    pub matrix: Vec<Vec<Option<Money>>>,
}

impl SensitivityGrid {
    pub fn cell(&self, row: usize, col: usize) -> Option<Money> {
        self.matrix.get(row)?.get(col).copied().flatten()
    }
}

/// `points` values spaced by `step` and centred on `center`.
pub fn centered_sweep(center: Decimal, step: Decimal, points: u32) -> Vec<Decimal> {
    let offset = Decimal::from(points.saturating_sub(1)) / dec!(2);
    (0..points)
        .map(|i| center + (Decimal::from(i) - offset) * step)
        .collect()
}

/// Build a DCF sensitivity grid, one valuation per cell.
///
/// Structural problems with the projections fail the whole grid. A cell
/// whose own DCF fails is left undefined and named in the warnings.
pub fn build_dcf_sensitivity(
    input: &SensitivityInput,
    config: &DcfConfig,
) -> ValuationResult<ComputationOutput<SensitivityGrid>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.discount_rates.is_empty() {
        return Err(ValuationError::invalid(
            "discount_rates",
            "At least one discount rate is required",
        ));
    }
    if input.terminal_parameters.is_empty() {
        return Err(ValuationError::invalid(
            "terminal_parameters",
            "At least one terminal parameter is required",
        ));
    }
    let rows = ordered_projections(&input.projections)?;

    let cells: Vec<(Rate, Decimal)> = input
        .discount_rates
        .iter()
        .flat_map(|w| input.terminal_parameters.iter().map(move |p| (*w, *p)))
        .collect();
    let evaluated = evaluate_cells(&rows, &cells, input.terminal_kind, config);

    let width = input.terminal_parameters.len();
    let mut matrix: Vec<Vec<Option<Money>>> = Vec::with_capacity(input.discount_rates.len());
    for (chunk_cells, chunk_values) in cells.chunks(width).zip(evaluated.chunks(width)) {
        let mut row = Vec::with_capacity(width);
        for ((wacc, param), value) in chunk_cells.iter().zip(chunk_values) {
            match value {
                Ok(ev) => row.push(Some(*ev)),
                Err(e) => {
                    warnings.push(format!(
                        "Cell (wacc {wacc}, {} {param}) undefined: {e}",
                        input.terminal_kind
                    ));
                    row.push(None);
                }
            }
        }
        matrix.push(row);
    }

    let output = SensitivityGrid {
        discount_rates: input.discount_rates.clone(),
        terminal_parameters: input.terminal_parameters.clone(),
        terminal_kind: input.terminal_kind,
        matrix,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "DCF sensitivity grid (WACC x terminal parameter)",
        &serde_json::json!({
            "years": rows.len(),
            "discount_rates": input.discount_rates,
            "terminal_parameters": input.terminal_parameters,
            "terminal_kind": input.terminal_kind,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn cell_enterprise_value(
    rows: &[ProjectionRow],
    wacc: Rate,
    parameter: Decimal,
    kind: TerminalKind,
    config: &DcfConfig,
) -> ValuationResult<Money> {
    let input = DcfInput {
        projections: Vec::new(),
        wacc,
        terminal: kind.with_parameter(parameter),
        net_debt: None,
        shares_outstanding: None,
    };
    // Per-cell warnings are not surfaced; only failures are
    let mut discarded = Vec::new();
    compute_dcf(rows, &input, config, &mut discarded).map(|r| r.enterprise_value)
}

#[cfg(feature = "parallel")]
fn evaluate_cells(
    rows: &[ProjectionRow],
    cells: &[(Rate, Decimal)],
    kind: TerminalKind,
    config: &DcfConfig,
) -> Vec<ValuationResult<Money>> {
    use rayon::prelude::*;

    cells
        .par_iter()
        .map(|(wacc, param)| cell_enterprise_value(rows, *wacc, *param, kind, config))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn evaluate_cells(
    rows: &[ProjectionRow],
    cells: &[(Rate, Decimal)],
    kind: TerminalKind,
    config: &DcfConfig,
) -> Vec<ValuationResult<Money>> {
    cells
        .iter()
        .map(|(wacc, param)| cell_enterprise_value(rows, *wacc, *param, kind, config))
        .collect()
}
