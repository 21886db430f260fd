use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::ValuationResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const STEP_THRESHOLD: Decimal = dec!(0.000000000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const MAX_BISECTION_ITERATIONS: u32 = 200;

/// Net Present Value of evenly spaced cash flows; index 0 is undiscounted.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> ValuationResult<Money> {
    if rate <= dec!(-1) {
        return Err(ValuationError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }
    npv_with_derivative(rate, cash_flows)
        .map(|(value, _)| value)
        .ok_or_else(|| ValuationError::DegenerateMath(format!("NPV overflow at rate {rate}")))
}

/// NPV and dNPV/dr, or `None` when an intermediate value leaves the
/// representable range.
fn npv_with_derivative(rate: Rate, cash_flows: &[Money]) -> Option<(Decimal, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }
    let mut discount = Decimal::ONE;
    let mut value = Decimal::ZERO;
    let mut derivative = Decimal::ZERO;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(one_plus_r)?;
        }
        let pv = cf.checked_div(discount)?;
        value = value.checked_add(pv)?;
        if t > 0 {
            let term = Decimal::from(t as i64).checked_mul(pv)?.checked_div(one_plus_r)?;
            derivative = derivative.checked_sub(term)?;
        }
    }
    Some((value, derivative))
}

/// Internal Rate of Return over annual, evenly spaced periods.
///
/// Newton-Raphson from `guess`; when that fails to settle, bisection over a
/// bracket with a sign change. Cash flows without both an outflow and an
/// inflow have no IRR; that and non-convergence yield `ConvergenceFailure`.
pub fn irr(cash_flows: &[Money], guess: Rate) -> ValuationResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(ValuationError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }
    let has_outflow = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    let has_inflow = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    if !(has_outflow && has_inflow) {
        return Err(ValuationError::ConvergenceFailure {
            function: "IRR (no sign change)".into(),
            iterations: 0,
            last_delta: cash_flows.iter().copied().sum(),
        });
    }

    match newton(cash_flows, guess) {
        Ok(rate) => Ok(rate),
        Err(_) => bisection(cash_flows),
    }
}

fn newton(cash_flows: &[Money], guess: Rate) -> ValuationResult<Rate> {
    let mut rate = guess;
    let mut last_delta = Decimal::MAX;

    for i in 0..MAX_IRR_ITERATIONS {
        let (npv_val, dnpv) = npv_with_derivative(rate, cash_flows).ok_or_else(|| {
            ValuationError::ConvergenceFailure {
                function: "IRR".into(),
                iterations: i,
                last_delta,
            }
        })?;
        last_delta = npv_val;

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }
        if dnpv.is_zero() {
            break;
        }

        let step = npv_val.checked_div(dnpv).ok_or_else(|| ValuationError::ConvergenceFailure {
            function: "IRR".into(),
            iterations: i,
            last_delta,
        })?;
        rate -= step;

        // Guard against divergence
        if rate < dec!(-0.99) {
            rate = dec!(-0.99);
        } else if rate > dec!(100.0) {
            rate = dec!(100.0);
        }

        if step.abs() < STEP_THRESHOLD {
            return Ok(rate);
        }
    }

    Err(ValuationError::ConvergenceFailure {
        function: "IRR".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta,
    })
}

fn bisection(cash_flows: &[Money]) -> ValuationResult<Rate> {
    let value_at = |r: Rate| npv_with_derivative(r, cash_flows).map(|(v, _)| v);

    // Long horizons push (1+r)^t outside Decimal range at the extremes, so
    // take the widest bounds that still evaluate.
    let lower = [dec!(-0.99), dec!(-0.95), dec!(-0.9), dec!(-0.75), dec!(-0.5), Decimal::ZERO]
        .into_iter()
        .find_map(|r| value_at(r).map(|v| (r, v)));
    let upper = [dec!(10), dec!(5), dec!(2), Decimal::ONE]
        .into_iter()
        .find_map(|r| value_at(r).map(|v| (r, v)));

    let failure = |iterations: u32, last_delta: Decimal| ValuationError::ConvergenceFailure {
        function: "IRR (bisection)".into(),
        iterations,
        last_delta,
    };

    let ((mut lo, mut f_lo), (mut hi, f_hi)) = match (lower, upper) {
        (Some(l), Some(h)) => (l, h),
        _ => return Err(failure(0, Decimal::MAX)),
    };
    if f_lo.is_sign_negative() == f_hi.is_sign_negative() {
        return Err(failure(0, f_lo));
    }

    for i in 0..MAX_BISECTION_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        let f_mid = value_at(mid).ok_or_else(|| failure(i, f_lo))?;
        if f_mid.abs() < CONVERGENCE_THRESHOLD || (hi - lo).abs() < STEP_THRESHOLD {
            return Ok(mid);
        }
        if f_mid.is_sign_negative() == f_lo.is_sign_negative() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(failure(MAX_BISECTION_ITERATIONS, f_lo))
}
