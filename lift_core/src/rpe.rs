//! RPE chart: reps x RPE to an implied percentage of the one-rep max.
//!
//! Whole-RPE columns are tabulated; half-RPE columns are the mean of their
//! neighbours, so the chart stays monotone along both axes.

use crate::{Error, Result};
use once_cell::sync::Lazy;

pub const MIN_REPS: u32 = 1;
pub const MAX_REPS: u32 = 12;
pub const MIN_RPE: f64 = 6.0;
pub const MAX_RPE: f64 = 10.0;

const REP_COLUMNS: usize = MAX_REPS as usize;

/// Whole-RPE columns from RPE 6 to RPE 10, reps 1..=12
const WHOLE_RPE_ROWS: [[f64; REP_COLUMNS]; 5] = [
    [86.0, 83.0, 80.0, 73.0, 71.0, 68.0, 65.0, 62.0, 59.0, 56.0, 53.0, 50.0],
    [89.0, 86.0, 83.0, 76.0, 74.0, 71.0, 68.0, 65.0, 62.0, 59.0, 56.0, 53.0],
    [92.0, 89.0, 86.0, 79.0, 77.0, 74.0, 71.0, 68.0, 65.0, 62.0, 59.0, 56.0],
    [95.0, 92.0, 89.0, 82.0, 80.0, 77.0, 74.0, 71.0, 68.0, 65.0, 62.0, 59.0],
    [100.0, 95.0, 92.0, 86.0, 83.0, 80.0, 77.0, 74.0, 71.0, 68.0, 65.0, 62.0],
];

/// Full chart in half-RPE steps (RPE 6.0, 6.5, ... 10.0), built once
static RPE_CHART: Lazy<Vec<[f64; REP_COLUMNS]>> = Lazy::new(|| {
    let mut rows = Vec::with_capacity(WHOLE_RPE_ROWS.len() * 2 - 1);
    for (i, row) in WHOLE_RPE_ROWS.iter().enumerate() {
        if i > 0 {
            let prev = &WHOLE_RPE_ROWS[i - 1];
            let mut half = [0.0; REP_COLUMNS];
            for (col, value) in half.iter_mut().enumerate() {
                *value = (prev[col] + row[col]) / 2.0;
            }
            rows.push(half);
        }
        rows.push(*row);
    }
    rows
});

/// Percentage of the one-rep max (0-100) for `reps` performed at `rpe`.
///
/// RPE must land on a half step between 6 and 10; reps between 1 and 12.
pub fn percentage(reps: u32, rpe: f64) -> Result<f64> {
    if !(MIN_REPS..=MAX_REPS).contains(&reps) {
        return Err(Error::Validation(format!(
            "RPE chart covers {}-{} reps, got {}",
            MIN_REPS, MAX_REPS, reps
        )));
    }

    let steps = (rpe - MIN_RPE) * 2.0;
    if !(0.0..=(MAX_RPE - MIN_RPE) * 2.0 + 1e-9).contains(&steps)
        || (steps - steps.round()).abs() > 1e-9
    {
        return Err(Error::Validation(format!(
            "RPE chart covers {}-{} in half steps, got {}",
            MIN_RPE, MAX_RPE, rpe
        )));
    }

    let row = &RPE_CHART[steps.round() as usize];
    Ok(row[(reps - 1) as usize])
}
