//! Load calculator: resolves a load strategy plus the user's maxes into a weight.
//!
//! - `percent_of`: max x percentage, scaled by weekly and daily lookup modifiers
//! - `rpe_target`: one-rep max x RPE chart percentage, rounded to the plates

use crate::{
    rpe, DailyLookupEntry, Error, LoadStrategy, MaxType, Result, Rounding, RoundingDirection,
    WeeklyLookupEntry,
};
use std::collections::HashMap;

/// The user's current maxes for one read snapshot
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaxSnapshot {
    values: HashMap<(String, MaxType), f64>,
}

impl MaxSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lift_id: &str, max_type: MaxType, value: f64) {
        self.values.insert((lift_id.to_string(), max_type), value);
    }

    pub fn get(&self, lift_id: &str, max_type: MaxType) -> Option<f64> {
        self.values.get(&(lift_id.to_string(), max_type)).copied()
    }

    /// Like `get`, but a missing max is a validation error
    pub fn require(&self, lift_id: &str, max_type: MaxType) -> Result<f64> {
        self.get(lift_id, max_type).ok_or_else(|| {
            Error::Validation(format!("No {} recorded for lift '{}'", max_type, lift_id))
        })
    }
}

/// Everything the calculator needs besides the strategy itself
#[derive(Clone, Copy, Debug)]
pub struct LoadContext<'a> {
    pub maxes: &'a MaxSnapshot,
    pub weekly: Option<&'a WeeklyLookupEntry>,
    pub daily: Option<&'a DailyLookupEntry>,
    /// Used by schemes that need rounding when the strategy carries none
    pub default_rounding: Rounding,
}

impl<'a> LoadContext<'a> {
    pub fn new(maxes: &'a MaxSnapshot) -> Self {
        Self {
            maxes,
            weekly: None,
            daily: None,
            default_rounding: Rounding::default(),
        }
    }

    pub fn weekly_modifier(&self) -> f64 {
        self.weekly.map_or(100.0, |w| w.percentage_modifier)
    }

    pub fn daily_modifier(&self) -> f64 {
        self.daily.map_or(100.0, |d| d.percentage_modifier)
    }
}

/// Result of resolving a load strategy
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedLoad {
    pub weight: f64,
    /// Percentage of the referenced max before modifiers
    pub percentage: f64,
    /// Reps supplied by the weekly lookup, when the lookup key resolved one
    pub lookup_reps: Option<u32>,
}

impl Rounding {
    /// Round a weight to this increment in this direction
    pub fn apply(&self, weight: f64) -> Result<f64> {
        if !(self.increment.is_finite() && self.increment > 0.0) {
            return Err(Error::Validation(format!(
                "Rounding increment must be positive, got {}",
                self.increment
            )));
        }

        let quotient = weight / self.increment;
        // Snap float noise (80.00000001 / 2.5) before ceil/floor
        let snapped = if (quotient - quotient.round()).abs() < 1e-9 {
            quotient.round()
        } else {
            quotient
        };

        let steps = match self.direction {
            RoundingDirection::Nearest => snapped.round(),
            RoundingDirection::Up => snapped.ceil(),
            RoundingDirection::Down => snapped.floor(),
        };

        Ok(tidy(steps * self.increment))
    }
}

/// Strip float noise from a computed weight
pub(crate) fn tidy(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// Resolve a load strategy for a lift into a concrete weight
pub fn resolve(lift_id: &str, strategy: &LoadStrategy, ctx: &LoadContext<'_>) -> Result<ResolvedLoad> {
    match strategy {
        LoadStrategy::PercentOf {
            reference,
            percentage,
            lookup_key,
            rounding,
        } => {
            let max = ctx.maxes.require(lift_id, *reference)?;

            let (percentage, lookup_reps) = match (lookup_key, ctx.weekly) {
                (Some(key), Some(entry)) => match entry.percentages.get(*key) {
                    Some(looked_up) => (*looked_up, entry.reps.get(*key).copied()),
                    None => {
                        tracing::debug!(
                            "Lookup key {} not in week {} percentages, using flat {}%",
                            key,
                            entry.week_number,
                            percentage
                        );
                        (*percentage, None)
                    }
                },
                _ => (*percentage, None),
            };

            if percentage <= 0.0 {
                return Err(Error::Validation(format!(
                    "Percentage must be positive, got {}",
                    percentage
                )));
            }

            let weekly = ctx.weekly_modifier();
            let daily = ctx.daily_modifier();
            if weekly <= 0.0 || daily <= 0.0 {
                return Err(Error::Validation(format!(
                    "Lookup modifiers must be positive (weekly {}, daily {})",
                    weekly, daily
                )));
            }

            let raw = max * percentage / 100.0 * weekly / 100.0 * daily / 100.0;
            let weight = match rounding {
                Some(r) => r.apply(raw)?,
                None => tidy(raw),
            };

            tracing::debug!(
                "{}: {} {} x {}% (weekly {}%, daily {}%) = {}",
                lift_id,
                reference,
                max,
                percentage,
                weekly,
                daily,
                weight
            );

            Ok(ResolvedLoad {
                weight,
                percentage,
                lookup_reps,
            })
        }

        LoadStrategy::RpeTarget {
            target_reps,
            target_rpe,
            rounding_increment,
            rounding_direction,
        } => {
            let one_rm = ctx.maxes.require(lift_id, MaxType::OneRm)?;
            let percentage = rpe::percentage(*target_reps, *target_rpe)?;
            let rounding = Rounding {
                increment: *rounding_increment,
                direction: *rounding_direction,
            };
            let weight = rounding.apply(one_rm * percentage / 100.0)?;

            tracing::debug!(
                "{}: {} reps @ RPE {} = {}% of {} -> {}",
                lift_id,
                target_reps,
                target_rpe,
                percentage,
                one_rm,
                weight
            );

            Ok(ResolvedLoad {
                weight,
                percentage,
                lookup_reps: None,
            })
        }
    }
}
