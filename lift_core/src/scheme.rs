//! Set-scheme expander: turns a set scheme into concrete, ordered sets.
//!
//! Every scheme resolves to at least one set. AMRAP sets always close out
//! their scheme and always count as work sets. Fatigue-drop schemes are not
//! precomputed: [`FatigueDropSequence`] yields one set at a time from the
//! outcome of the previous one.

use crate::load::{self, LoadContext};
use crate::{
    rpe, Error, LoadStrategy, PlannedSet, Result, Rounding, RoundingDirection, SetScheme,
};

/// Expand a prescription's scheme into its sets.
///
/// Fatigue-drop schemes expand to their opening set only; later sets come
/// from [`FatigueDropSequence`] as outcomes are reported.
pub fn expand(
    lift_id: &str,
    strategy: &LoadStrategy,
    scheme: &SetScheme,
    ctx: &LoadContext<'_>,
) -> Result<Vec<PlannedSet>> {
    match scheme {
        SetScheme::Fixed { sets, reps } => {
            require_sets("fixed", *sets)?;
            let load = load::resolve(lift_id, strategy, ctx)?;
            let reps = load.lookup_reps.unwrap_or(*reps);

            Ok((1..=*sets)
                .map(|n| work_set(n, load.weight, reps, false))
                .collect())
        }

        SetScheme::Amrap { sets, min_reps } => {
            require_sets("amrap", *sets)?;
            let load = load::resolve(lift_id, strategy, ctx)?;
            let min_reps = load.lookup_reps.unwrap_or(*min_reps);

            // Only the closing set is open-ended
            Ok((1..=*sets)
                .map(|n| work_set(n, load.weight, min_reps, n == *sets))
                .collect())
        }

        SetScheme::Greyskull {
            fixed_sets,
            fixed_reps,
            amrap_sets,
            min_amrap_reps,
        } => {
            require_sets("greyskull", fixed_sets + amrap_sets)?;
            let load = load::resolve(lift_id, strategy, ctx)?;

            let fixed = (1..=*fixed_sets).map(|n| work_set(n, load.weight, *fixed_reps, false));
            let amrap = (1..=*amrap_sets)
                .map(|n| work_set(fixed_sets + n, load.weight, *min_amrap_reps, true));
            Ok(fixed.chain(amrap).collect())
        }

        SetScheme::Ramp {
            steps,
            work_set_threshold,
        } => {
            if steps.is_empty() {
                return Err(Error::Validation("Ramp scheme has no steps".into()));
            }

            let reference = match strategy {
                LoadStrategy::PercentOf { reference, .. } => *reference,
                LoadStrategy::RpeTarget { .. } => {
                    return Err(Error::Validation(
                        "Ramp scheme needs a percent_of load strategy".into(),
                    ))
                }
            };
            let max = ctx.maxes.require(lift_id, reference)?;
            let base = max * ctx.daily_modifier() / 100.0;

            let mut sets = Vec::with_capacity(steps.len());
            for (i, step) in steps.iter().enumerate() {
                if step.percentage <= 0.0 {
                    return Err(Error::Validation(format!(
                        "Ramp step {} has non-positive percentage {}",
                        i + 1,
                        step.percentage
                    )));
                }

                let raw = base * step.percentage / 100.0;
                let weight = match strategy.rounding() {
                    Some(r) => r.apply(raw)?,
                    None => load::tidy(raw),
                };

                sets.push(PlannedSet {
                    set_number: i as u32 + 1,
                    weight,
                    target_reps: step.reps,
                    // Nominal percentage only; modifiers never promote a warm-up
                    is_work_set: step.percentage >= *work_set_threshold,
                    is_amrap: false,
                });
            }
            Ok(sets)
        }

        SetScheme::FatigueDrop { .. } => {
            let mut sequence = FatigueDropSequence::start(lift_id, scheme, strategy, ctx)?;
            let first = sequence.next_set(None)?.ok_or_else(|| {
                Error::Validation("Fatigue drop scheme produced no opening set".into())
            })?;
            Ok(vec![first])
        }
    }
}

fn require_sets(scheme: &str, sets: u32) -> Result<()> {
    if sets == 0 {
        return Err(Error::Validation(format!(
            "{} scheme must prescribe at least one set",
            scheme
        )));
    }
    Ok(())
}

fn work_set(set_number: u32, weight: f64, target_reps: u32, is_amrap: bool) -> PlannedSet {
    PlannedSet {
        set_number,
        weight,
        target_reps,
        is_work_set: true,
        is_amrap,
    }
}

// ============================================================================
// Fatigue Drop
// ============================================================================

/// What the lifter reported after a set
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SetOutcome {
    pub reps: u32,
    pub rpe: f64,
}

/// Lazy, finite, non-restartable sequence of fatigue-drop sets.
///
/// The opening set is `rpe_target(target_reps, start_rpe)`. Each set is
/// allowed an even share of the climb from `start_rpe` to `stop_rpe`; a set
/// reported above its share (or short on reps) drops the next set's weight
/// by `drop_percent`. The sequence ends at `max_sets` or once a reported RPE
/// reaches `stop_rpe`. Feeding the same outcomes always yields the same sets.
#[derive(Clone, Debug)]
pub struct FatigueDropSequence {
    target_reps: u32,
    start_rpe: f64,
    stop_rpe: f64,
    drop_percent: f64,
    max_sets: u32,
    rounding: Rounding,
    opening_weight: f64,
    last: Option<PlannedSet>,
    finished: bool,
}

impl FatigueDropSequence {
    /// Prepare the sequence for a fatigue-drop scheme
    pub fn start(
        lift_id: &str,
        scheme: &SetScheme,
        strategy: &LoadStrategy,
        ctx: &LoadContext<'_>,
    ) -> Result<Self> {
        let SetScheme::FatigueDrop {
            target_reps,
            start_rpe,
            stop_rpe,
            drop_percent,
            max_sets,
        } = scheme
        else {
            return Err(Error::Validation(format!(
                "Expected a fatigue_drop scheme, got {:?}",
                scheme
            )));
        };

        require_sets("fatigue_drop", *max_sets)?;
        if stop_rpe < start_rpe {
            return Err(Error::Validation(format!(
                "Stop RPE {} is below start RPE {}",
                stop_rpe, start_rpe
            )));
        }
        if !(0.0..1.0).contains(drop_percent) {
            return Err(Error::Validation(format!(
                "Drop percent must be a fraction in [0, 1), got {}",
                drop_percent
            )));
        }

        let rounding = strategy.rounding().unwrap_or(ctx.default_rounding);
        let one_rm = ctx.maxes.require(lift_id, crate::MaxType::OneRm)?;
        let percentage = rpe::percentage(*target_reps, *start_rpe)?;
        let opening_weight = rounding.apply(one_rm * percentage / 100.0)?;

        Ok(Self {
            target_reps: *target_reps,
            start_rpe: *start_rpe,
            stop_rpe: *stop_rpe,
            drop_percent: *drop_percent,
            max_sets: *max_sets,
            rounding,
            opening_weight,
            last: None,
            finished: false,
        })
    }

    /// RPE climb each set is allowed before it counts as extra fatigue
    fn allowance(&self) -> f64 {
        if self.max_sets > 1 {
            (self.stop_rpe - self.start_rpe) / f64::from(self.max_sets - 1)
        } else {
            0.0
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Yield the next set.
    ///
    /// Pass `None` for the opening set and the outcome of the previous set
    /// for every set after it. Returns `Ok(None)` once the sequence is done.
    pub fn next_set(&mut self, outcome: Option<&SetOutcome>) -> Result<Option<PlannedSet>> {
        if self.finished {
            return Ok(None);
        }

        let next = match (&self.last, outcome) {
            (None, None) => PlannedSet {
                set_number: 1,
                weight: self.opening_weight,
                target_reps: self.target_reps,
                is_work_set: true,
                is_amrap: false,
            },
            (None, Some(_)) => {
                return Err(Error::Validation(
                    "Outcome reported before the opening set was issued".into(),
                ))
            }
            (Some(last), None) => {
                return Err(Error::Validation(format!(
                    "Outcome of set {} is required before the next set",
                    last.set_number
                )))
            }
            (Some(last), Some(outcome)) => {
                if outcome.rpe >= self.stop_rpe - 1e-9 || last.set_number >= self.max_sets {
                    tracing::debug!(
                        "Fatigue drop finished after set {} (RPE {})",
                        last.set_number,
                        outcome.rpe
                    );
                    self.finished = true;
                    return Ok(None);
                }

                let expected =
                    self.start_rpe + f64::from(last.set_number - 1) * self.allowance();
                let fatigued = outcome.rpe > expected + 1e-9 || outcome.reps < self.target_reps;

                // Round drops down so the load falls even below half an increment
                let weight = if fatigued {
                    let down = Rounding {
                        direction: RoundingDirection::Down,
                        ..self.rounding
                    };
                    down.apply(last.weight * (1.0 - self.drop_percent))?
                } else {
                    last.weight
                };

                PlannedSet {
                    set_number: last.set_number + 1,
                    weight,
                    target_reps: self.target_reps,
                    is_work_set: true,
                    is_amrap: false,
                }
            }
        };

        self.last = Some(next.clone());
        Ok(Some(next))
    }

    /// Rebuild the sequence from a recorded outcome history.
    ///
    /// Returns every set the history implies, including the pending next set
    /// when the sequence is not finished.
    pub fn replay(mut self, history: &[SetOutcome]) -> Result<Vec<PlannedSet>> {
        let mut sets = Vec::new();
        if let Some(first) = self.next_set(None)? {
            sets.push(first);
        }
        for outcome in history {
            match self.next_set(Some(outcome))? {
                Some(set) => sets.push(set),
                None => break,
            }
        }
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::MaxSnapshot;
    use crate::{DailyLookupEntry, MaxType, RampStep};

    fn maxes() -> MaxSnapshot {
        let mut maxes = MaxSnapshot::new();
        maxes.insert("squat", MaxType::TrainingMax, 200.0);
        maxes.insert("squat", MaxType::OneRm, 200.0);
        maxes
    }

    fn tm_percent(percentage: f64) -> LoadStrategy {
        LoadStrategy::PercentOf {
            reference: MaxType::TrainingMax,
            percentage,
            lookup_key: None,
            rounding: None,
        }
    }

    fn rpe_strategy() -> LoadStrategy {
        LoadStrategy::RpeTarget {
            target_reps: 5,
            target_rpe: 8.0,
            rounding_increment: 2.5,
            rounding_direction: RoundingDirection::Nearest,
        }
    }

    fn fatigue_scheme(max_sets: u32) -> SetScheme {
        SetScheme::FatigueDrop {
            target_reps: 5,
            start_rpe: 8.0,
            stop_rpe: 9.5,
            drop_percent: 0.05,
            max_sets,
        }
    }

    #[test]
    fn test_fixed_sets_are_identical_work_sets() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);
        let scheme = SetScheme::Fixed { sets: 5, reps: 5 };

        let sets = expand("squat", &tm_percent(80.0), &scheme, &ctx).unwrap();
        assert_eq!(sets.len(), 5);
        for (i, set) in sets.iter().enumerate() {
            assert_eq!(set.set_number, i as u32 + 1);
            assert_eq!(set.weight, 160.0);
            assert_eq!(set.target_reps, 5);
            assert!(set.is_work_set);
            assert!(!set.is_amrap);
        }
    }

    #[test]
    fn test_amrap_flags_only_final_set() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);
        let scheme = SetScheme::Amrap {
            sets: 3,
            min_reps: 5,
        };

        let sets = expand("squat", &tm_percent(85.0), &scheme, &ctx).unwrap();
        assert_eq!(sets.len(), 3);
        assert!(!sets[0].is_amrap);
        assert!(!sets[1].is_amrap);
        let last = sets.last().unwrap();
        assert!(last.is_amrap);
        assert!(last.is_work_set);
        assert_eq!(last.target_reps, 5);
    }

    #[test]
    fn test_greyskull_layout() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);
        let scheme = SetScheme::Greyskull {
            fixed_sets: 2,
            fixed_reps: 5,
            amrap_sets: 1,
            min_amrap_reps: 5,
        };

        let sets = expand("squat", &tm_percent(90.0), &scheme, &ctx).unwrap();
        assert_eq!(sets.len(), 3);
        assert!(sets.iter().all(|s| s.weight == 180.0 && s.is_work_set));
        assert_eq!(
            sets.iter().map(|s| s.is_amrap).collect::<Vec<_>>(),
            vec![false, false, true]
        );
    }

    #[test]
    fn test_ramp_classification_ignores_modifiers() {
        let maxes = maxes();
        let daily = DailyLookupEntry {
            day: "light".into(),
            percentage_modifier: 50.0,
            intensity_level: None,
        };
        let ctx = LoadContext {
            daily: Some(&daily),
            ..LoadContext::new(&maxes)
        };
        let scheme = SetScheme::Ramp {
            steps: vec![
                RampStep { percentage: 50.0, reps: 5 },
                RampStep { percentage: 70.0, reps: 3 },
                RampStep { percentage: 85.0, reps: 5 },
                RampStep { percentage: 90.0, reps: 3 },
            ],
            work_set_threshold: 85.0,
        };

        let sets = expand("squat", &tm_percent(100.0), &scheme, &ctx).unwrap();
        assert_eq!(
            sets.iter().map(|s| s.is_work_set).collect::<Vec<_>>(),
            vec![false, false, true, true]
        );
        // 200 x 50% daily x 85% step
        assert_eq!(sets[2].weight, 85.0);
        assert_eq!(sets[3].weight, 90.0);
        assert_eq!(sets[0].target_reps, 5);
    }

    #[test]
    fn test_ramp_rejects_rpe_strategy() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);
        let scheme = SetScheme::Ramp {
            steps: vec![RampStep { percentage: 50.0, reps: 5 }],
            work_set_threshold: 80.0,
        };

        let result = expand("squat", &rpe_strategy(), &scheme, &ctx);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_zero_set_schemes_are_rejected() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);

        for scheme in [
            SetScheme::Fixed { sets: 0, reps: 5 },
            SetScheme::Amrap { sets: 0, min_reps: 5 },
            SetScheme::Greyskull {
                fixed_sets: 0,
                fixed_reps: 5,
                amrap_sets: 0,
                min_amrap_reps: 5,
            },
            SetScheme::Ramp {
                steps: vec![],
                work_set_threshold: 80.0,
            },
        ] {
            let result = expand("squat", &tm_percent(80.0), &scheme, &ctx);
            assert!(matches!(result, Err(Error::Validation(_))), "{:?}", scheme);
        }
    }

    #[test]
    fn test_fatigue_drop_expands_to_opening_set() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);

        let sets = expand("squat", &rpe_strategy(), &fatigue_scheme(4), &ctx).unwrap();
        assert_eq!(sets.len(), 1);
        // 200 x 77% = 154 -> 155
        assert_eq!(sets[0].weight, 155.0);
        assert_eq!(sets[0].target_reps, 5);
    }

    #[test]
    fn test_fatigue_drop_sequence_drops_and_stops() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);
        let mut seq =
            FatigueDropSequence::start("squat", &fatigue_scheme(4), &rpe_strategy(), &ctx).unwrap();

        let first = seq.next_set(None).unwrap().unwrap();
        assert_eq!(first.weight, 155.0);

        // On schedule: weight holds
        let second = seq
            .next_set(Some(&SetOutcome { reps: 5, rpe: 8.0 }))
            .unwrap()
            .unwrap();
        assert_eq!(second.set_number, 2);
        assert_eq!(second.weight, 155.0);

        // Expected 8.5, reported 9: drop 5% (147.25 -> 145)
        let third = seq
            .next_set(Some(&SetOutcome { reps: 5, rpe: 9.0 }))
            .unwrap()
            .unwrap();
        assert_eq!(third.weight, 145.0);

        // Reaching the stop RPE ends the sequence for good
        assert!(seq
            .next_set(Some(&SetOutcome { reps: 5, rpe: 9.5 }))
            .unwrap()
            .is_none());
        assert!(seq.is_finished());
        assert!(seq.next_set(None).unwrap().is_none());
    }

    #[test]
    fn test_fatigue_drop_smaller_than_half_increment_still_drops() {
        let mut maxes = MaxSnapshot::new();
        maxes.insert("squat", MaxType::OneRm, 130.0);
        let ctx = LoadContext::new(&maxes);
        let strategy = LoadStrategy::RpeTarget {
            target_reps: 5,
            target_rpe: 8.0,
            rounding_increment: 5.0,
            rounding_direction: RoundingDirection::Nearest,
        };
        let scheme = SetScheme::FatigueDrop {
            target_reps: 5,
            start_rpe: 8.0,
            stop_rpe: 10.0,
            drop_percent: 0.02,
            max_sets: 4,
        };
        let mut seq = FatigueDropSequence::start("squat", &scheme, &strategy, &ctx).unwrap();

        // 130 x 77% = 100.1 -> 100
        let first = seq.next_set(None).unwrap().unwrap();
        assert_eq!(first.weight, 100.0);

        // 2% of 100 is under half an increment but must not round back up
        let second = seq
            .next_set(Some(&SetOutcome { reps: 5, rpe: 9.5 }))
            .unwrap()
            .unwrap();
        assert!(second.weight < first.weight);
        assert_eq!(second.weight, 95.0);
    }

    #[test]
    fn test_fatigue_drop_stops_at_max_sets() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);
        let seq =
            FatigueDropSequence::start("squat", &fatigue_scheme(2), &rpe_strategy(), &ctx).unwrap();

        let outcomes = [
            SetOutcome { reps: 5, rpe: 8.0 },
            SetOutcome { reps: 5, rpe: 8.0 },
            SetOutcome { reps: 5, rpe: 8.0 },
        ];
        let sets = seq.replay(&outcomes).unwrap();
        assert_eq!(sets.len(), 2);
    }

    #[test]
    fn test_fatigue_drop_replay_is_reproducible() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);
        let history = [
            SetOutcome { reps: 5, rpe: 8.0 },
            SetOutcome { reps: 4, rpe: 8.0 },
        ];

        let start = || {
            FatigueDropSequence::start("squat", &fatigue_scheme(5), &rpe_strategy(), &ctx).unwrap()
        };
        let a = start().replay(&history).unwrap();
        let b = start().replay(&history).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        // Short reps count as fatigue even when RPE is on schedule
        assert!(a[2].weight < a[1].weight);
    }

    #[test]
    fn test_fatigue_drop_requires_outcome() {
        let maxes = maxes();
        let ctx = LoadContext::new(&maxes);
        let mut seq =
            FatigueDropSequence::start("squat", &fatigue_scheme(3), &rpe_strategy(), &ctx).unwrap();

        assert!(seq
            .next_set(Some(&SetOutcome { reps: 5, rpe: 8.0 }))
            .is_err());
        seq.next_set(None).unwrap();
        assert!(matches!(seq.next_set(None), Err(Error::Validation(_))));
    }
}
