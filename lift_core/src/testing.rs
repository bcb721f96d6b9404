//! Shared fixtures for unit tests.

use crate::{
    Cycle, Day, DaySlot, Deload, Lift, LoadStrategy, MaxType, Prescription, Program, ProgramGraph,
    Progression, ProgressionLink, ProgressionRule, SetScheme, TriggerType, Week,
};

pub(crate) fn lift(id: &str, name: &str) -> Lift {
    Lift {
        id: id.into(),
        name: name.into(),
        slug: id.into(),
    }
}

pub(crate) fn tm_percent(percentage: f64) -> LoadStrategy {
    LoadStrategy::PercentOf {
        reference: MaxType::TrainingMax,
        percentage,
        lookup_key: None,
        rounding: None,
    }
}

pub(crate) fn prescription(id: &str, lift_id: &str, load: LoadStrategy, scheme: SetScheme, order: u32) -> Prescription {
    Prescription {
        id: id.into(),
        lift_id: lift_id.into(),
        load,
        scheme,
        order,
    }
}

pub(crate) fn link(progression_id: &str, lift_id: &str, priority: i32) -> ProgressionLink {
    ProgressionLink {
        progression_id: progression_id.into(),
        lift_id: lift_id.into(),
        priority,
        enabled: true,
        override_increment: None,
    }
}

pub(crate) fn progression(id: &str, trigger: TriggerType, rule: ProgressionRule) -> Progression {
    Progression {
        id: id.into(),
        name: id.into(),
        trigger,
        max_type: MaxType::TrainingMax,
        rule,
    }
}

/// Two-week A/B/A program over squat, bench and deadlift.
///
/// Squat runs a linear +5 after every session; bench deloads 10% after two
/// consecutive failed sets.
pub(crate) fn sample_program() -> ProgramGraph {
    let day_a = Day {
        slug: "day-a".into(),
        name: "Day A".into(),
        // Listed out of order on purpose
        prescriptions: vec![
            prescription("a-bench", "bench", tm_percent(80.0), SetScheme::Fixed { sets: 3, reps: 5 }, 2),
            prescription("a-squat", "squat", tm_percent(85.0), SetScheme::Fixed { sets: 3, reps: 5 }, 1),
        ],
    };
    let day_b = Day {
        slug: "day-b".into(),
        name: "Day B".into(),
        prescriptions: vec![
            prescription("b-deadlift", "deadlift", tm_percent(90.0), SetScheme::Fixed { sets: 1, reps: 5 }, 1),
            prescription("b-bench", "bench", tm_percent(70.0), SetScheme::Amrap { sets: 1, min_reps: 8 }, 2),
        ],
    };

    let slots = |week_number| Week {
        week_number,
        days: ["day-a", "day-b", "day-a"]
            .iter()
            .enumerate()
            .map(|(i, day)| DaySlot {
                day_of_week: Some(1 + 2 * i as u8),
                day: day.to_string(),
            })
            .collect(),
    };

    ProgramGraph {
        program: Program {
            id: "sample".into(),
            name: "Sample A/B".into(),
            slug: "sample".into(),
            cycle_id: "two-week".into(),
            progressions: vec![link("squat-lp", "squat", 1), link("bench-deload", "bench", 2)],
        },
        cycle: Cycle {
            id: "two-week".into(),
            name: "Two Week".into(),
            length_weeks: 2,
            weeks: vec![slots(1), slots(2)],
        },
        days: vec![day_a, day_b],
        lifts: vec![
            lift("squat", "Back Squat"),
            lift("bench", "Bench Press"),
            lift("deadlift", "Deadlift"),
        ],
        progressions: vec![
            progression(
                "squat-lp",
                TriggerType::AfterSession,
                ProgressionRule::Linear { increment: 5.0 },
            ),
            progression(
                "bench-deload",
                TriggerType::OnFailure,
                ProgressionRule::DeloadOnFailure {
                    failure_threshold: 2,
                    deload: Deload::Percent { percent: 0.10 },
                    reset_on_deload: false,
                },
            ),
        ],
        weekly_lookup: None,
        daily_lookup: None,
    }
}
