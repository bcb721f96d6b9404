//! Program catalog: built-in programs plus TOML program files.
//!
//! Program files live in the catalog directory, one `ProgramGraph` per
//! `*.toml` file. Files override built-ins with the same program id. Every
//! graph is validated for referential integrity before the engine sees it.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Built once and reused across all operations
static BUILTIN_PROGRAMS: Lazy<Vec<ProgramGraph>> = Lazy::new(|| vec![wendler_531()]);

pub fn builtin_programs() -> &'static [ProgramGraph] {
    &BUILTIN_PROGRAMS
}

/// Four-day 5/3/1: one main lift per day, waves from the weekly lookup,
/// +5 upper / +10 lower training max after each cycle
fn wendler_531() -> ProgramGraph {
    let lifts = [
        ("squat", "Squat", 10.0),
        ("bench", "Bench Press", 5.0),
        ("deadlift", "Deadlift", 10.0),
        ("press", "Overhead Press", 5.0),
    ];
    let rounding = Some(Rounding::default());

    let days: Vec<Day> = lifts
        .iter()
        .map(|(id, name, _)| Day {
            slug: format!("{}-day", id),
            name: format!("{} Day", name),
            prescriptions: (0..3)
                .map(|set| Prescription {
                    id: format!("{}-531-{}", id, set + 1),
                    lift_id: id.to_string(),
                    load: LoadStrategy::PercentOf {
                        reference: MaxType::TrainingMax,
                        percentage: 65.0,
                        lookup_key: Some(set),
                        rounding,
                    },
                    scheme: if set == 2 {
                        SetScheme::Amrap { sets: 1, min_reps: 5 }
                    } else {
                        SetScheme::Fixed { sets: 1, reps: 5 }
                    },
                    order: set as u32 + 1,
                })
                .collect(),
        })
        .collect();

    let weeks = (1..=4)
        .map(|week_number| Week {
            week_number,
            days: days
                .iter()
                .enumerate()
                .map(|(i, day)| DaySlot {
                    day_of_week: Some([1, 2, 4, 5][i]),
                    day: day.slug.clone(),
                })
                .collect(),
        })
        .collect();

    let wave = |week_number, percentages: [f64; 3], reps: [u32; 3]| WeeklyLookupEntry {
        week_number,
        percentages: percentages.to_vec(),
        reps: reps.to_vec(),
        percentage_modifier: 100.0,
    };

    ProgramGraph {
        program: Program {
            id: "wendler-531".into(),
            name: "5/3/1".into(),
            slug: "wendler-531".into(),
            cycle_id: "531-wave".into(),
            progressions: lifts
                .iter()
                .enumerate()
                .map(|(i, (id, _, _))| ProgressionLink {
                    progression_id: format!("{}-cycle", id),
                    lift_id: id.to_string(),
                    priority: i as i32,
                    enabled: true,
                    override_increment: None,
                })
                .collect(),
        },
        cycle: Cycle {
            id: "531-wave".into(),
            name: "5/3/1 Wave".into(),
            length_weeks: 4,
            weeks,
        },
        days,
        lifts: lifts
            .iter()
            .map(|(id, name, _)| Lift {
                id: id.to_string(),
                name: name.to_string(),
                slug: id.to_string(),
            })
            .collect(),
        progressions: lifts
            .iter()
            .map(|(id, name, increment)| Progression {
                id: format!("{}-cycle", id),
                name: format!("{} cycle bump", name),
                trigger: TriggerType::AfterCycle,
                max_type: MaxType::TrainingMax,
                rule: ProgressionRule::Cycle {
                    increment: *increment,
                },
            })
            .collect(),
        weekly_lookup: Some(WeeklyLookup {
            entries: vec![
                wave(1, [65.0, 75.0, 85.0], [5, 5, 5]),
                wave(2, [70.0, 80.0, 90.0], [3, 3, 3]),
                wave(3, [75.0, 85.0, 95.0], [5, 3, 1]),
                wave(4, [40.0, 50.0, 60.0], [5, 5, 5]),
            ],
        }),
        daily_lookup: None,
    }
}

impl ProgramGraph {
    /// Validate the graph for referential integrity
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let id = &self.program.id;

        if id.is_empty() {
            errors.push("Program has empty ID".to_string());
        }
        if self.program.cycle_id != self.cycle.id {
            errors.push(format!(
                "Program '{}' names cycle '{}' but carries cycle '{}'",
                id, self.program.cycle_id, self.cycle.id
            ));
        }

        let lift_ids: HashSet<&str> = self.lifts.iter().map(|l| l.id.as_str()).collect();
        if lift_ids.len() != self.lifts.len() {
            errors.push(format!("Program '{}' has duplicate lift IDs", id));
        }
        let day_slugs: HashSet<&str> = self.days.iter().map(|d| d.slug.as_str()).collect();
        if day_slugs.len() != self.days.len() {
            errors.push(format!("Program '{}' has duplicate day slugs", id));
        }

        // Calendar: weeks 1..=length, each with at least one resolvable day
        if self.cycle.length_weeks == 0 {
            errors.push(format!("Cycle '{}' has zero weeks", self.cycle.id));
        }
        for week_number in 1..=self.cycle.length_weeks {
            match self.cycle.week(week_number) {
                None => errors.push(format!(
                    "Cycle '{}' is missing week {}",
                    self.cycle.id, week_number
                )),
                Some(week) if week.days.is_empty() => errors.push(format!(
                    "Week {} of cycle '{}' has no days",
                    week_number, self.cycle.id
                )),
                Some(week) => {
                    for slot in &week.days {
                        if !day_slugs.contains(slot.day.as_str()) {
                            errors.push(format!(
                                "Week {} references non-existent day '{}'",
                                week_number, slot.day
                            ));
                        }
                        if let Some(dow) = slot.day_of_week {
                            if !(1..=7).contains(&dow) {
                                errors.push(format!(
                                    "Week {} day '{}' has day_of_week {} outside 1-7",
                                    week_number, slot.day, dow
                                ));
                            }
                        }
                    }
                }
            }
        }

        let mut prescription_ids = HashSet::new();
        for day in &self.days {
            for p in &day.prescriptions {
                if !prescription_ids.insert(p.id.as_str()) {
                    errors.push(format!("Duplicate prescription ID '{}'", p.id));
                }
                if !lift_ids.contains(p.lift_id.as_str()) {
                    errors.push(format!(
                        "Prescription '{}' references non-existent lift '{}'",
                        p.id, p.lift_id
                    ));
                }
                errors.extend(scheme_errors(p));
            }
        }

        let progression_ids: HashSet<&str> =
            self.progressions.iter().map(|p| p.id.as_str()).collect();
        if progression_ids.len() != self.progressions.len() {
            errors.push(format!("Program '{}' has duplicate progression IDs", id));
        }
        for progression in &self.progressions {
            errors.extend(rule_errors(progression));
        }
        for link in &self.program.progressions {
            if !progression_ids.contains(link.progression_id.as_str()) {
                errors.push(format!(
                    "Link references non-existent progression '{}'",
                    link.progression_id
                ));
            }
            if !lift_ids.contains(link.lift_id.as_str()) {
                errors.push(format!(
                    "Link for '{}' references non-existent lift '{}'",
                    link.progression_id, link.lift_id
                ));
            }
        }

        errors
    }
}

fn scheme_errors(p: &Prescription) -> Vec<String> {
    let mut errors = Vec::new();
    match &p.scheme {
        SetScheme::Fixed { sets: 0, .. } | SetScheme::Amrap { sets: 0, .. } => {
            errors.push(format!("Prescription '{}' prescribes zero sets", p.id))
        }
        SetScheme::Greyskull {
            fixed_sets: 0,
            amrap_sets: 0,
            ..
        } => errors.push(format!("Prescription '{}' prescribes zero sets", p.id)),
        SetScheme::Ramp { steps, .. } => {
            if steps.is_empty() {
                errors.push(format!("Ramp prescription '{}' has no steps", p.id));
            }
            if matches!(p.load, LoadStrategy::RpeTarget { .. }) {
                errors.push(format!(
                    "Ramp prescription '{}' needs a percent_of load",
                    p.id
                ));
            }
        }
        SetScheme::FatigueDrop {
            start_rpe,
            stop_rpe,
            drop_percent,
            max_sets,
            ..
        } => {
            if *max_sets == 0 {
                errors.push(format!("Prescription '{}' prescribes zero sets", p.id));
            }
            if stop_rpe < start_rpe {
                errors.push(format!(
                    "Fatigue drop '{}' stops below its start RPE",
                    p.id
                ));
            }
            if !(0.0..1.0).contains(drop_percent) {
                errors.push(format!(
                    "Fatigue drop '{}' drop_percent {} is not a fraction",
                    p.id, drop_percent
                ));
            }
        }
        _ => {}
    }
    errors
}

fn rule_errors(progression: &Progression) -> Vec<String> {
    let id = &progression.id;
    match &progression.rule {
        ProgressionRule::AmrapThreshold { thresholds } if thresholds.is_empty() => {
            vec![format!("Progression '{}' has no AMRAP thresholds", id)]
        }
        ProgressionRule::Stage { stages, .. } if stages.is_empty() => {
            vec![format!("Progression '{}' has no stages", id)]
        }
        ProgressionRule::DeloadOnFailure {
            failure_threshold: 0,
            ..
        } => vec![format!("Progression '{}' has a zero failure threshold", id)],
        _ => Vec::new(),
    }
}

/// Load and validate one program file
pub fn load_program(path: &Path) -> Result<ProgramGraph> {
    let contents = std::fs::read_to_string(path)?;
    let graph: ProgramGraph = toml::from_str(&contents)?;

    let errors = graph.validate();
    if !errors.is_empty() {
        return Err(Error::Validation(format!(
            "{}: {}",
            path.display(),
            errors.join("; ")
        )));
    }
    Ok(graph)
}

/// Built-in programs overlaid with every `*.toml` file in `dir`.
///
/// A missing directory just means no custom programs.
pub fn load_catalog(dir: &Path) -> Result<Vec<ProgramGraph>> {
    let mut programs: BTreeMap<String, ProgramGraph> = builtin_programs()
        .iter()
        .map(|g| (g.program.id.clone(), g.clone()))
        .collect();

    if !dir.exists() {
        tracing::info!("No program directory at {:?}, using built-ins", dir);
        return Ok(programs.into_values().collect());
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    for path in paths {
        let graph = load_program(&path)?;
        tracing::debug!("Loaded program '{}' from {:?}", graph.program.id, path);
        programs.insert(graph.program.id.clone(), graph);
    }

    Ok(programs.into_values().collect())
}
