//! Workout assembler: compiles the program graph at the user's position into today's workout.
//!
//! This is a pure function of (program graph, position, max snapshot):
//! identical inputs always produce an identical workout.

use crate::load::{LoadContext, MaxSnapshot};
use crate::{
    scheme, Day, EnrollmentState, Error, ExerciseView, ProgramGraph, Result, Rounding,
    WorkoutView,
};

/// Where in the calendar a workout is being built for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub cycle_iteration: u32,
    pub week: u32,
    pub day_index: usize,
}

impl From<&EnrollmentState> for Position {
    fn from(state: &EnrollmentState) -> Self {
        Self {
            cycle_iteration: state.cycle_iteration,
            week: state.current_week,
            day_index: state.current_day_index,
        }
    }
}

/// Resolve the day scheduled at `week` / `day_index`
pub fn scheduled_day<'a>(graph: &'a ProgramGraph, week: u32, day_index: usize) -> Result<&'a Day> {
    let week_def = graph.cycle.week(week).ok_or_else(|| {
        Error::NotFound(format!(
            "Week {} in cycle '{}' of program '{}'",
            week, graph.cycle.id, graph.program.id
        ))
    })?;

    let slot = week_def.days.get(day_index).ok_or_else(|| {
        Error::NotFound(format!(
            "Day slot {} in week {} of program '{}'",
            day_index, week, graph.program.id
        ))
    })?;

    graph
        .day(&slot.day)
        .ok_or_else(|| Error::NotFound(format!("Day '{}' in program '{}'", slot.day, graph.program.id)))
}

/// Build the workout for `position`
pub fn assemble(
    graph: &ProgramGraph,
    position: Position,
    maxes: &MaxSnapshot,
    default_rounding: Rounding,
) -> Result<WorkoutView> {
    let day = scheduled_day(graph, position.week, position.day_index)?;

    let ctx = LoadContext {
        maxes,
        weekly: graph
            .weekly_lookup
            .as_ref()
            .and_then(|l| l.entry(position.week)),
        daily: graph.daily_lookup.as_ref().and_then(|l| l.entry(&day.slug)),
        default_rounding,
    };

    let mut prescriptions: Vec<_> = day.prescriptions.iter().collect();
    prescriptions.sort_by_key(|p| p.order);

    let mut exercises = Vec::with_capacity(prescriptions.len());
    for prescription in prescriptions {
        let lift = graph.lift(&prescription.lift_id).ok_or_else(|| {
            Error::NotFound(format!(
                "Lift '{}' referenced by prescription '{}'",
                prescription.lift_id, prescription.id
            ))
        })?;

        let sets = scheme::expand(&lift.id, &prescription.load, &prescription.scheme, &ctx)?;

        exercises.push(ExerciseView {
            prescription_id: prescription.id.clone(),
            lift: lift.clone(),
            sets,
        });
    }

    tracing::debug!(
        "Assembled {} exercises for {} week {} day {}",
        exercises.len(),
        graph.program.id,
        position.week,
        day.slug
    );

    Ok(WorkoutView {
        program_id: graph.program.id.clone(),
        cycle_iteration: position.cycle_iteration,
        week_number: position.week,
        day_slug: day.slug.clone(),
        day_name: day.name.clone(),
        exercises,
    })
}
