use clap::{Parser, Subcommand};
use lift_core::store::{LiftMaxStore, ProgramReader, SessionStore};
use lift_core::*;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lift")]
#[command(about = "Strength program tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Act for this user instead of the configured one
    #[arg(long, global = true)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll in a program, starting at week 1 day 1
    Enroll {
        /// Program id from the catalog
        program: String,
    },

    /// Leave the current program
    Unenroll,

    /// Show enrollment position and session state
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show today's workout
    Workout {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Start a session for today's workout
    Start,

    /// Log one performed set in the active session
    Log {
        /// Prescription id (see `lift workout`)
        prescription: String,

        /// Reps actually performed
        #[arg(long)]
        reps: u32,

        /// Set number (defaults to the next one for this prescription)
        #[arg(long)]
        set: Option<u32>,

        /// Weight used, if different from the planned weight
        #[arg(long)]
        weight: Option<f64>,

        /// Reported effort for the set
        #[arg(long)]
        rpe: Option<f64>,
    },

    /// Finish the active session
    Finish,

    /// Move to the next scheduled day
    Advance,

    /// Begin the next cycle after the last one completed
    NextCycle,

    /// Fire a progression by hand
    Trigger {
        /// Progression id
        progression: String,

        /// Only this lift
        #[arg(long)]
        lift: Option<String>,

        /// Apply even if the progression is registered for another trigger
        #[arg(long)]
        force: bool,
    },

    /// Record or show lift maxes
    Max {
        #[command(subcommand)]
        action: MaxAction,
    },

    /// Export the lift max log to CSV
    Export {
        /// Output CSV path
        csv: PathBuf,
    },

    /// Validate the program catalog
    Validate,

    /// Write the current settings to the config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum MaxAction {
    /// Record a new max
    Set {
        lift: String,
        value: f64,

        /// training_max (tm) or one_rm (1rm)
        #[arg(long = "type", default_value = "training_max")]
        max_type: MaxType,
    },

    /// Show max history for a lift
    Show {
        lift: String,

        #[arg(long = "type", default_value = "training_max")]
        max_type: MaxType,
    },
}

fn main() -> Result<()> {
    lift_core::logging::init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    let user_id = cli.user.unwrap_or_else(|| config.user.id.clone());

    match cli.command {
        Commands::Validate => return cmd_validate(&config),
        Commands::Init { force } => {
            config.user.id = user_id;
            return cmd_init(&config, force);
        }
        _ => {}
    }

    let engine = open_engine(&config)?;

    match cli.command {
        Commands::Enroll { program } => cmd_enroll(&engine, &user_id, &program),
        Commands::Unenroll => {
            engine.unenroll(&user_id)?;
            println!("✓ Unenrolled {}", user_id);
            Ok(())
        }
        Commands::Status { json } => cmd_status(&engine, &user_id, json),
        Commands::Workout { json } => cmd_workout(&engine, &user_id, json),
        Commands::Start => {
            let session_id = engine.start_session(&user_id)?;
            println!("✓ Session started: {}", session_id);
            Ok(())
        }
        Commands::Log {
            prescription,
            reps,
            set,
            weight,
            rpe,
        } => cmd_log(&engine, &user_id, &prescription, reps, set, weight, rpe),
        Commands::Finish => cmd_finish(&engine, &user_id),
        Commands::Advance => cmd_advance(&engine, &user_id),
        Commands::NextCycle => {
            let state = engine.next_cycle(&user_id)?;
            println!("✓ Cycle {} started", state.cycle_iteration);
            Ok(())
        }
        Commands::Trigger {
            progression,
            lift,
            force,
        } => {
            let batch =
                engine.trigger_progression(&user_id, &progression, lift.as_deref(), force)?;
            display_batch(&batch);
            Ok(())
        }
        Commands::Max { action } => cmd_max(&engine, &user_id, action),
        Commands::Export { csv } => {
            let maxes = engine.store().user_maxes(&user_id)?;
            let count = lift_core::export::export_maxes(&maxes, &csv)?;
            println!("✓ Exported {} max records", count);
            println!("  CSV: {}", csv.display());
            Ok(())
        }
        Commands::Validate | Commands::Init { .. } => Ok(()),
    }
}

fn open_engine(config: &Config) -> Result<TrainingEngine<FileStore>> {
    let programs = load_catalog(&config.catalog_dir())?;
    let store = FileStore::open(&config.state_path(), programs)?;
    tracing::debug!("Opened state at {:?}", store.path());
    Ok(TrainingEngine::new(store).with_default_rounding(config.rounding.to_rounding()?))
}

fn cmd_validate(config: &Config) -> Result<()> {
    let programs = load_catalog(&config.catalog_dir())?;
    for graph in &programs {
        println!(
            "✓ {} ({}, {} weeks)",
            graph.program.id, graph.program.name, graph.cycle.length_weeks
        );
    }
    Ok(())
}

fn cmd_init(config: &Config, force: bool) -> Result<()> {
    let path = Config::default_config_path();
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists, pass --force to overwrite",
            path.display()
        )));
    }
    config.save()?;
    println!("✓ Wrote {}", path.display());
    println!("  Data: {}", config.data.data_dir.display());
    Ok(())
}

fn cmd_enroll(engine: &TrainingEngine<FileStore>, user_id: &str, program: &str) -> Result<()> {
    let state = engine.enroll(user_id, program)?;
    println!("✓ Enrolled {} in {}", user_id, state.program_id);
    println!(
        "  Cycle {}, week {}, day {}",
        state.cycle_iteration,
        state.current_week,
        state.current_day_index + 1
    );
    Ok(())
}

fn cmd_status(engine: &TrainingEngine<FileStore>, user_id: &str, json: bool) -> Result<()> {
    let Some(state) = engine.enrollment(user_id)? else {
        if json {
            println!("null");
        } else {
            println!("{} is not enrolled in a program", user_id);
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!("Program: {}", state.program_id);
    println!(
        "  Cycle {}, week {}, day {}",
        state.cycle_iteration,
        state.current_week,
        state.current_day_index + 1
    );
    println!("  Phase: {:?}", state.phase());
    match state.session {
        SessionSlot::None => {}
        SessionSlot::InProgress(id) => println!("  Session in progress: {}", id),
        SessionSlot::Finished(id) => println!("  Session finished: {}", id),
    }
    println!(
        "  Updated: {}",
        state.updated_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

fn cmd_workout(engine: &TrainingEngine<FileStore>, user_id: &str, json: bool) -> Result<()> {
    let view = engine.compute_workout(user_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {} (week {})", view.day_name, view.week_number);
    println!("╰─────────────────────────────────────────╯");

    for exercise in &view.exercises {
        println!();
        println!("  {} [{}]", exercise.lift.name, exercise.prescription_id);
        for set in &exercise.sets {
            let marker = if set.is_amrap {
                "+"
            } else if !set.is_work_set {
                " (warm-up)"
            } else {
                ""
            };
            println!(
                "  → Set {}: {} x {}{}",
                set.set_number, set.weight, set.target_reps, marker
            );
        }
    }
    Ok(())
}

fn active_session(engine: &TrainingEngine<FileStore>, user_id: &str) -> Result<Uuid> {
    engine
        .enrollment(user_id)?
        .and_then(|state| state.active_session())
        .ok_or_else(|| Error::State(format!("{} has no session in progress", user_id)))
}

fn cmd_log(
    engine: &TrainingEngine<FileStore>,
    user_id: &str,
    prescription_id: &str,
    reps: u32,
    set_number: Option<u32>,
    weight: Option<f64>,
    rpe: Option<f64>,
) -> Result<()> {
    let session_id = active_session(engine, user_id)?;
    let session = engine
        .store()
        .session(session_id)?
        .ok_or_else(|| Error::NotFound(format!("Session {}", session_id)))?;

    let graph = engine.store().program(&session.program_id)?;
    let prescription = graph.prescription(prescription_id).ok_or_else(|| {
        Error::NotFound(format!(
            "Prescription '{}' in program '{}'",
            prescription_id, session.program_id
        ))
    })?;

    let logged = session
        .logged_sets
        .iter()
        .filter(|s| s.prescription_id == prescription_id)
        .count() as u32;
    let set_number = set_number.unwrap_or(logged + 1);

    // Fatigue-drop sets only exist once the previous outcome is known
    let planned = if matches!(prescription.scheme, SetScheme::FatigueDrop { .. }) {
        engine.next_fatigue_set(session_id, prescription_id)?
    } else {
        engine
            .compute_workout(user_id)?
            .exercises
            .into_iter()
            .find(|e| e.prescription_id == prescription_id)
            .and_then(|e| e.sets.into_iter().find(|s| s.set_number == set_number))
    };
    let planned = planned.ok_or_else(|| {
        Error::NotFound(format!(
            "Set {} of '{}' is not in today's workout",
            set_number, prescription_id
        ))
    })?;

    let set = LoggedSet {
        prescription_id: prescription_id.to_string(),
        lift_id: prescription.lift_id.clone(),
        set_number,
        weight: weight.unwrap_or(planned.weight),
        target_reps: planned.target_reps,
        reps_performed: reps,
        is_amrap: planned.is_amrap,
        rpe,
    };
    let weight = set.weight;
    let outcome = engine.log_sets(session_id, vec![set])?;

    println!(
        "✓ Logged {} set {}: {} x {}",
        prescription.lift_id, set_number, weight, reps
    );
    if !outcome.failures.is_empty() {
        println!("  Short of {} target reps", planned.target_reps);
    }
    display_batch(&outcome.progressions);
    Ok(())
}

fn cmd_finish(engine: &TrainingEngine<FileStore>, user_id: &str) -> Result<()> {
    let session_id = active_session(engine, user_id)?;
    let outcome = engine.finish_session(session_id)?;
    println!(
        "✓ Session finished ({} sets logged)",
        outcome.session.logged_sets.len()
    );
    display_batch(&outcome.progressions);
    Ok(())
}

fn cmd_advance(engine: &TrainingEngine<FileStore>, user_id: &str) -> Result<()> {
    let outcome = engine.advance(user_id)?;
    for event in &outcome.events {
        match event {
            LifecycleEvent::WeekAdvanced { completed_week, .. } => {
                println!("✓ Week {} complete", completed_week)
            }
            LifecycleEvent::CycleAdvanced {
                completed_iteration,
                ..
            } => println!(
                "✓ Cycle {} complete, run `lift next-cycle` to continue",
                completed_iteration
            ),
            _ => {}
        }
    }

    let state = &outcome.enrollment;
    if state.status == EnrollmentStatus::Active {
        println!(
            "  Next: week {}, day {}",
            state.current_week,
            state.current_day_index + 1
        );
    }
    display_batch(&outcome.progressions);
    Ok(())
}

fn cmd_max(engine: &TrainingEngine<FileStore>, user_id: &str, action: MaxAction) -> Result<()> {
    match action {
        MaxAction::Set {
            lift,
            value,
            max_type,
        } => {
            let record = engine.record_max(user_id, &lift, max_type, value)?;
            println!(
                "✓ {} {} = {} (#{})",
                record.lift_id, record.max_type, record.value, record.sequence
            );
        }
        MaxAction::Show { lift, max_type } => {
            let history = engine.max_history(user_id, &lift, max_type)?;
            if history.is_empty() {
                println!("No {} recorded for {}", max_type, lift);
            }
            for record in &history {
                println!(
                    "  #{} {} {}",
                    record.sequence,
                    record.value,
                    record.recorded_at.with_timezone(&chrono::Local).format("%Y-%m-%d")
                );
            }
        }
    }
    Ok(())
}

fn display_batch(batch: &TriggerBatch) {
    for result in &batch.results {
        match &result.outcome {
            ProgressionOutcome::Applied(change) => println!(
                "  ↑ {} ({}): {} -> {}",
                result.lift_id, result.progression_id, change.previous_value, change.new_value
            ),
            ProgressionOutcome::Skipped { reason } => println!(
                "  · {} ({}): skipped, {}",
                result.lift_id, result.progression_id, reason
            ),
            ProgressionOutcome::Error { message } => eprintln!(
                "  ! {} ({}): {}",
                result.lift_id, result.progression_id, message
            ),
        }
    }
}
