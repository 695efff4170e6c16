use cadence_core::catalog::DeliveryMode;
use cadence_core::one_rep_max::WeightSuggestion;
use cadence_core::week::current_week_key;
use cadence_core::*;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Training progression and strength analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// User whose records are read and written
    #[arg(long, global = true, default_value = "local")]
    user: String,

    /// Pin the clock to a date (YYYY-MM-DD)
    #[arg(long, global = true)]
    now: Option<NaiveDate>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the session to train next
    Current {
        course: String,

        /// Pick a session by id instead of following progression
        #[arg(long)]
        session: Option<String>,

        /// Position of the picked session in the course list
        #[arg(long, requires = "session", default_value_t = 0)]
        index: usize,

        /// Use coach-planned delivery even for linear courses
        #[arg(long, conflicts_with = "session")]
        one_on_one: bool,

        /// Session id planned for today (one-on-one)
        #[arg(long, conflicts_with = "session")]
        planned: Option<String>,
    },

    /// Record a completed or skipped session
    Complete {
        course: String,

        /// JSON file holding the tagged completion
        #[arg(long, conflicts_with = "skip", required_unless_present = "skip")]
        performed: Option<PathBuf>,

        /// Mark a session done without exercise data
        #[arg(long)]
        skip: Option<String>,
    },

    /// Restart a course from its first session
    NewCycle { course: String },

    /// Show weekly muscle volume
    Volume {
        /// Week key (defaults to the current week)
        #[arg(long)]
        week: Option<String>,
    },

    /// Show 1RM estimates and suggested weights for the next session
    Estimates { course: String },
}

/// Collaborators wired to the data directory
struct App {
    user: String,
    json: bool,
    clock: Arc<dyn Clock>,
    store: Arc<dyn DocumentStore>,
    catalog: Arc<FileCatalog>,
    engine: ProgressionEngine,
    completions: CompletionOrchestrator,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cadence_core::logging::init(cli.verbose);

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());

    let clock: Arc<dyn Clock> = match cli.now {
        Some(date) => Arc::new(FixedClock::on(date)),
        None => Arc::new(SystemClock),
    };

    let app = App::new(&data_dir, &config, clock, cli.user, cli.json)?;

    match cli.command {
        Commands::Current {
            course,
            session,
            index,
            one_on_one,
            planned,
        } => {
            let mode = match session {
                Some(session_id) => SelectionMode::Manual { session_id, index },
                None if one_on_one || planned.is_some() || app.is_one_on_one(&course)? => {
                    SelectionMode::OneOnOne {
                        planned_today: planned,
                    }
                }
                None => SelectionMode::Automatic,
            };
            app.cmd_current(&course, mode).await
        }
        Commands::Complete {
            course,
            performed,
            skip,
        } => {
            let completion = match (performed, skip) {
                (Some(path), _) => read_completion(&path)?,
                (None, Some(session_id)) => Completion::Skipped { session_id },
                (None, None) => {
                    return Err(Error::Other("either --performed or --skip is required".into()))
                }
            };
            app.cmd_complete(&course, completion).await
        }
        Commands::NewCycle { course } => app.cmd_new_cycle(&course).await,
        Commands::Volume { week } => app.cmd_volume(week).await,
        Commands::Estimates { course } => app.cmd_estimates(&course).await,
    }
}

fn read_completion(path: &Path) -> Result<Completion> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Built-in library plus `library.json` entries; a bad file is ignored
fn load_library(data_dir: &Path) -> StaticLibrary {
    let mut library = StaticLibrary::builtin();
    let path = data_dir.join("library.json");
    if path.exists() {
        match StaticLibrary::load_from(&path) {
            Ok(extra) => library.extend(extra),
            Err(e) => tracing::warn!("Ignoring library file {:?}: {}", path, e),
        }
    }
    library
}

impl App {
    fn new(
        data_dir: &Path,
        config: &Config,
        clock: Arc<dyn Clock>,
        user: String,
        json: bool,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let store: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::new(data_dir.join("store")));
        let catalog = Arc::new(FileCatalog::new(data_dir.join("courses"), clock.clone()));
        let library: Arc<dyn ExerciseLibrary> = Arc::new(load_library(data_dir));
        let cache = TtlCache::new(&config.cache);

        let engine = ProgressionEngine::new(
            catalog.clone(),
            store.clone(),
            cache.clone(),
            clock.clone(),
            WorkoutResolver::new(library),
        );
        let completions =
            CompletionOrchestrator::new(catalog.clone(), store.clone(), cache, clock.clone());

        Ok(Self {
            user,
            json,
            clock,
            store,
            catalog,
            engine,
            completions,
        })
    }

    fn is_one_on_one(&self, course_id: &str) -> Result<bool> {
        Ok(self
            .catalog
            .course(course_id)?
            .is_some_and(|course| course.delivery == DeliveryMode::OneOnOne))
    }

    async fn cmd_current(&self, course_id: &str, mode: SelectionMode) -> Result<()> {
        let snapshot = self
            .engine
            .current_session(&self.user, course_id, mode)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            return Ok(());
        }

        match &snapshot.state {
            SessionState::NoPlanningThisWeek { reason } => {
                println!("Nothing planned this week ({:?})", reason);
            }
            SessionState::NoSessionToday { reason } => {
                println!("No session today ({:?})", reason);
            }
            state => {
                if let Some(selected) = state.selected() {
                    let label = match state {
                        SessionState::Manual(_) => "Selected",
                        SessionState::PlannedToday(_) => "Today",
                        _ => "Next",
                    };
                    println!(
                        "\n{}: {} [{}] (session {})",
                        label,
                        selected.session.title,
                        selected.session.id,
                        selected.index + 1
                    );
                    if selected.already_completed {
                        println!("  ✓ Already completed");
                    }
                }
                if let Some(ref workout) = snapshot.workout {
                    display_workout(workout);
                }
            }
        }

        println!(
            "\nCompleted {} sessions, {} cycles",
            snapshot.progress.total_sessions_completed, snapshot.progress.cycles_completed
        );
        Ok(())
    }

    async fn cmd_complete(&self, course_id: &str, completion: Completion) -> Result<()> {
        let report = self
            .completions
            .complete(&self.user, course_id, completion)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "\n✓ Session {} recorded",
            report
                .progress
                .last_session_completed
                .as_deref()
                .unwrap_or("?")
        );

        for record in &report.personal_records {
            println!(
                "  ★ New 1RM for {}: {} (was {}) from {} x {}",
                record.exercise_name,
                record.estimate,
                record.previous,
                record.achieved_with.weight,
                record.achieved_with.reps
            );
        }

        if let Some(ref volume) = report.volume {
            if !volume.session.is_empty() {
                println!("  Effective sets ({}):", volume.week_key);
                for (muscle, sets) in &volume.session {
                    let week_total = volume.week.get(muscle).copied().unwrap_or(*sets);
                    println!("    {:<14} +{:<5} week {}", muscle, sets, week_total);
                }
            }
        }

        Ok(())
    }

    async fn cmd_new_cycle(&self, course_id: &str) -> Result<()> {
        let progress = self.engine.start_new_cycle(&self.user, course_id).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&progress)?);
        } else {
            println!("✓ {} restarted from the first session", course_id);
        }
        Ok(())
    }

    async fn cmd_volume(&self, week: Option<String>) -> Result<()> {
        let week_key = week.unwrap_or_else(|| current_week_key(self.clock.as_ref()));
        let volume = VolumeTracker::new(self.store.clone(), self.clock.clone())
            .week(&self.user, &week_key)
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&volume)?);
            return Ok(());
        }

        println!("Week {}", week_key);
        if volume.muscles.is_empty() {
            println!("  No effective sets recorded");
        }
        for (muscle, sets) in &volume.muscles {
            println!("  {:<14} {}", muscle, sets);
        }
        Ok(())
    }

    async fn cmd_estimates(&self, course_id: &str) -> Result<()> {
        let snapshot = self
            .engine
            .current_session(&self.user, course_id, SelectionMode::Automatic)
            .await?;
        let Some(workout) = snapshot.workout else {
            println!("No session to suggest weights for");
            return Ok(());
        };

        let tracker = OneRepMaxTracker::new(self.store.clone(), self.clock.clone());
        let suggestions = tracker.suggestions_for(&self.user, &workout).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&suggestions)?);
            return Ok(());
        }

        println!("\n{} [{}]", workout.title, workout.session_id);
        for exercise in &workout.exercises {
            let Some(key) = exercise.key() else {
                continue;
            };
            match tracker.estimate_for(&self.user, &key).await? {
                Some(estimate) => println!("  {:<20} 1RM {}", exercise.name, estimate.current),
                None => println!("  {:<20} no estimate yet", exercise.name),
            }
            if let Some(suggestion) = find_suggestion(&suggestions, &exercise.reference.id) {
                println!(
                    "  {:<20} → {} for {} reps @ {}/10",
                    "",
                    suggestion.weight,
                    suggestion.target_reps,
                    suggestion.target_intensity
                );
            }
        }
        Ok(())
    }
}

fn find_suggestion<'a>(
    suggestions: &'a [WeightSuggestion],
    exercise_id: &str,
) -> Option<&'a WeightSuggestion> {
    suggestions.iter().find(|s| s.exercise_id == exercise_id)
}

fn display_workout(workout: &Workout) {
    if let Some(ref media) = workout.media_ref {
        println!("  ℹ Media: {}", media);
    }
    if workout.exercises.is_empty() {
        println!("  (no exercises yet)");
    }
    for exercise in &workout.exercises {
        let marker = if exercise.degraded { " (unavailable)" } else { "" };
        println!("  • {}{}", exercise.name, marker);
        for set in &exercise.reference.sets {
            println!("      {} reps @ {}", set.reps, set.intensity);
        }
    }
}
