use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand};
use medtrack_core::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "medtrack")]
#[command(about = "Medication schedule and adherence tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a medication with a dosing schedule
    Add {
        /// Free-form dosing text, e.g. "aspirin 500mg twice daily"
        #[arg(long, conflicts_with_all = ["name", "time"])]
        text: Option<String>,

        /// Medication name (structured mode)
        #[arg(long)]
        name: Option<String>,

        /// Dose description, e.g. "500mg"
        #[arg(long)]
        dose: Option<String>,

        /// Reminder time (HH:MM), repeatable
        #[arg(long = "time")]
        time: Vec<String>,

        /// Weekday the schedule applies to (mon..sun), repeatable;
        /// omit for every day
        #[arg(long = "day")]
        day: Vec<String>,

        /// First day of the schedule (YYYY-MM-DD, default today)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of the schedule (YYYY-MM-DD, inclusive)
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
    },

    /// Update a medication's dose, notes, or dosing schedule
    Edit {
        /// Medication name
        name: String,

        /// New dose description
        #[arg(long)]
        dose: Option<String>,

        /// New free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// New reminder time (HH:MM), repeatable; replaces the old times
        /// with a new schedule version
        #[arg(long = "time")]
        time: Vec<String>,

        /// Weekday the new version applies to (mon..sun), repeatable;
        /// omit for every day
        #[arg(long = "day")]
        day: Vec<String>,

        /// First day of the new version (default: unchanged)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Last day of the new version, inclusive (default: unchanged)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Stop a medication: mark it and its schedules inactive
    Discontinue {
        /// Medication name
        name: String,
    },

    /// List medications and their schedules
    List,

    /// Show occurrences due on a day, with their recorded status
    Due {
        /// Day to show (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Record a dose as taken
    Take {
        /// Occurrence key as printed by `due`
        key: String,

        /// When the dose was taken (YYYY-MM-DDTHH:MM, default now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Record a dose as deliberately skipped
    Skip {
        /// Occurrence key as printed by `due`
        key: String,

        /// When the skip was recorded (YYYY-MM-DDTHH:MM, default now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Mark doses past their grace period as missed
    Sweep {
        /// Sweep as of this instant (YYYY-MM-DDTHH:MM, default now)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Adherence statistics per medication
    Stats {
        /// Window size in days (default from config)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Roll up the adherence log to CSV
    Rollup {
        /// Clean up processed log files after rollup
        #[arg(long)]
        cleanup: bool,
    },
}

struct Paths {
    registry: PathBuf,
    wal: PathBuf,
    wal_dir: PathBuf,
    csv: PathBuf,
}

impl Paths {
    fn new(data_dir: &PathBuf) -> Self {
        Self {
            registry: data_dir.join("registry.json"),
            wal: data_dir.join("wal").join("adherence.wal"),
            wal_dir: data_dir.join("wal"),
            csv: data_dir.join("adherence.csv"),
        }
    }
}

fn main() -> Result<()> {
    medtrack_core::logging::init();

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let paths = Paths::new(&data_dir);

    match cli.command {
        Commands::Add {
            text,
            name,
            dose,
            time,
            day,
            start,
            end,
            notes,
        } => cmd_add(&paths, &config, text, name, dose, time, day, start, end, notes),
        Commands::Edit {
            name,
            dose,
            notes,
            time,
            day,
            start,
            end,
        } => cmd_edit(&paths, &name, dose, notes, time, day, start, end),
        Commands::Discontinue { name } => cmd_discontinue(&paths, &name),
        Commands::List => cmd_list(&paths),
        Commands::Due { date } => cmd_due(&paths, date),
        Commands::Take { key, at } => cmd_record(&paths, &key, AdherenceStatus::Taken, at),
        Commands::Skip { key, at } => cmd_record(&paths, &key, AdherenceStatus::Skipped, at),
        Commands::Sweep { as_of } => cmd_sweep(&paths, &config, as_of),
        Commands::Stats { days } => cmd_stats(&paths, &config, days),
        Commands::Rollup { cleanup } => cmd_rollup(&paths, cleanup),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_add(
    paths: &Paths,
    config: &Config,
    text: Option<String>,
    name: Option<String>,
    dose: Option<String>,
    time: Vec<String>,
    day: Vec<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    notes: Option<String>,
) -> Result<()> {
    // Resolve the medication and its reminder times from either mode
    let (med_name, med_dose, times, as_needed, med_notes) = if let Some(text) = text {
        let parsed = parse_dosing(&text, &config.clock)?;
        (
            parsed.name,
            parsed.dose,
            parsed.times_of_day,
            parsed.as_needed,
            parsed.notes,
        )
    } else {
        let name = name.ok_or_else(|| {
            Error::Other("either --text or --name is required".into())
        })?;
        let times = time
            .iter()
            .map(|t| parse_time(t))
            .collect::<Result<Vec<_>>>()?;
        (name, dose, times, false, notes)
    };

    let days = day
        .iter()
        .map(|d| parse_day(d))
        .collect::<Result<Vec<_>>>()?;

    let today = Local::now().date_naive();
    let medication = Medication::new(med_name.as_str(), med_dose, med_notes);
    let med_id = medication.id;

    if as_needed {
        Registry::update(&paths.registry, |registry| {
            registry.add_medication(medication.clone());
            Ok(())
        })?;
        println!("✓ Added {} (as needed, no reminder schedule)", med_name);
        return Ok(());
    }

    let schedule = Schedule::create(
        med_id,
        start.unwrap_or(today),
        ScheduleDraft {
            times_of_day: times,
            days_of_week: days,
            start_date: start,
            end_date: end,
        },
    )?;
    let schedule_id = schedule.id;
    let schedule_times = schedule.times_of_day.clone();

    Registry::update(&paths.registry, |registry| {
        registry.add_medication(medication.clone());
        registry.add_schedule(schedule.clone());
        Ok(())
    })?;

    println!("✓ Added {}", med_name);
    println!("  Schedule: {}", schedule_id);
    let times_display: Vec<String> = schedule_times
        .iter()
        .map(|t| t.format("%H:%M").to_string())
        .collect();
    println!("  Reminders at {}", times_display.join(", "));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_edit(
    paths: &Paths,
    name: &str,
    dose: Option<String>,
    notes: Option<String>,
    time: Vec<String>,
    day: Vec<String>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<()> {
    let times = time
        .iter()
        .map(|t| parse_time(t))
        .collect::<Result<Vec<_>>>()?;
    let days = day
        .iter()
        .map(|d| parse_day(d))
        .collect::<Result<Vec<_>>>()?;

    let registry = Registry::update(&paths.registry, |registry| {
        let med_id = registry
            .medication_by_name(name)
            .map(|m| m.id)
            .ok_or_else(|| Error::Other(format!("no medication named '{}'", name)))?;

        if dose.is_some() || notes.is_some() {
            if let Some(medication) = registry.medications.get_mut(&med_id) {
                if let Some(dose) = dose.clone() {
                    medication.dose = Some(dose);
                }
                if let Some(notes) = notes.clone() {
                    medication.notes = Some(notes);
                }
            }
        }

        if !times.is_empty() {
            let schedule_id = registry
                .schedules
                .iter()
                .find(|s| s.medication_id == med_id && s.active)
                .map(|s| s.id)
                .ok_or_else(|| {
                    Error::InvalidSchedule(format!("no active schedule for '{}'", name))
                })?;
            registry.revise_schedule(
                schedule_id,
                ScheduleDraft {
                    times_of_day: times.clone(),
                    days_of_week: days.clone(),
                    start_date: start,
                    end_date: end,
                },
            )?;
        }

        Ok(())
    })?;

    println!("✓ Updated {}", name);
    if !times.is_empty() {
        if let Some(medication) = registry.medication_by_name(name) {
            if let Some(schedule) = registry
                .schedules
                .iter()
                .filter(|s| s.medication_id == medication.id && s.active)
                .max_by_key(|s| s.version)
            {
                let times_display: Vec<String> = schedule
                    .times_of_day
                    .iter()
                    .map(|t| t.format("%H:%M").to_string())
                    .collect();
                println!(
                    "  Schedule: {} v{}, reminders at {}",
                    schedule.id,
                    schedule.version,
                    times_display.join(", ")
                );
            }
        }
    }
    Ok(())
}

fn cmd_discontinue(paths: &Paths, name: &str) -> Result<()> {
    Registry::update(&paths.registry, |registry| {
        let med_id = registry
            .medication_by_name(name)
            .map(|m| m.id)
            .ok_or_else(|| Error::Other(format!("no medication named '{}'", name)))?;
        registry.discontinue_medication(med_id)
    })?;

    println!("✓ Discontinued {} (adherence history kept)", name);
    Ok(())
}

fn cmd_list(paths: &Paths) -> Result<()> {
    let registry = Registry::load(&paths.registry)?;

    if registry.medications.is_empty() {
        println!("No medications yet. Try: medtrack add --text \"aspirin 500mg twice daily\"");
        return Ok(());
    }

    let mut medications: Vec<_> = registry.medications.values().collect();
    medications.sort_by(|a, b| a.name.cmp(&b.name));

    for medication in medications {
        let marker = if medication.active { " " } else { "✗" };
        let dose = medication.dose.as_deref().unwrap_or("-");
        println!("{} {} ({})", marker, medication.name, dose);

        for schedule in registry
            .schedules
            .iter()
            .filter(|s| s.medication_id == medication.id && s.active)
        {
            let times: Vec<String> = schedule
                .times_of_day
                .iter()
                .map(|t| t.format("%H:%M").to_string())
                .collect();
            let until = schedule
                .end_date
                .map(|d| format!(" until {}", d))
                .unwrap_or_default();
            println!(
                "    {} v{}: {} from {}{}",
                schedule.id,
                schedule.version,
                times.join(", "),
                schedule.start_date,
                until
            );
        }
    }
    Ok(())
}

fn cmd_due(paths: &Paths, date: Option<NaiveDate>) -> Result<()> {
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let from = date.and_time(NaiveTime::MIN);
    let to = from + chrono::Duration::days(1);

    let registry = Registry::load(&paths.registry)?;
    let ledger = AdherenceLedger::from_records(load_records(&paths.wal, &paths.csv)?);

    let mut any = false;
    for schedule in registry.active_schedules() {
        let med_name = registry
            .medication(schedule.medication_id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| schedule.medication_id.to_string());

        for occurrence in occurrences_between(&schedule, from, to) {
            any = true;
            let key = occurrence.key();
            let status = ledger
                .get(&key)
                .map(|r| r.status.as_str())
                .unwrap_or("pending");
            println!(
                "{}  {}  [{}]  {}",
                occurrence.scheduled_at.format("%H:%M"),
                med_name,
                status,
                key
            );
        }
    }

    if !any {
        println!("Nothing due on {}", date);
    }
    Ok(())
}

fn cmd_record(paths: &Paths, key: &str, status: AdherenceStatus, at: Option<String>) -> Result<()> {
    let key: OccurrenceKey = key.parse()?;
    let (schedule_id, scheduled_at) = key.decompose()?;
    let at = match at {
        Some(s) => parse_datetime(&s)?,
        None => Local::now().naive_local(),
    };

    let registry = Registry::load(&paths.registry)?;
    let schedule = registry.recordable_schedule(schedule_id, scheduled_at)?;

    let mut ledger = AdherenceLedger::from_records(load_records(&paths.wal, &paths.csv)?);
    let record = ledger.record_status(&schedule, scheduled_at, status, at)?;

    let mut sink = JsonlSink::new(&paths.wal);
    sink.append(&record)?;

    println!(
        "✓ {} recorded as {}",
        record.occurrence_key,
        record.status.as_str()
    );
    Ok(())
}

fn cmd_sweep(paths: &Paths, config: &Config, as_of: Option<String>) -> Result<()> {
    let as_of = match as_of {
        Some(s) => parse_datetime(&s)?,
        None => Local::now().naive_local(),
    };

    let registry = Registry::load(&paths.registry)?;
    let schedules = registry.active_schedules();
    let mut ledger = AdherenceLedger::from_records(load_records(&paths.wal, &paths.csv)?);

    let mut sink = JsonlSink::new(&paths.wal);
    let missed = ledger.sweep_missed_into(&schedules, config.grace_period(), as_of, &mut sink);

    if missed.is_empty() {
        println!("Nothing newly missed as of {}", as_of.format("%Y-%m-%d %H:%M"));
    } else {
        println!("✓ Marked {} dose(s) missed:", missed.len());
        for record in &missed {
            let med_name = registry
                .medication(record.medication_id)
                .map(|m| m.name.clone())
                .unwrap_or_else(|| record.medication_id.to_string());
            println!(
                "  {} {} at {}",
                med_name,
                record.occurrence_key,
                record.scheduled_at.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}

fn cmd_stats(paths: &Paths, config: &Config, days: Option<i64>) -> Result<()> {
    let days = days.unwrap_or(config.adherence.stats_window_days);
    let now = Local::now().naive_local();
    let from = now - chrono::Duration::days(days);

    let registry = Registry::load(&paths.registry)?;
    let ledger = AdherenceLedger::from_records(load_records(&paths.wal, &paths.csv)?);

    let active_count = registry.medications.values().filter(|m| m.active).count();
    let taken_today = ledger
        .records()
        .filter(|r| r.status == AdherenceStatus::Taken && r.scheduled_at.date() == now.date())
        .count();
    println!("Active medications: {}", active_count);
    println!("Taken today: {}", taken_today);
    println!("Adherence over the last {} day(s):", days);

    let mut medications: Vec<_> = registry.medications.values().collect();
    medications.sort_by(|a, b| a.name.cmp(&b.name));

    for medication in medications {
        let stats = ledger.stats(medication.id, from, now);
        match stats.rate() {
            Some(rate) => println!(
                "  {}: {:.0}% ({} taken, {} skipped, {} missed)",
                medication.name,
                rate * 100.0,
                stats.taken,
                stats.skipped,
                stats.missed
            ),
            None => println!("  {}: no data", medication.name),
        }
    }
    Ok(())
}

fn cmd_rollup(paths: &Paths, cleanup: bool) -> Result<()> {
    if !paths.wal.exists() {
        println!("No adherence log found - nothing to roll up.");
        return Ok(());
    }

    let count = medtrack_core::csv_rollup::wal_to_csv_and_archive(&paths.wal, &paths.csv)?;

    println!("✓ Rolled up {} records to CSV", count);
    println!("  CSV: {}", paths.csv.display());

    if cleanup {
        let cleaned = medtrack_core::csv_rollup::cleanup_processed_wals(&paths.wal_dir)?;
        if cleaned > 0 {
            println!("✓ Cleaned up {} processed log files", cleaned);
        }
    }

    Ok(())
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|e| Error::Other(format!("invalid time '{}': {}", s, e)))
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .map_err(|e| Error::Other(format!("invalid timestamp '{}': {}", s, e)))
}

fn parse_day(s: &str) -> Result<DayOfWeek> {
    match s.to_lowercase().as_str() {
        "mon" | "monday" => Ok(DayOfWeek::Mon),
        "tue" | "tuesday" => Ok(DayOfWeek::Tue),
        "wed" | "wednesday" => Ok(DayOfWeek::Wed),
        "thu" | "thursday" => Ok(DayOfWeek::Thu),
        "fri" | "friday" => Ok(DayOfWeek::Fri),
        "sat" | "saturday" => Ok(DayOfWeek::Sat),
        "sun" | "sunday" => Ok(DayOfWeek::Sun),
        other => Err(Error::Other(format!("unknown weekday '{}'", other))),
    }
}
