//! `booking` CLI: list, check, book and edit recurring appointments.
//!
//! ## Usage
//!
//! ```sh
//! # Occurrences in a range (canonical civil times, configured zone)
//! booking list 2024-01-01T00:00:00 2024-01-31T23:59:59
//!
//! # Is a slot free?
//! booking check 2024-01-11T10:00:00 30
//!
//! # Book a weekly series on Thursdays
//! booking book --service haircut --start 2024-01-04T10:00:00 --duration 30 \
//!   --freq weekly --weekday 3 --title Juan
//!
//! # Edit single occurrences of a series
//! booking cancel A::2024-01-11T10:00:00
//! booking move A::2024-01-18T10:00:00 --to 2024-01-19T09:00:00
//! booking detach A::2024-01-25T10:00:00
//!
//! # Free slots on a day
//! booking free 2024-01-11 --min 45
//! ```
//!
//! Settings come from `<config_dir>/booking/config.toml` (or `--config`) and
//! `BOOKING_*` environment variables; see [`settings::Settings`].

mod file_store;
mod settings;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use occurrence_engine::{
    Appointment, CivilTime, Frequency, OccurrenceId, RecurrenceRule, Scheduler, Status, WallClock,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::file_store::JsonFileStore;
use crate::settings::Settings;

#[derive(Parser)]
#[command(
    name = "booking",
    version,
    about = "Recurring appointment booking from the command line"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to <config_dir>/booking/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot file, overriding the configured store
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List occurrences in an inclusive range
    List {
        from: CivilTime,
        to: CivilTime,
        /// Reference time for statuses (defaults to now)
        #[arg(long)]
        now: Option<CivilTime>,
    },
    /// Check whether a slot is free
    Check {
        start: CivilTime,
        duration: u32,
        /// Ignore occurrences of this appointment
        #[arg(long)]
        exclude: Option<String>,
    },
    /// Create or replace an appointment
    Book {
        /// Appointment id (a new uuid when omitted; an existing id edits that record)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        service: String,
        #[arg(long)]
        start: CivilTime,
        /// Minutes, a multiple of 15
        #[arg(long)]
        duration: u32,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Repeat: daily, weekly or monthly
        #[arg(long, value_parser = parse_frequency)]
        freq: Option<Frequency>,
        #[arg(long, default_value_t = 1)]
        interval: u32,
        /// Weekdays for weekly series, 0 = Monday .. 6 = Sunday
        #[arg(long, value_delimiter = ',', requires = "freq")]
        weekday: Vec<u8>,
        /// Last allowed start (inclusive)
        #[arg(long, requires = "freq")]
        until: Option<CivilTime>,
        /// Number of occurrences, counted from the start
        #[arg(long, requires = "freq")]
        count: Option<u32>,
    },
    /// Cancel one occurrence (a skip for series instances)
    Cancel { occurrence: OccurrenceId },
    /// Delete an appointment and all of its exceptions
    CancelSeries { id: String },
    /// Turn one series instance into a standalone appointment
    Detach { occurrence: OccurrenceId },
    /// Move one occurrence to a new start and/or duration
    Move {
        occurrence: OccurrenceId,
        #[arg(long)]
        to: Option<CivilTime>,
        #[arg(long)]
        duration: Option<u32>,
    },
    /// Set the status of a single appointment
    Mark { id: String, status: Status },
    /// Persist `done` on single appointments that have ended
    Settle {
        #[arg(long)]
        now: Option<CivilTime>,
    },
    /// Free slots on a civil date (YYYY-MM-DD)
    Free {
        date: NaiveDate,
        /// Only slots at least this many minutes long
        #[arg(long)]
        min: Option<u32>,
    },
}

fn parse_frequency(s: &str) -> std::result::Result<Frequency, String> {
    match s.to_ascii_lowercase().as_str() {
        "daily" => Ok(Frequency::Daily),
        "weekly" => Ok(Frequency::Weekly),
        "monthly" => Ok(Frequency::Monthly),
        other => Err(format!(
            "unknown frequency '{}' (expected daily, weekly or monthly)",
            other
        )),
    }
}

// ---------------------------------------------------------------------------
// Output rows
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OccurrenceRow {
    id: String,
    start: String,
    end: String,
    duration_min: u32,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    service_id: String,
    moved: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SlotRow {
    start: String,
    end: String,
    duration_minutes: i64,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        settings.store = store;
    }
    init_logging(&settings.log_level);

    let clock = settings.clock()?;
    let store = JsonFileStore::open(&settings.store, &clock)
        .with_context(|| format!("Failed to open store: {}", settings.store.display()))?;
    for failure in store.load_failures() {
        eprintln!(
            "warning: unreadable {} record {} kept as-is: {}",
            failure.table, failure.id, failure.error
        );
    }
    tracing::debug!(store = %store.path().display(), timezone = %settings.timezone, "loaded settings");
    let mut scheduler = Scheduler::new(store, clock);

    run(cli.command, &mut scheduler, cli.json)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn reference_time(clock: &WallClock, now: Option<CivilTime>) -> Result<DateTime<Tz>> {
    match now {
        Some(civil) => Ok(clock.localize(civil)?),
        None => Ok(clock.now()),
    }
}

fn run(command: Commands, scheduler: &mut Scheduler<JsonFileStore>, json: bool) -> Result<()> {
    let clock = *scheduler.clock();

    match command {
        Commands::List { from, to, now } => {
            let now = reference_time(&clock, now)?;
            let expansion = scheduler
                .get_occurrences_at(&from.to_string(), &to.to_string(), &now)
                .context("Failed to list occurrences")?;

            for failure in &expansion.failures {
                eprintln!(
                    "warning: appointment {} skipped: {}",
                    failure.appointment_id, failure.error
                );
            }
            let rows: Vec<OccurrenceRow> = expansion
                .occurrences
                .iter()
                .map(|o| OccurrenceRow {
                    id: o.id.to_string(),
                    start: clock.to_canonical(&o.start).to_string(),
                    end: clock.to_canonical(&o.end).to_string(),
                    duration_min: o.duration_minutes,
                    status: o.status.as_str(),
                    title: o.title.clone(),
                    service_id: o.service_id.clone(),
                    moved: o.moved,
                })
                .collect();

            if json {
                print_json(&rows)?;
            } else {
                for row in &rows {
                    println!(
                        "{}  {}  {:<9}  {}  {}",
                        row.start,
                        row.end,
                        row.status,
                        row.id,
                        row.title.as_deref().unwrap_or(&row.service_id)
                    );
                }
            }
        }
        Commands::Check {
            start,
            duration,
            exclude,
        } => {
            let availability = scheduler
                .check_slot(&start.to_string(), duration, exclude.as_deref())
                .context("Failed to check slot")?;

            if json {
                let conflicts: Vec<String> = availability
                    .conflicts
                    .iter()
                    .map(|c| c.occurrence.to_string())
                    .collect();
                print_json(&serde_json::json!({
                    "available": availability.available,
                    "conflicts": conflicts,
                }))?;
            } else if availability.available {
                println!("available");
            } else {
                println!("unavailable");
                for conflict in &availability.conflicts {
                    println!(
                        "  {} ({} min overlap)",
                        conflict.occurrence, conflict.overlap_minutes
                    );
                }
            }
        }
        Commands::Book {
            id,
            service,
            start,
            duration,
            title,
            client,
            notes,
            freq,
            interval,
            weekday,
            until,
            count,
        } => {
            let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let mut appointment = match freq {
                Some(freq) => {
                    let rule = RecurrenceRule {
                        freq,
                        interval,
                        byweekday: weekday,
                        until,
                        count,
                    };
                    Appointment::recurring(id, service, start, duration, rule)
                }
                None => Appointment::single(id, service, start, duration),
            };
            appointment.title = title;
            appointment.client_id = client;
            appointment.notes = notes;

            let booked_id = appointment.id.clone();
            scheduler.book(appointment).context("Failed to book")?;
            println!("{}", booked_id);
        }
        Commands::Cancel { occurrence } => {
            scheduler
                .cancel_occurrence(&occurrence)
                .with_context(|| format!("Failed to cancel {}", occurrence))?;
            println!("cancelled {}", occurrence);
        }
        Commands::CancelSeries { id } => {
            scheduler
                .cancel_series(&id)
                .with_context(|| format!("Failed to cancel series {}", id))?;
            println!("deleted {}", id);
        }
        Commands::Detach { occurrence } => {
            let detached = scheduler
                .detach_occurrence(&occurrence)
                .with_context(|| format!("Failed to detach {}", occurrence))?;
            println!("{}", detached.id);
        }
        Commands::Move {
            occurrence,
            to,
            duration,
        } => {
            scheduler
                .move_occurrence(&occurrence, to, duration)
                .with_context(|| format!("Failed to move {}", occurrence))?;
            println!("moved {}", occurrence);
        }
        Commands::Mark { id, status } => {
            scheduler
                .mark(&OccurrenceId::single(id.clone()), status)
                .with_context(|| format!("Failed to mark {}", id))?;
            println!("{} {}", id, status.as_str());
        }
        Commands::Settle { now } => {
            let now = reference_time(&clock, now)?;
            let settled = scheduler
                .settle_expired_at(&now)
                .context("Failed to settle expired appointments")?;
            if json {
                print_json(&settled)?;
            } else {
                for id in &settled {
                    println!("{}", id);
                }
            }
        }
        Commands::Free { date, min } => {
            let slots = scheduler
                .free_slots(date)
                .with_context(|| format!("Failed to compute free slots for {}", date))?;
            let rows: Vec<SlotRow> = slots
                .iter()
                .filter(|s| s.duration_minutes >= i64::from(min.unwrap_or(0)))
                .map(|s| SlotRow {
                    start: clock.to_canonical(&s.start).to_string(),
                    end: clock.to_canonical(&s.end).to_string(),
                    duration_minutes: s.duration_minutes,
                })
                .collect();

            if json {
                print_json(&rows)?;
            } else {
                for row in &rows {
                    println!("{}  {}  {} min", row.start, row.end, row.duration_minutes);
                }
            }
        }
    }

    Ok(())
}
