mod api;
mod clock;
mod highlight;
mod kiosk;
mod logging;
mod render;
mod schedule;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use log::info;

use crate::api::{ApiServer, ApiServerConfig, ApiSharedState};
use crate::clock::source::{TimeSourceKind, select_source};
use crate::highlight::engine::EndTimeMode;
use crate::kiosk::KioskConfig;
use crate::logging::{LoggingConfig, init_logging};
use crate::schedule::model::{
    load_consultations, load_schedule, parse_weekday_name, weekday_display_name,
};
use crate::schedule::view::{ViewSelection, VisibilityWindow, classes_for_grade, grades};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliTimeSource {
    Monotonic,
    Wall,
}

impl From<CliTimeSource> for TimeSourceKind {
    fn from(value: CliTimeSource) -> Self {
        match value {
            CliTimeSource::Monotonic => TimeSourceKind::Monotonic,
            CliTimeSource::Wall => TimeSourceKind::Wall,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "lessonclock",
    version,
    about = "Timetable kiosk that highlights the current and next lesson"
)]
struct Cli {
    #[arg(long)]
    schedule: PathBuf,

    #[arg(long)]
    consultations: Option<PathBuf>,

    /// Authoritative time-of-day, H:MM:SS.
    #[arg(long)]
    server_time: Option<String>,

    #[arg(long = "class")]
    class_label: Option<String>,

    #[arg(long)]
    consultation_day: Option<String>,

    /// Seconds between full reloads.
    #[arg(long, default_value_t = 600)]
    refresh_interval: u64,

    /// Lessons without an end time last this many minutes.
    #[arg(long)]
    default_duration_min: Option<u32>,

    #[arg(long, default_value_t = 75)]
    show_before_start: u32,

    #[arg(long, default_value_t = 30)]
    show_after_end: u32,

    #[arg(long, value_enum, default_value_t = CliTimeSource::Monotonic)]
    time_source: CliTimeSource,

    #[arg(long)]
    api: bool,

    #[arg(long, default_value = "0.0.0.0")]
    api_bind: String,

    #[arg(long, default_value_t = 8099)]
    api_port: u16,

    /// Print the board as it looks at H:MM[:SS] and exit.
    #[arg(long)]
    at: Option<String>,

    #[arg(long)]
    list_classes: bool,

    #[arg(long)]
    max_ticks: Option<u64>,

    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LoggingConfig {
        env_filter: cli.log_level.clone(),
        ..LoggingConfig::default()
    });

    if cli.refresh_interval == 0 {
        bail!("--refresh-interval must be greater than zero");
    }
    if cli.max_ticks == Some(0) {
        bail!("--max-ticks must be greater than zero");
    }
    if cli.default_duration_min == Some(0) {
        bail!("--default-duration-min must be greater than zero");
    }

    if cli.list_classes {
        return list_classes(&cli);
    }

    let consultation_day = cli
        .consultation_day
        .as_deref()
        .map(|name| {
            parse_weekday_name(name)
                .with_context(|| format!("unknown weekday '{name}' for --consultation-day"))
        })
        .transpose()?;

    let config = KioskConfig {
        schedule_path: cli.schedule.clone(),
        consultations_path: cli.consultations.clone(),
        server_time: cli.server_time.clone(),
        selection: ViewSelection {
            class_label: cli.class_label.clone(),
            consultation_day,
        },
        refresh_interval: Duration::from_secs(cli.refresh_interval),
        end_time_mode: match cli.default_duration_min {
            Some(default_minutes) => EndTimeMode::FixedDuration { default_minutes },
            None => EndTimeMode::Explicit,
        },
        window: VisibilityWindow {
            before_start_min: cli.show_before_start,
            after_end_min: cli.show_after_end,
        },
        max_ticks: cli.max_ticks,
    };
    let selected = select_source(cli.time_source.into());

    if let Some(at) = cli.at.as_deref() {
        let board =
            kiosk::render_once(&config, &normalize_at_time(at), selected.source.as_ref())?;
        print!("{board}");
        return Ok(());
    }

    info!("using time source {}", selected.label);
    let api_server = if cli.api {
        let server = ApiServer::start(ApiServerConfig {
            bind_addr: cli.api_bind.clone(),
            port: cli.api_port,
        })
        .with_context(|| {
            format!(
                "failed to start local API at {}:{}",
                cli.api_bind, cli.api_port
            )
        })?;
        info!("local API listening on {}:{}", cli.api_bind, cli.api_port);
        Some(server)
    } else {
        None
    };
    let api_state: Option<Arc<Mutex<ApiSharedState>>> =
        api_server.as_ref().map(|server| Arc::clone(&server.state));

    let result = kiosk::run(&config, selected.source.as_ref(), api_state);
    drop(api_server);
    result
}

fn list_classes(cli: &Cli) -> Result<()> {
    let schedule = load_schedule(&cli.schedule)
        .with_context(|| format!("failed to load {}", cli.schedule.display()))?;
    for grade in grades(&schedule) {
        println!("{grade}: {}", classes_for_grade(&schedule, grade).join(", "));
    }

    if let Some(path) = &cli.consultations {
        let consultations = load_consultations(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        let days = consultations
            .days_in_order()
            .into_iter()
            .map(weekday_display_name)
            .collect::<Vec<_>>();
        println!("consultations: {}", days.join(", "));
    }
    Ok(())
}

/// `--at` accepts H:MM as shorthand for H:MM:00.
fn normalize_at_time(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.matches(':').count() == 1 {
        format!("{trimmed}:00")
    } else {
        trimmed.to_string()
    }
}
