use std::io::BufRead;
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crossbeam_channel::{select, Receiver};
use serde::Serialize;

use safeview_core::app::privacy_screen_app::{PerformanceSnapshot, PrivacyScreenApp, StatusSnapshot};
use safeview_core::protection::domain::effect_parameters::EffectParameters;
use safeview_core::protection::domain::protection_mode::ProtectionMode;
use safeview_core::protection::infrastructure::logging_effect_handler::LoggingEffectHandler;
use safeview_core::protection::screen_protector::ScreenProtector;
use safeview_core::settings::config::Config;
use safeview_core::settings::log_file::{open_log_file, Tee};
use safeview_core::settings::settings_store::{parse_scalar, peek_config, ExportFormat, SettingsStore};

/// Presence-aware screen privacy: protects the screen whenever you look away.
#[derive(Parser)]
#[command(name = "safeview", version)]
struct Cli {
    /// Configuration file (default: first existing of the standard locations).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start protection until Ctrl-C, Enter, end of stdin or --duration.
    Run {
        /// Stop automatically after this many seconds.
        #[arg(long)]
        duration: Option<u64>,

        /// Protection mode for this run (also saved to the configuration).
        #[arg(long)]
        mode: Option<String>,

        /// Detection sensitivity 0.0-1.0 (also saved to the configuration).
        #[arg(long)]
        sensitivity: Option<f64>,

        /// Print performance figures every N seconds (0 = never).
        #[arg(long, default_value = "0")]
        report_every: u64,
    },
    /// Print application status and performance.
    Status {
        /// Print JSON instead of YAML.
        #[arg(long)]
        json: bool,
    },
    /// List protection modes.
    Modes,
    /// Briefly apply a protection mode and restore the previous state.
    Test {
        mode: String,
    },
    /// Inspect or change the configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Manage faces recognised as the authorised user.
    #[command(subcommand)]
    Faces(FacesCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration.
    Show,
    /// Check value ranges.
    Validate,
    /// Set a value by dotted key, e.g. `camera.fps 15`.
    Set { key: String, value: String },
    /// Write the configuration to a file.
    Export {
        path: PathBuf,
        /// yaml or json.
        #[arg(long, default_value = "yaml")]
        format: String,
    },
    /// Merge a YAML or JSON file into the configuration.
    Import { path: PathBuf },
    /// Restore every default.
    Reset,
    /// Location and size of the configuration.
    Info,
}

#[derive(Subcommand)]
enum FacesCommand {
    /// Look into the camera and store your face under NAME.
    Add {
        name: String,
        /// Seconds to wait for a face.
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
    /// Forget a stored face.
    Remove { name: String },
    /// List stored faces.
    List,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&peek_config(cli.config.as_deref()));
    let settings = SettingsStore::open(cli.config.as_deref());
    log::debug!("Using configuration {}", settings.path().display());

    match cli.command {
        Command::Run {
            duration,
            mode,
            sensitivity,
            report_every,
        } => run_protection(settings, duration, mode, sensitivity, report_every),
        Command::Status { json } => {
            let app = PrivacyScreenApp::from_settings(settings);
            let report = StatusReport {
                status: app.status(),
                performance: app.performance(),
            };
            print_value(&report, json)
        }
        Command::Modes => {
            print!("{}", render_modes(settings.config().protection_mode()));
            Ok(())
        }
        Command::Test { mode } => run_test(&settings, &mode),
        Command::Config(cmd) => run_config(settings, cmd),
        Command::Faces(cmd) => run_faces(settings, cmd),
    }
}

/// `RUST_LOG` wins over `logging.level`; output also goes to the log file
/// when one is configured and can be opened.
fn init_logging(config: &Config) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_filter()),
    );
    let file_error = match open_log_file(&config.logging) {
        Ok(Some(file)) => {
            builder.target(env_logger::Target::Pipe(Box::new(Tee::new(std::io::stderr(), file))));
            None
        }
        Ok(None) => None,
        Err(e) => Some(e),
    };
    builder.init();
    if let Some(e) = file_error {
        log::warn!("Cannot open log file {}: {e}", config.logging.log_file);
    }
}

#[derive(Serialize)]
struct StatusReport {
    status: StatusSnapshot,
    performance: PerformanceSnapshot,
}

fn run_protection(
    settings: SettingsStore,
    duration: Option<u64>,
    mode: Option<String>,
    sensitivity: Option<f64>,
    report_every: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = PrivacyScreenApp::from_settings(settings);
    if let Some(mode) = mode {
        if !app.set_protection_mode(&mode) {
            return Err(format!("invalid protection mode {mode:?}").into());
        }
    }
    if let Some(s) = sensitivity {
        if !app.set_sensitivity(s) {
            return Err(format!("invalid sensitivity {s}").into());
        }
    }

    if !app.start_protection() {
        return Err("failed to start protection".into());
    }
    let (stop, deadline) = match duration {
        Some(secs) => {
            println!("Protection running for {secs} s. Press Ctrl-C to stop early.");
            (
                crossbeam_channel::never(),
                crossbeam_channel::after(Duration::from_secs(secs)),
            )
        }
        None => {
            println!("Protection running. Press Enter or Ctrl-C to stop.");
            (stdin_closed(), crossbeam_channel::never())
        }
    };
    let reports = match report_every {
        0 => crossbeam_channel::never(),
        secs => crossbeam_channel::tick(Duration::from_secs(secs)),
    };

    let reason = wait_for_stop(&stop, &deadline, &ctrl_c(), &reports, || {
        let perf = app.performance();
        println!(
            "fps {:.1} | reaction {:.1} ms | cpu {:.1}% | memory {:.1} MB | camera {:.1} fps",
            perf.fps, perf.avg_reaction_time, perf.cpu_usage, perf.memory_usage_mb, perf.camera_fps
        );
    });
    log::info!("Stopping protection ({reason:?})");

    if !app.stop_protection() {
        return Err("protection did not stop cleanly".into());
    }
    println!("Protection stopped.");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Input,
    Deadline,
    Interrupt,
}

/// Block until one of the stop sources fires, calling `report` on every
/// report tick.
fn wait_for_stop(
    input: &Receiver<()>,
    deadline: &Receiver<Instant>,
    interrupt: &Receiver<()>,
    reports: &Receiver<Instant>,
    mut report: impl FnMut(),
) -> StopReason {
    loop {
        select! {
            recv(input) -> _ => return StopReason::Input,
            recv(deadline) -> _ => return StopReason::Deadline,
            recv(interrupt) -> _ => return StopReason::Interrupt,
            recv(reports) -> _ => report(),
        }
    }
}

/// Fires on the first Ctrl-C. Never fires when the signal cannot be
/// listened for.
fn ctrl_c() -> Receiver<()> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            log::warn!("Cannot listen for Ctrl-C: {e}");
            return crossbeam_channel::never();
        }
    };
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        runtime.block_on(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("Cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        });
        let _ = tx.send(());
    });
    rx
}

/// Fires once a line is entered on stdin or stdin reaches end of file.
fn stdin_closed() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = tx.send(());
    });
    rx
}

fn run_test(settings: &SettingsStore, mode: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mode: ProtectionMode = mode.parse()?;
    let config = settings.config();
    let mut protector = ScreenProtector::new(
        Box::new(LoggingEffectHandler::new()),
        config.protection_mode(),
        config.effect_parameters(),
    );
    if !protector.test_protection(mode) {
        return Err(format!("{mode} protection test failed").into());
    }
    println!("{mode} protection works");
    Ok(())
}

fn render_modes(current: ProtectionMode) -> String {
    let defaults = EffectParameters::default();
    let mut out = String::new();
    for &mode in ScreenProtector::available_modes() {
        let marker = if mode == current { "*" } else { " " };
        out.push_str(&format!("{marker} {:<11}{}\n", mode.name(), mode.description()));
    }
    out.push_str(&format!(
        "\ndefaults: blur_intensity={} pixel_block_size={} brightness_reduction={} overlay_opacity={}\n",
        defaults.blur_intensity,
        defaults.pixel_block_size,
        defaults.brightness_reduction,
        defaults.overlay_opacity
    ));
    out
}

fn run_config(mut settings: SettingsStore, cmd: ConfigCommand) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        ConfigCommand::Show => print!("{}", serde_yaml::to_string(settings.document())?),
        ConfigCommand::Validate => {
            let report = settings.validate();
            for error in &report.errors {
                println!("error: {error}");
            }
            for warning in &report.warnings {
                println!("warning: {warning}");
            }
            if !report.is_valid() {
                return Err(format!("{} configuration error(s)", report.errors.len()).into());
            }
            println!("Configuration is valid");
        }
        ConfigCommand::Set { key, value } => {
            settings.set_value(&key, parse_scalar(&value))?;
            println!("{key} = {value}");
        }
        ConfigCommand::Export { path, format } => {
            let format: ExportFormat = format.parse()?;
            settings.export(format, &path)?;
            println!("Exported {format} configuration to {}", path.display());
        }
        ConfigCommand::Import { path } => {
            settings.import(&path)?;
            println!("Imported {}", path.display());
        }
        ConfigCommand::Reset => {
            settings.reset_to_defaults()?;
            println!("Configuration reset to defaults");
        }
        ConfigCommand::Info => print_value(&settings.info(), false)?,
    }
    Ok(())
}

fn run_faces(settings: SettingsStore, cmd: FacesCommand) -> Result<(), Box<dyn std::error::Error>> {
    let app = PrivacyScreenApp::from_settings(settings);
    match cmd {
        FacesCommand::Add { name, timeout } => {
            println!("Look at the camera...");
            app.add_known_face(&name, Duration::from_secs(timeout))?;
            println!("Stored face {name}");
        }
        FacesCommand::Remove { name } => {
            if !app.remove_known_face(&name)? {
                return Err(format!("no stored face named {name:?}").into());
            }
            println!("Removed face {name}");
        }
        FacesCommand::List => {
            let names = app.known_faces();
            if names.is_empty() {
                println!("No stored faces");
            }
            for name in names {
                println!("{name}");
            }
        }
    }
    Ok(())
}

fn print_value<T: Serialize>(value: &T, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", serde_yaml::to_string(value)?);
    }
    Ok(())
}
