//! emurun
//!
//! Boot an Android emulator and run a Flutter app on it, repairing the
//! Gradle build when it fails.

use anyhow::Result;
use clap::Parser;
use emurun_android::driver::BuildType;
use emurun_android::probe::{self, ProbeInputs};
use emurun_android::workflow::{self, RunOptions};
use emurun_cli::prompt::ConsolePrompt;
use emurun_core::config::Config;
use emurun_core::process::{SystemRunner, ToolchainEnv};
use emurun_telemetry::TelemetryConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "emurun")]
#[command(about = "Boot an Android emulator and run a Flutter app on it, repairing the build when it fails")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Flutter project directory
    #[arg(short = 'C', long = "project", default_value = ".")]
    project: PathBuf,

    /// Increase output verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error log output
    #[arg(short, long)]
    quiet: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Skip `flutter clean` before the first build
    #[arg(long)]
    no_clean: bool,

    /// List emulators and exit
    #[arg(long)]
    list: bool,

    /// Emulator name or number from the list
    #[arg(long)]
    emulator: Option<String>,

    /// Build APKs instead of running on an emulator
    #[arg(long)]
    build_apk: bool,

    /// Directory the APKs are copied to
    #[arg(long, default_value = "apk_output")]
    apk_output: PathBuf,

    /// APK type: debug, profile, release
    #[arg(long, default_value = "release", value_parser = parse_build_type)]
    apk_type: BuildType,

    /// Run the emergency Gradle repair before building
    #[arg(long)]
    force_gradle_cache_fix: bool,

    /// Never regenerate the Android platform directory
    #[arg(long)]
    no_regenerate: bool,

    /// Seconds to wait for the emulator to boot
    #[arg(long)]
    boot_timeout: Option<u64>,
}

fn parse_build_type(raw: &str) -> std::result::Result<BuildType, String> {
    raw.parse::<BuildType>().map_err(|err| err.message)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    let config = Config::load(cli.config.as_deref(), &cli.project)?;
    let schema = &config.schema;

    let guard = emurun_telemetry::init_with_config(TelemetryConfig {
        log_level: emurun_telemetry::level_for(cli.verbose, cli.quiet, &schema.logging.level),
        ansi: !cli.no_color,
        file_dir: schema.logging.file_log.then(|| config.log_dir(&cli.project)),
        ..TelemetryConfig::default()
    })?;

    let inputs = ProbeInputs::from_process();
    let env = match probe::locate_sdk(&inputs) {
        Some(sdk) => probe::toolchain_env(&sdk, &inputs),
        None => ToolchainEnv::from_process(),
    };
    let runner = SystemRunner::new(env);

    let options = RunOptions {
        project_dir: cli.project,
        clean: !cli.no_clean,
        list_only: cli.list,
        emulator: cli.emulator,
        build_apk: cli.build_apk,
        apk_output: Some(cli.apk_output),
        apk_type: cli.apk_type,
        force_gradle_cache_fix: cli.force_gradle_cache_fix,
        no_regenerate: cli.no_regenerate,
        boot_timeout: cli.boot_timeout.map(Duration::from_secs),
        verbose: cli.verbose > 0,
        ..RunOptions::default()
    };

    let exit_code = workflow::run(&options, &config, &runner, &inputs, &mut ConsolePrompt);

    drop(guard);
    std::process::exit(exit_code);
}
