//! Flutter build driver
//!
//! Runs `flutter clean`, `flutter pub get`, `flutter run` and `flutter build
//! apk` through the command runner and hands back the captured output so a
//! failing build can be classified.

use crate::emulator::parse_adb_devices;
use crate::probe::Tools;
use emurun_cli::output::Status;
use emurun_core::error::{Error, Result};
use emurun_core::process::{run_lenient, CommandResult, CommandRunner, Invocation, OutputMode};
use emurun_telemetry::Timer;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Options some Flutter versions reject; stripped from every invocation
pub const INVALID_FLUTTER_OPTIONS: &[&str] = &["--no-enable-ios", "--no-enable-android", "--no-example"];

/// Where `flutter build apk` leaves its output, relative to the project root
pub const APK_OUTPUT_DIR: &str = "build/app/outputs/flutter-apk";

/// Drop [`INVALID_FLUTTER_OPTIONS`], warning when anything was removed
pub fn filter_flutter_args(args: &[String]) -> Vec<String> {
    let kept: Vec<String> = args
        .iter()
        .filter(|arg| !INVALID_FLUTTER_OPTIONS.contains(&arg.as_str()))
        .cloned()
        .collect();
    if kept.len() != args.len() {
        Status::warning(&format!(
            "Removed unsupported flutter options: flutter {} -> flutter {}",
            args.join(" "),
            kept.join(" ")
        ));
    }
    kept
}

/// APK build flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildType {
    /// `--debug`
    Debug,
    /// `--profile`
    Profile,
    /// `--release`
    #[default]
    Release,
}

impl BuildType {
    /// Flag passed to `flutter build apk`
    pub fn flag(self) -> &'static str {
        match self {
            Self::Debug => "--debug",
            Self::Profile => "--profile",
            Self::Release => "--release",
        }
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flag()[2..])
    }
}

impl FromStr for BuildType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "profile" => Ok(Self::Profile),
            "release" => Ok(Self::Release),
            other => Err(Error::validation(format!(
                "Unknown build type '{other}' (expected debug, profile or release)"
            ))),
        }
    }
}

/// Outcome of a build step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Whether the step succeeded
    pub success: bool,
    /// Captured output of the failing (or last) command
    pub output: String,
}

impl BuildReport {
    /// A successful step with no output of interest
    pub fn ok() -> Self {
        Self {
            success: true,
            output: String::new(),
        }
    }

    /// A failed step with its captured output
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Result of `flutter build apk`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApkBuild {
    /// Build outcome; fails when no APK was produced
    pub report: BuildReport,
    /// APKs produced (copied into the output directory when one was given)
    pub apks: Vec<PathBuf>,
}

/// Runs Flutter commands for one project
pub struct BuildDriver<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    tools: Tools,
    root: PathBuf,
    verbose: bool,
    build_timeout: Option<Duration>,
    default_serial: String,
}

impl<'a, R: CommandRunner + ?Sized> BuildDriver<'a, R> {
    /// Driver for the project at `root`
    pub fn new(runner: &'a R, tools: Tools, root: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            tools,
            root: root.into(),
            verbose: false,
            build_timeout: None,
            default_serial: "emulator-5554".to_string(),
        }
    }

    /// Echo command output
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Kill builds after `timeout`
    #[must_use]
    pub fn with_build_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Serial tried when `adb devices` shows no emulator
    #[must_use]
    pub fn with_default_serial(mut self, serial: impl Into<String>) -> Self {
        self.default_serial = serial.into();
        self
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runner every command goes through
    pub fn runner(&self) -> &'a R {
        self.runner
    }

    /// Resolved tool paths
    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    fn flutter<S: AsRef<str>>(&self, args: &[S], mode: OutputMode) -> Invocation {
        let args: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        let mut invocation = Invocation::new(self.tools.flutter.as_str(), filter_flutter_args(&args))
            .in_dir(&self.root)
            .with_mode(mode);
        if let Some(timeout) = self.build_timeout {
            invocation = invocation.with_timeout(timeout);
        }
        invocation
    }

    fn quiet_mode(&self) -> OutputMode {
        if self.verbose { OutputMode::Echo } else { OutputMode::Capture }
    }

    /// Run a flutter command and report it
    pub fn flutter_step<S: AsRef<str>>(&self, args: &[S]) -> BuildReport {
        let invocation = self.flutter(args, self.quiet_mode());
        tracing::debug!(command = %invocation.command_line(), "flutter");
        let result = run_lenient(self.runner, &invocation);
        if result.success {
            BuildReport::ok()
        } else {
            Status::error(&format!("{} failed", invocation.command_line()));
            BuildReport::failed(result.output().unwrap_or_else(|| "command timed out".to_string()))
        }
    }

    /// Run a flutter command and hand back its raw result
    pub fn flutter_output<S: AsRef<str>>(&self, args: &[S]) -> CommandResult {
        let invocation = self.flutter(args, self.quiet_mode());
        tracing::debug!(command = %invocation.command_line(), "flutter");
        run_lenient(self.runner, &invocation)
    }

    /// `flutter pub get`
    pub fn pub_get(&self) -> BuildReport {
        self.flutter_step(&["pub", "get"])
    }

    /// `flutter clean` (unless skipped), then `flutter pub get`
    pub fn prepare(&self, clean: bool) -> BuildReport {
        if clean {
            Status::info("Cleaning build output...");
            let report = self.flutter_step(&["clean"]);
            if !report.success {
                return report;
            }
        }
        Status::info("Fetching packages...");
        self.pub_get()
    }

    /// First attached emulator serial
    pub fn resolve_serial(&self) -> Option<String> {
        let invocation = Invocation::new(self.tools.adb.as_str(), ["devices"]).with_timeout(Duration::from_secs(30));
        let result = run_lenient(self.runner, &invocation);
        if !result.success {
            return None;
        }
        parse_adb_devices(&result.stdout).into_iter().next()
    }

    /// Stream `flutter run -d <serial>` and capture its output
    ///
    /// `serial` is the one the selected emulator was matched to. When it is
    /// unknown the first attached emulator is used, then the configured
    /// default serial, then a plain `flutter run`.
    pub fn run_on_emulator(&self, name: &str, serial: Option<&str>) -> BuildReport {
        let timer = Timer::start("flutter run");
        Status::info(&format!("Launching the app on {name} (Ctrl+C to stop)"));

        let serial = serial.map(str::to_string).or_else(|| self.resolve_serial());
        let report = match serial {
            Some(serial) => {
                tracing::info!(%serial, "emulator serial detected");
                self.stream(&["run", "-d", serial.as_str()])
            }
            None => {
                Status::warning(&format!(
                    "Could not detect the emulator serial; trying {}",
                    self.default_serial
                ));
                let report = self.stream(&["run", "-d", self.default_serial.as_str()]);
                if report.success {
                    report
                } else {
                    Status::warning("Falling back to flutter run without a device");
                    self.stream(&["run"])
                }
            }
        };
        timer.stop();
        report
    }

    fn stream(&self, args: &[&str]) -> BuildReport {
        let invocation = self.flutter(args, OutputMode::Stream);
        let result = run_lenient(self.runner, &invocation);
        BuildReport {
            success: result.success,
            output: result.output().unwrap_or_else(|| "flutter run timed out".to_string()),
        }
    }

    /// `flutter build apk`, then collect the APKs
    ///
    /// With an output directory the build is split per ABI and every APK is
    /// copied there.
    pub fn build_apk(&self, build_type: BuildType, output_dir: Option<&Path>) -> ApkBuild {
        let timer = Timer::start("flutter build apk");
        let mut args = vec!["build", "apk", build_type.flag()];
        if output_dir.is_some() {
            args.push("--split-per-abi");
        }
        Status::info(&format!("Building {build_type} APK..."));
        let report = self.flutter_step(&args);
        timer.stop();
        if !report.success {
            return ApkBuild {
                report,
                apks: Vec::new(),
            };
        }

        let built = find_apks(&self.root.join(APK_OUTPUT_DIR));
        let apks = match output_dir {
            Some(dir) => match copy_apks(&built, &self.root.join(dir)) {
                Ok(copied) => copied,
                Err(err) => {
                    return ApkBuild {
                        report: BuildReport::failed(err.to_string()),
                        apks: built,
                    };
                }
            },
            None => built,
        };

        if apks.is_empty() {
            Status::warning("Build succeeded but no APK was found");
            return ApkBuild {
                report: BuildReport::failed(format!("no APK in {APK_OUTPUT_DIR}")),
                apks,
            };
        }
        for apk in &apks {
            Status::success(&format!("APK: {}", apk.display()));
        }
        ApkBuild { report, apks }
    }
}

/// APK files in `dir`, sorted
pub fn find_apks(dir: &Path) -> Vec<PathBuf> {
    let pattern = dir.join("*.apk");
    let Ok(paths) = glob::glob(&pattern.to_string_lossy()) else {
        return Vec::new();
    };
    let mut apks: Vec<PathBuf> = paths.flatten().collect();
    apks.sort();
    apks
}

/// Copy `apks` into `dir`, creating it, and return the copies
pub fn copy_apks(apks: &[PathBuf], dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    apks.iter()
        .filter_map(|apk| apk.file_name().map(|name| (apk, dir.join(name))))
        .map(|(apk, target)| {
            std::fs::copy(apk, &target)?;
            tracing::debug!(from = %apk.display(), to = %target.display(), "apk copied");
            Ok(target)
        })
        .collect()
}
