//! Android emulator control
//!
//! Lists AVDs with their API level, ABI and running state, boots one in the
//! background and waits for it, and resolves a user's choice.

use crate::probe::Tools;
use emurun_cli::output::{fit, format_duration, Status};
use emurun_cli::progress;
use emurun_cli::prompt::Prompt;
use emurun_core::config::EmulatorConfig;
use emurun_core::process::{run_lenient, CommandRunner, Invocation};
use emurun_telemetry::Timer;
use once_cell::sync::Lazy;
use owo_colors::OwoColorize;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

static CONFIG_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^target=[^\r\n]*?android-(\d+)").expect("Invalid target regex"));
static CONFIG_ABI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^abi\.type=([^\r\n]+)").expect("Invalid abi regex"));
static CONFIG_SYSDIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^image\.sysdir\.1=([^\r\n]+)").expect("Invalid sysdir regex"));
static NAME_API: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"API_(\d+)").expect("Invalid api name regex"));

/// ABIs recognised in system image paths and AVD names, most specific first
const ABIS: &[(&str, &str)] = &[
    ("x86_64", "x86_64"),
    ("x86", "x86"),
    ("arm64", "arm64-v8a"),
    ("armeabi-v7a", "armeabi-v7a"),
];

/// Android release for an API level
pub fn android_version(api_level: u32) -> Option<&'static str> {
    let version = match api_level {
        35 => "15.0",
        34 => "14.0",
        33 => "13.0",
        32 => "12.1",
        31 => "12.0",
        30 => "11.0",
        29 => "10.0",
        28 => "9.0",
        27 => "8.1",
        26 => "8.0",
        25 => "7.1",
        24 => "7.0",
        23 => "6.0",
        22 => "5.1",
        _ => return None,
    };
    Some(version)
}

/// Whether an AVD is up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorState {
    /// Attached to adb under `serial`
    Running {
        /// adb serial, e.g. `emulator-5554`
        serial: String,
    },
    /// Not running
    Stopped,
}

impl fmt::Display for EmulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running { .. } => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// One AVD as seen by a single enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorDescriptor {
    /// AVD name, also its id for `emulator -avd`
    pub name: String,
    /// API level from config.ini or the name
    pub api_level: Option<u32>,
    /// Android release derived from the API level
    pub android_version: Option<String>,
    /// System image ABI
    pub abi: Option<String>,
    /// Running state
    pub state: EmulatorState,
}

impl EmulatorDescriptor {
    /// A stopped AVD with details read from its config.ini text
    pub fn from_config(name: &str, config_ini: Option<&str>) -> Self {
        let config = config_ini.unwrap_or_default();
        let api_level = CONFIG_TARGET
            .captures(config)
            .or_else(|| NAME_API.captures(name))
            .and_then(|caps| caps[1].parse().ok());
        let abi = CONFIG_ABI
            .captures(config)
            .map(|caps| caps[1].trim().to_string())
            .or_else(|| CONFIG_SYSDIR.captures(config).and_then(|caps| abi_in(&caps[1])))
            .or_else(|| abi_in(name));
        Self {
            name: name.to_string(),
            api_level,
            android_version: api_level.map(|api| {
                android_version(api).map_or_else(|| format!("API {api}"), ToString::to_string)
            }),
            abi,
            state: EmulatorState::Stopped,
        }
    }

    /// Whether the AVD is attached to adb
    pub fn is_running(&self) -> bool {
        matches!(self.state, EmulatorState::Running { .. })
    }
}

fn abi_in(text: &str) -> Option<String> {
    ABIS.iter()
        .find(|(needle, _)| text.contains(needle))
        .map(|(_, abi)| (*abi).to_string())
}

/// Emulator serials in `adb devices` output that are fully attached
pub fn parse_adb_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .skip_while(|line| !line.starts_with("List of devices"))
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let serial = cols.next()?;
            (serial.starts_with("emulator-") && cols.next() == Some("device")).then(|| serial.to_string())
        })
        .collect()
}

/// `~/.android/avd`, or `ANDROID_AVD_HOME` when set
pub fn default_avd_home() -> Option<PathBuf> {
    std::env::var_os("ANDROID_AVD_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".android").join("avd")))
}

/// Boot wait limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootOptions {
    /// Stop waiting after this long (and carry on anyway)
    pub timeout: Duration,
    /// Delay between readiness checks
    pub poll_interval: Duration,
    /// Pause after boot completes
    pub settle: Duration,
}

impl BootOptions {
    /// Limits from the `[emulator]` config section
    pub fn from_config(config: &EmulatorConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.boot_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            settle: Duration::from_secs(config.settle_secs),
        }
    }
}

impl Default for BootOptions {
    fn default() -> Self {
        Self::from_config(&EmulatorConfig::default())
    }
}

/// Lists and boots AVDs through a [`CommandRunner`]
pub struct EmulatorController<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    tools: Tools,
    avd_home: Option<PathBuf>,
    timeout: Duration,
    progress: bool,
}

impl<'a, R: CommandRunner + ?Sized> EmulatorController<'a, R> {
    /// Controller using `tools` and reading AVD configs from `avd_home`
    pub fn new(runner: &'a R, tools: Tools, avd_home: Option<PathBuf>) -> Self {
        Self {
            runner,
            tools,
            avd_home,
            timeout: Duration::from_secs(30),
            progress: false,
        }
    }

    /// Limit for each adb/emulator query
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Show a spinner while waiting for boot
    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn query(&self, program: &str, args: &[&str]) -> Option<String> {
        let invocation = Invocation::new(program, args.iter().copied()).with_timeout(self.timeout);
        let result = run_lenient(self.runner, &invocation);
        if result.success { result.output() } else { None }
    }

    /// Serials of attached emulators
    pub fn running_serials(&self) -> Vec<String> {
        self.query(&self.tools.adb, &["devices"])
            .map(|out| parse_adb_devices(&out))
            .unwrap_or_default()
    }

    /// AVD name behind a running serial
    pub fn avd_name(&self, serial: &str) -> Option<String> {
        let out = self.query(&self.tools.adb, &["-s", serial, "emu", "avd", "name"])?;
        out.lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && *line != "OK")
            .map(ToString::to_string)
    }

    /// Serial of the running instance of `name`
    pub fn serial_of(&self, name: &str) -> Option<String> {
        self.running_serials()
            .into_iter()
            .find(|serial| self.avd_name(serial).as_deref() == Some(name))
    }

    fn read_config(&self, name: &str) -> Option<String> {
        std::fs::read_to_string(config_path(self.avd_home.as_ref()?, name)).ok()
    }

    /// Every AVD `emulator -list-avds` reports, with its running state
    pub fn list(&self) -> Vec<EmulatorDescriptor> {
        let Some(names) = self.query(&self.tools.emulator, &["-list-avds"]) else {
            Status::warning("Could not list emulators; is the Android Emulator installed?");
            return Vec::new();
        };

        let running: Vec<(String, String)> = self
            .running_serials()
            .into_iter()
            .filter_map(|serial| self.avd_name(&serial).map(|name| (name, serial)))
            .collect();

        let emulators: Vec<EmulatorDescriptor> = names
            .lines()
            .map(str::trim)
            // The emulator binary prints INFO/WARNING lines on some hosts.
            .filter(|line| !line.is_empty() && !line.contains(' ') && !line.starts_with("INFO"))
            .map(|name| {
                let mut emulator = EmulatorDescriptor::from_config(name, self.read_config(name).as_deref());
                if let Some((_, serial)) = running.iter().find(|(avd, _)| avd == name) {
                    emulator.state = EmulatorState::Running {
                        serial: serial.clone(),
                    };
                }
                emulator
            })
            .collect();

        tracing::info!(
            total = emulators.len(),
            running = emulators.iter().filter(|e| e.is_running()).count(),
            "emulators listed"
        );
        emulators
    }

    /// Start `name` unless it is running and wait for it to finish booting
    ///
    /// Returns `false` only when the emulator could not be started. A boot
    /// that does not complete within the timeout still returns `true`.
    pub fn boot(&self, name: &str, options: &BootOptions) -> bool {
        if let Some(serial) = self.serial_of(name) {
            Status::success(&format!("{name} is already running ({serial})"));
            return true;
        }

        let start = Invocation::new(self.tools.emulator.as_str(), ["-avd", name]);
        if let Err(err) = self.runner.spawn_detached(&start) {
            Status::error(&format!("Failed to start emulator {name}: {}", err.message));
            return false;
        }
        tracing::info!(avd = name, "emulator started");

        let timer = Timer::start("emulator boot");
        let spinner = progress::spinner_if(self.progress, &format!("Waiting for {name} to boot..."));
        let started = Instant::now();
        while started.elapsed() < options.timeout {
            if self.boot_completed(name) {
                progress::finish_success(
                    &spinner,
                    &format!("{name} booted in {}", format_duration(started.elapsed())),
                );
                timer.stop();
                std::thread::sleep(options.settle);
                return true;
            }
            std::thread::sleep(options.poll_interval);
        }

        progress::finish_error(&spinner, &format!("{name} boot timed out"));
        timer.stop();
        Status::warning(&format!(
            "{name} did not finish booting within {}; continuing anyway",
            format_duration(options.timeout)
        ));
        true
    }

    fn boot_completed(&self, name: &str) -> bool {
        // Other emulators may already be up; only the serial running `name` counts.
        let Some(serial) = self.serial_of(name) else {
            return false;
        };
        self.query(&self.tools.adb, &["-s", &serial, "shell", "getprop", "sys.boot_completed"])
            .is_some_and(|out| out.trim() == "1")
    }
}

/// Resolve a name or 1-based index, or ask until a valid number is given
///
/// Returns `None` for an unknown name, an out-of-range or non-numeric
/// selector, closed input, or an empty list.
pub fn select<'e>(
    selector: Option<&str>,
    emulators: &'e [EmulatorDescriptor],
    prompt: &mut dyn Prompt,
) -> Option<&'e EmulatorDescriptor> {
    if emulators.is_empty() {
        Status::error("No Android emulators available");
        return None;
    }

    if let Some(selector) = selector {
        if let Some(found) = emulators.iter().find(|e| e.name == selector) {
            return Some(found);
        }
        return match selector.trim().parse::<usize>() {
            Ok(n) if (1..=emulators.len()).contains(&n) => Some(&emulators[n - 1]),
            Ok(_) => {
                Status::warning(&format!("Index '{selector}' is out of range"));
                None
            }
            Err(_) => {
                Status::warning(&format!("'{selector}' is not an emulator name or index"));
                None
            }
        };
    }

    loop {
        let answer = prompt.ask("\nSelect an emulator number (Ctrl+C to quit): ")?;
        match answer.trim().parse::<usize>() {
            Ok(n) if (1..=emulators.len()).contains(&n) => return Some(&emulators[n - 1]),
            Ok(_) => Status::warning("Enter a number from the list"),
            Err(_) => Status::warning("Enter a number"),
        }
    }
}

/// Print the emulator table
pub fn print_emulator_list(emulators: &[EmulatorDescriptor]) {
    if emulators.is_empty() {
        Status::warning("No Android emulators available");
        return;
    }

    Status::header("Available Android emulators");
    println!(
        "{}",
        format!(
            "{} {} {} {} {} {}",
            fit("#", 4),
            fit("Name", 28),
            fit("Android", 9),
            fit("API", 5),
            fit("ABI", 12),
            "State"
        )
        .dimmed()
    );
    for (i, emulator) in emulators.iter().enumerate() {
        let state = match &emulator.state {
            EmulatorState::Running { serial } => format!("running ({serial})").green().to_string(),
            EmulatorState::Stopped => "stopped".dimmed().to_string(),
        };
        println!(
            "{} {} {} {} {} {}",
            fit(&(i + 1).to_string(), 4),
            fit(&emulator.name, 28),
            fit(emulator.android_version.as_deref().unwrap_or("?"), 9),
            fit(&emulator.api_level.map_or_else(|| "?".to_string(), |a| a.to_string()), 5),
            fit(emulator.abi.as_deref().unwrap_or("?"), 12),
            state
        );
    }
}

/// Path of an AVD's config.ini
pub fn config_path(avd_home: &Path, name: &str) -> PathBuf {
    avd_home.join(format!("{name}.avd")).join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use emurun_cli::prompt::ScriptedPrompt;
    use emurun_core::process::FakeRunner;
    use std::fs;

    const DEVICES: &str = "List of devices attached\nemulator-5554\tdevice\nR58M123\tdevice\nemulator-5556\toffline\n\n";

    fn descriptors(names: &[&str]) -> Vec<EmulatorDescriptor> {
        names.iter().map(|n| EmulatorDescriptor::from_config(n, None)).collect()
    }

    fn quick() -> BootOptions {
        BootOptions {
            timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1),
            settle: Duration::ZERO,
        }
    }

    #[test]
    fn test_parse_adb_devices() {
        assert_eq!(parse_adb_devices(DEVICES), vec!["emulator-5554"]);
        assert!(parse_adb_devices("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn test_descriptor_from_config() {
        let config = "abi.type=arm64-v8a\ntarget=android-33\nimage.sysdir.1=system-images/android-33/google_apis/x86_64/\n";
        let emu = EmulatorDescriptor::from_config("Pixel_6", Some(config));
        assert_eq!(emu.api_level, Some(33));
        assert_eq!(emu.android_version.as_deref(), Some("13.0"));
        assert_eq!(emu.abi.as_deref(), Some("arm64-v8a"));
    }

    #[test]
    fn test_descriptor_falls_back_to_sysdir_and_name() {
        let emu = EmulatorDescriptor::from_config(
            "Pixel_API_30",
            Some("image.sysdir.1=system-images/android-30/default/x86_64/\n"),
        );
        assert_eq!(emu.api_level, Some(30));
        assert_eq!(emu.abi.as_deref(), Some("x86_64"));

        let emu = EmulatorDescriptor::from_config("Tablet_API_99_arm64", None);
        assert_eq!(emu.android_version.as_deref(), Some("API 99"));
        assert_eq!(emu.abi.as_deref(), Some("arm64-v8a"));

        let emu = EmulatorDescriptor::from_config("plain", None);
        assert_eq!(emu.api_level, None);
        assert_eq!(emu.abi, None);
    }

    #[test]
    fn test_list_marks_running_avds() {
        let runner = FakeRunner::new();
        runner
            .ok("emulator -list-avds", "Pixel_6\nPixel_API_30\n")
            .ok("adb devices", DEVICES)
            .ok("adb -s emulator-5554 emu avd name", "Pixel_API_30\nOK\n");

        let avd_home = tempfile::tempdir().unwrap();
        let config = config_path(avd_home.path(), "Pixel_6");
        fs::create_dir_all(config.parent().unwrap()).unwrap();
        fs::write(&config, "target=android-34\nabi.type=x86_64\n").unwrap();

        let controller =
            EmulatorController::new(&runner, Tools::default(), Some(avd_home.path().to_path_buf()));
        let list = controller.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].state, EmulatorState::Stopped);
        assert_eq!(list[0].api_level, Some(34));
        assert_eq!(
            list[1].state,
            EmulatorState::Running {
                serial: "emulator-5554".to_string()
            }
        );
    }

    #[test]
    fn test_list_failure_is_empty() {
        let runner = FakeRunner::new();
        runner.missing("emulator");
        let controller = EmulatorController::new(&runner, Tools::default(), None);
        assert!(controller.list().is_empty());
    }

    #[test]
    fn test_boot_running_returns_immediately() {
        let runner = FakeRunner::new();
        runner
            .ok("adb devices", DEVICES)
            .ok("adb -s emulator-5554 emu avd name", "Pixel_6\nOK\n");
        let controller = EmulatorController::new(&runner, Tools::default(), None);
        assert!(controller.boot("Pixel_6", &quick()));
        assert!(runner.detached().is_empty());
    }

    #[test]
    fn test_boot_starts_and_waits_for_boot_completed() {
        let runner = FakeRunner::new();
        runner
            .ok("adb devices", "List of devices attached\n")
            .ok("adb devices", DEVICES)
            .ok("adb -s emulator-5554 emu avd name", "Pixel_6\nOK\n")
            .ok("adb -s emulator-5554 shell getprop sys.boot_completed", "0\n")
            .ok("adb -s emulator-5554 shell getprop sys.boot_completed", "1\n");
        let controller = EmulatorController::new(&runner, Tools::default(), None);
        assert!(controller.boot("Pixel_6", &quick()));
        assert_eq!(runner.detached(), vec!["emulator -avd Pixel_6"]);
        assert_eq!(runner.count("adb -s emulator-5554 shell getprop"), 2);
    }

    #[test]
    fn test_boot_timeout_is_optimistic() {
        let runner = FakeRunner::new();
        runner.ok("adb devices", "List of devices attached\n");
        let controller = EmulatorController::new(&runner, Tools::default(), None);
        let options = BootOptions {
            timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(5),
            settle: Duration::ZERO,
        };
        assert!(controller.boot("Pixel_6", &options));
    }

    #[test]
    fn test_boot_ignores_other_booted_emulators() {
        let runner = FakeRunner::new();
        runner
            .ok("adb devices", "List of devices attached\nemulator-5556\tdevice\n")
            .ok("adb -s emulator-5556 emu avd name", "Nexus_5\nOK\n")
            .ok("adb -s emulator-5556 shell getprop sys.boot_completed", "1\n");
        let controller = EmulatorController::new(&runner, Tools::default(), None);
        let options = BootOptions {
            timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(5),
            settle: Duration::ZERO,
        };
        assert!(controller.boot("Pixel_6", &options));
        assert_eq!(runner.detached(), vec!["emulator -avd Pixel_6"]);
        assert!(!runner.ran("adb -s emulator-5556 shell getprop"));
    }

    #[test]
    fn test_boot_spawn_failure() {
        let runner = FakeRunner::new();
        runner.ok("adb devices", "List of devices attached\n").fail_detached_spawns();
        let controller = EmulatorController::new(&runner, Tools::default(), None);
        assert!(!controller.boot("Pixel_6", &quick()));
    }

    #[test]
    fn test_select_by_index_and_name() {
        let list = descriptors(&["a", "b", "c"]);
        let mut prompt = ScriptedPrompt::default();
        assert_eq!(select(Some("2"), &list, &mut prompt).unwrap().name, "b");
        assert_eq!(select(Some("c"), &list, &mut prompt).unwrap().name, "c");
        assert!(select(Some("5"), &list, &mut prompt).is_none());
        assert!(select(Some("0"), &list, &mut prompt).is_none());
        assert!(select(Some("pixel"), &list, &mut prompt).is_none());
        assert!(prompt.asked.is_empty());
    }

    #[test]
    fn test_select_prompts_until_valid() {
        let list = descriptors(&["a", "b", "c"]);
        let mut prompt = ScriptedPrompt::new(["x", "9", "3"]);
        assert_eq!(select(None, &list, &mut prompt).unwrap().name, "c");
        assert_eq!(prompt.asked.len(), 3);
    }

    #[test]
    fn test_select_closed_input_and_empty_list() {
        let list = descriptors(&["a"]);
        let mut prompt = ScriptedPrompt::new(["nope"]);
        assert!(select(None, &list, &mut prompt).is_none());
        assert!(select(Some("1"), &[], &mut prompt).is_none());
    }

    #[test]
    fn test_android_version_map() {
        assert_eq!(android_version(28), Some("9.0"));
        assert_eq!(android_version(10), None);
    }
}
