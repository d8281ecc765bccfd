//! The end-to-end run behind the `emurun` command
//!
//! Probe the toolchain, pick an emulator (or build APKs), patch the project
//! ahead of the first build, then hand the build to the repair cascade. A
//! run that exhausts every remedy leaves an error log behind.

use crate::cascade::{BuildStep, CascadeOutcome, RepairCascade, Stage};
use crate::driver::{BuildDriver, BuildReport, BuildType};
use crate::emulator::{self, BootOptions, EmulatorController, EmulatorDescriptor};
use crate::errorlog::ErrorLog;
use crate::probe::{self, Probe, ProbeInputs};
use crate::project::ProjectLayout;
use crate::reconcile::reconcile_ndk;
use crate::repair::{cache, manifest, ndk, plugins, ProjectRepairs, RepairContext};
use emurun_cli::output::{format_count, Status};
use emurun_cli::prompt::Prompt;
use emurun_core::config::Config;
use emurun_core::error::{exit_codes, Error, Result};
use emurun_core::process::CommandRunner;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What the user asked for
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Flutter project root
    pub project_dir: PathBuf,
    /// Run `flutter clean` before the first build
    pub clean: bool,
    /// Print the emulators and stop
    pub list_only: bool,
    /// Emulator name or 1-based index; prompt when unset
    pub emulator: Option<String>,
    /// Build APKs instead of running on an emulator
    pub build_apk: bool,
    /// Where APKs are copied, relative to the project
    pub apk_output: Option<PathBuf>,
    /// APK flavour
    pub apk_type: BuildType,
    /// Run the emergency Gradle repair before the first build
    pub force_gradle_cache_fix: bool,
    /// Never regenerate the Android directory
    pub no_regenerate: bool,
    /// Overrides the configured boot timeout
    pub boot_timeout: Option<Duration>,
    /// Echo command output
    pub verbose: bool,
    /// AVD directory holding `<name>.avd/config.ini`
    pub avd_home: Option<PathBuf>,
    /// Gradle user home, for global cache eviction
    pub gradle_home: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("."),
            clean: true,
            list_only: false,
            emulator: None,
            build_apk: false,
            apk_output: Some(PathBuf::from("apk_output")),
            apk_type: BuildType::Release,
            force_gradle_cache_fix: false,
            no_regenerate: false,
            boot_timeout: None,
            verbose: false,
            avd_home: emulator::default_avd_home(),
            gradle_home: dirs::home_dir().map(|home| home.join(".gradle")),
        }
    }
}

/// Run emurun and return the process exit code
pub fn run(
    options: &RunOptions,
    config: &Config,
    runner: &dyn CommandRunner,
    inputs: &ProbeInputs,
    prompt: &mut dyn Prompt,
) -> i32 {
    match execute(options, config, runner, inputs, prompt) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            exit_codes::FAILURE
        }
    }
}

fn report_error(err: &Error) {
    tracing::error!(code = %err.code, category = err.code.category(), "{}", err.message);
    Status::error(&format!("[{}] {}", err.code, err.message));
    if let Some(context) = &err.context {
        Status::detail("context", context);
    }
    if let Some(suggestion) = &err.suggestion {
        Status::info(suggestion);
    }
}

fn execute(
    options: &RunOptions,
    config: &Config,
    runner: &dyn CommandRunner,
    inputs: &ProbeInputs,
    prompt: &mut dyn Prompt,
) -> Result<i32> {
    Status::header("emurun");
    let schema = &config.schema;
    let allow_regenerate = schema.cascade.allow_regenerate && !options.no_regenerate;
    let mut cascade = RepairCascade::new(allow_regenerate);

    cascade.enter(Stage::ProbeEnv);
    let probe = Probe::new(runner, probe::locate_sdk(inputs), inputs.os)
        .with_timeout(Duration::from_secs(schema.commands.probe_timeout_secs));
    let flutter_version = probe.check_flutter()?;
    Status::success(&format!("Flutter: {flutter_version}"));
    let sdk = probe.check_android_sdk()?;
    Status::success(&format!("Android SDK: {}", sdk.root.display()));
    if let Some(ndk) = probe::latest_ndk(&sdk.root) {
        tracing::info!(%ndk, "newest installed ndk");
    }
    if schema.environment.create_sdk_link {
        link_sdk(inputs.home.as_deref(), &sdk.root);
    }
    probe::check_project_directory(&options.project_dir)?;

    let tools = probe.tools();
    let layout = ProjectLayout::from_config(&options.project_dir, config);
    let build_timeout = match schema.commands.build_timeout_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let driver = BuildDriver::new(runner, tools.clone(), &options.project_dir)
        .verbose(options.verbose)
        .with_build_timeout(build_timeout)
        .with_default_serial(schema.emulator.default_serial.clone());
    let context = || {
        RepairContext::new(&layout, config, &driver).with_gradle_home(options.gradle_home.clone())
    };

    let mut failure = FailureContext {
        flutter_version: Some(flutter_version),
        emulator: None,
    };

    let outcome = if options.build_apk {
        cascade.enter(Stage::PreemptivePatch);
        preemptive(&context(), options, config);
        let output_dir = options.apk_output.as_deref();
        let mut step = ApkBuildStep {
            driver: &driver,
            build_type: options.apk_type,
            output_dir,
            clean: options.clean,
            apks: Vec::new(),
        };
        let mut repairs = ProjectRepairs::new(context(), &probe);
        let outcome = cascade.run(&mut step, &mut repairs);
        if outcome.is_success() {
            Status::success(&format!("{} built", format_count(step.apks.len(), "APK", "APKs")));
        }
        outcome
    } else {
        let controller = EmulatorController::new(runner, tools, options.avd_home.clone())
            .with_timeout(Duration::from_secs(schema.commands.probe_timeout_secs))
            .with_progress(!options.verbose);
        let emulators = controller.list();
        emulator::print_emulator_list(&emulators);
        if emulators.is_empty() {
            return Err(Error::no_emulators());
        }
        if options.list_only {
            return Ok(exit_codes::SUCCESS);
        }

        let Some(selected) = emulator::select(options.emulator.as_deref(), &emulators, prompt) else {
            return Err(Error::invalid_selection(options.emulator.as_deref()));
        };
        let selected: EmulatorDescriptor = selected.clone();
        failure.emulator = Some(selected.clone());
        Status::info(&format!("Selected {}", selected.name));

        cascade.enter(Stage::PreemptivePatch);
        preemptive(&context(), options, config);

        let mut boot = BootOptions::from_config(&schema.emulator);
        if let Some(timeout) = options.boot_timeout {
            boot.timeout = timeout;
        }
        if !controller.boot(&selected.name, &boot) {
            return Ok(exit_codes::FAILURE);
        }

        let serial = controller.serial_of(&selected.name);
        if let Some(serial) = &serial {
            tracing::info!(avd = %selected.name, %serial, "target serial");
        }

        let mut step = EmulatorBuildStep {
            driver: &driver,
            emulator: &selected.name,
            serial: serial.as_deref(),
            clean: options.clean,
        };
        let mut repairs = ProjectRepairs::new(context(), &probe);
        cascade.run(&mut step, &mut repairs)
    };

    match outcome {
        CascadeOutcome::Success { attempts } => {
            if !attempts.is_empty() {
                Status::success(&format!(
                    "Build fixed after {}",
                    format_count(attempts.len(), "remedy attempt", "remedy attempts")
                ));
            }
            Ok(exit_codes::SUCCESS)
        }
        CascadeOutcome::Exhausted { attempts, output } => {
            for attempt in &attempts {
                Status::detail("tried", &attempt.to_string());
            }
            let err = Error::cascade_exhausted(attempts.len());
            let mut log = ErrorLog::new(output);
            log.attempts = attempts;
            failure.fill(&mut log);
            match log.write(&config.log_dir(&options.project_dir)) {
                Ok(path) => Err(err.with_context(format!("Error log: {}", path.display()))),
                Err(log_err) => {
                    Status::warning(&format!("Could not write the error log: {log_err}"));
                    Err(err)
                }
            }
        }
    }
}

fn link_sdk(home: Option<&Path>, sdk: &Path) {
    let Some(home) = home else {
        return;
    };
    match probe::create_sdk_link(home, sdk) {
        Ok(Some(link)) => Status::info(&format!("Linked {} to the Android SDK", link.display())),
        Ok(None) => {}
        Err(err) => Status::warning(&format!("Could not link the Android SDK: {}", err.message)),
    }
}

/// Pre-build patches: manifest, plugins, identity, NDK and the optional
/// emergency repair
fn preemptive<R: CommandRunner + ?Sized>(ctx: &RepairContext<'_, R>, options: &RunOptions, config: &Config) {
    let schema = &config.schema;
    Status::subheader("Pre-build checks");

    let (_, report) = manifest::ensure_manifest(ctx);
    report.summarize();
    plugins::apply_strategy(ctx, schema.plugins.strategy).summarize();
    if schema.preemptive.ensure_namespace {
        manifest::ensure_identity(ctx).summarize();
    }

    match reconcile_ndk(ctx.layout) {
        Some(reconciled) => {
            if reconciled.changed() {
                Status::info("ndkVersion aligned with the NDK in local.properties");
            }
        }
        None if schema.preemptive.pin_ndk => ndk::pin_minimum(ctx).summarize(),
        None => {}
    }

    if options.force_gradle_cache_fix {
        cache::emergency_repair(ctx).summarize();
    }
}

/// Details recorded in the error log
struct FailureContext {
    flutter_version: Option<String>,
    emulator: Option<EmulatorDescriptor>,
}

impl FailureContext {
    fn fill(&self, log: &mut ErrorLog) {
        log.flutter_version.clone_from(&self.flutter_version);
        if let Some(emulator) = &self.emulator {
            log.emulator = Some(emulator.name.clone());
            log.android_version.clone_from(&emulator.android_version);
        }
    }
}

/// `flutter run` on the booted emulator
struct EmulatorBuildStep<'d, 'a, R: CommandRunner + ?Sized> {
    driver: &'d BuildDriver<'a, R>,
    emulator: &'d str,
    serial: Option<&'d str>,
    clean: bool,
}

impl<R: CommandRunner + ?Sized> BuildStep for EmulatorBuildStep<'_, '_, R> {
    fn build(&mut self, attempt: usize) -> BuildReport {
        // Retries always start clean since repairs change the Gradle setup.
        let prepared = self.driver.prepare(self.clean || attempt > 0);
        if !prepared.success {
            return prepared;
        }
        self.driver.run_on_emulator(self.emulator, self.serial)
    }
}

/// `flutter build apk`
struct ApkBuildStep<'d, 'a, R: CommandRunner + ?Sized> {
    driver: &'d BuildDriver<'a, R>,
    build_type: BuildType,
    output_dir: Option<&'d Path>,
    clean: bool,
    apks: Vec<PathBuf>,
}

impl<R: CommandRunner + ?Sized> BuildStep for ApkBuildStep<'_, '_, R> {
    fn build(&mut self, attempt: usize) -> BuildReport {
        let prepared = self.driver.prepare(self.clean || attempt > 0);
        if !prepared.success {
            return prepared;
        }
        let build = self.driver.build_apk(self.build_type, self.output_dir);
        self.apks = build.apks;
        build.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::HostOs;
    use emurun_core::error::ErrorCode;
    use emurun_cli::prompt::ScriptedPrompt;
    use emurun_core::process::FakeRunner;
    use std::fs;
    use tempfile::TempDir;

    const APP_SCRIPT: &str = "android {\n    namespace \"dev.acme.shop\"\n    compileSdkVersion 34\n    ndkVersion \"27.0.12077973\"\n}\n";
    const NDK_FAILURE: &str = "FAILURE: Build failed with an exception.\n\
        - vibration requires Android NDK 28.0.13004108\n";

    struct Fixture {
        project: TempDir,
        sdk: TempDir,
        runner: FakeRunner,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let project = tempfile::tempdir().unwrap();
            let root = project.path();
            fs::create_dir_all(root.join("lib")).unwrap();
            fs::write(root.join("lib/main.dart"), "void main() {}\n").unwrap();
            fs::write(root.join("pubspec.yaml"), "name: demo\n").unwrap();
            fs::create_dir_all(root.join("android/app/src/main")).unwrap();
            fs::write(root.join("android/app/build.gradle"), APP_SCRIPT).unwrap();
            fs::write(
                root.join("android/app/src/main/AndroidManifest.xml"),
                "<manifest><application><activity><intent-filter>\
                 <category android:name=\"android.intent.category.LAUNCHER\"/>\
                 </intent-filter></activity></application></manifest>\n",
            )
            .unwrap();

            let sdk = tempfile::tempdir().unwrap();
            for dir in ["platform-tools", "tools", "emulator"] {
                fs::create_dir_all(sdk.path().join(dir)).unwrap();
            }

            let runner = FakeRunner::new();
            runner.with_tool("flutter").with_tool("adb").with_tool("emulator");
            runner.ok("flutter --version", "Flutter 3.19.0 • channel stable\n");

            let mut config = Config::default();
            config.schema.logging.log_dir = project.path().join("logs").display().to_string();
            Self {
                project,
                sdk,
                runner,
                config,
            }
        }

        fn with_running_emulator(self) -> Self {
            self.runner.ok("/fake/bin/emulator -list-avds", "Pixel_7_API_34\n");
            self.runner
                .ok("/fake/bin/adb devices", "List of devices attached\nemulator-5554\tdevice\n");
            self.runner.ok("/fake/bin/adb -s emulator-5554 emu avd name", "Pixel_7_API_34\nOK\n");
            self
        }

        fn options(&self) -> RunOptions {
            RunOptions {
                project_dir: self.project.path().to_path_buf(),
                emulator: Some("1".to_string()),
                avd_home: None,
                gradle_home: None,
                no_regenerate: true,
                ..RunOptions::default()
            }
        }

        fn inputs(&self) -> ProbeInputs {
            let mut inputs = ProbeInputs::empty(HostOs::Linux);
            inputs.android_home = Some(self.sdk.path().to_path_buf());
            inputs
        }

        fn run(&self, options: &RunOptions) -> i32 {
            let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
            run(options, &self.config, &self.runner, &self.inputs(), &mut prompt)
        }

        fn execute(&self, options: &RunOptions) -> Result<i32> {
            let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
            execute(options, &self.config, &self.runner, &self.inputs(), &mut prompt)
        }

        fn read(&self, relative: &str) -> String {
            fs::read_to_string(self.project.path().join(relative)).unwrap()
        }

        fn logs(&self) -> Vec<PathBuf> {
            fs::read_dir(self.project.path().join("logs"))
                .map(|entries| entries.flatten().map(|e| e.path()).collect())
                .unwrap_or_default()
        }
    }

    #[test]
    fn test_missing_flutter_fails() {
        let fixture = Fixture::new();
        let runner = FakeRunner::new();
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
        let code = run(&fixture.options(), &fixture.config, &runner, &fixture.inputs(), &mut prompt);
        assert_eq!(code, exit_codes::FAILURE);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_not_a_flutter_project_fails() {
        let fixture = Fixture::new();
        fs::remove_file(fixture.project.path().join("lib/main.dart")).unwrap();
        assert_eq!(fixture.run(&fixture.options()), exit_codes::FAILURE);
        assert!(!fixture.runner.ran("flutter clean"));
    }

    #[test]
    fn test_no_emulators_fails_without_touching_the_project() {
        let fixture = Fixture::new();
        fixture.runner.ok("/fake/bin/emulator -list-avds", "");
        let options = RunOptions {
            list_only: true,
            ..fixture.options()
        };
        assert_eq!(fixture.run(&options), exit_codes::FAILURE);
        let err = fixture.execute(&options).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoEmulators);
        assert_eq!(fixture.read("android/app/build.gradle"), APP_SCRIPT);
        assert!(!fixture.runner.ran("flutter pub"));
        assert!(fixture.logs().is_empty());
    }

    #[test]
    fn test_list_only() {
        let fixture = Fixture::new().with_running_emulator();
        let options = RunOptions {
            list_only: true,
            ..fixture.options()
        };
        assert_eq!(fixture.run(&options), exit_codes::SUCCESS);
        assert!(!fixture.runner.ran("flutter run"));
    }

    #[test]
    fn test_unknown_emulator_fails() {
        let fixture = Fixture::new().with_running_emulator();
        let options = RunOptions {
            emulator: Some("Nexus".to_string()),
            ..fixture.options()
        };
        let err = fixture.execute(&options).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSelection);
        assert!(err.message.contains("Nexus"));
        assert_eq!(fixture.run(&options), exit_codes::FAILURE);
        assert!(!fixture.runner.ran("flutter run"));
    }

    #[test]
    fn test_runs_on_running_emulator() {
        let fixture = Fixture::new().with_running_emulator();
        assert_eq!(fixture.run(&fixture.options()), exit_codes::SUCCESS);
        assert!(fixture.runner.ran("flutter clean"));
        assert!(fixture.runner.ran("flutter run -d emulator-5554"));
        assert!(fixture.runner.detached().is_empty());
    }

    #[test]
    fn test_runs_on_the_selected_emulator_when_several_are_up() {
        let fixture = Fixture::new();
        fixture.runner.ok("/fake/bin/emulator -list-avds", "Pixel_7_API_34\nTablet_API_33\n");
        fixture.runner.ok(
            "/fake/bin/adb devices",
            "List of devices attached\nemulator-5554\tdevice\nemulator-5556\tdevice\n",
        );
        fixture.runner.ok("/fake/bin/adb -s emulator-5554 emu avd name", "Pixel_7_API_34\nOK\n");
        fixture.runner.ok("/fake/bin/adb -s emulator-5556 emu avd name", "Tablet_API_33\nOK\n");
        let options = RunOptions {
            emulator: Some("Tablet_API_33".to_string()),
            ..fixture.options()
        };

        assert_eq!(fixture.run(&options), exit_codes::SUCCESS);
        assert!(fixture.runner.ran("flutter run -d emulator-5556"));
        assert!(!fixture.runner.ran("flutter run -d emulator-5554"));
    }

    #[test]
    fn test_ndk_failure_is_repaired_and_retried() {
        let fixture = Fixture::new().with_running_emulator();
        fixture.runner.fail("flutter run", NDK_FAILURE);
        fixture.runner.ok("flutter run", "Syncing files to device\n");

        assert_eq!(fixture.run(&fixture.options()), exit_codes::SUCCESS);
        assert_eq!(fixture.runner.count("flutter run -d emulator-5554"), 2);
        assert!(fixture.read("android/app/build.gradle").contains("ndkVersion \"28.0.13004108\""));
        assert!(fixture.logs().is_empty());
    }

    #[test]
    fn test_exhausted_cascade_writes_error_log() {
        let fixture = Fixture::new().with_running_emulator();
        fixture.runner.fail("flutter run", "FAILURE: Build failed with an exception.\n");

        let err = fixture.execute(&fixture.options()).unwrap_err();
        assert_eq!(err.code, ErrorCode::CascadeExhausted);
        let logs = fixture.logs();
        assert_eq!(logs.len(), 1);
        let text = fs::read_to_string(&logs[0]).unwrap();
        assert!(text.contains("Emulator: Pixel_7_API_34"));
        assert!(text.contains("Flutter: Flutter 3.19.0"));
        assert!(text.contains("FAILURE: Build failed with an exception."));
        assert!(err.context.unwrap().contains(&logs[0].display().to_string()));
    }

    #[test]
    fn test_apk_mode_skips_emulators() {
        let fixture = Fixture::new();
        let built = fixture.project.path().join("build/app/outputs/flutter-apk");
        fs::create_dir_all(&built).unwrap();
        fs::write(built.join("app-arm64-v8a-release.apk"), "apk").unwrap();
        let options = RunOptions {
            build_apk: true,
            ..fixture.options()
        };

        assert_eq!(fixture.run(&options), exit_codes::SUCCESS);
        assert!(fixture.runner.ran("flutter build apk --release --split-per-abi"));
        assert!(!fixture.runner.ran("/fake/bin/emulator"));
        assert!(fixture
            .project
            .path()
            .join("apk_output/app-arm64-v8a-release.apk")
            .exists());
    }
}
