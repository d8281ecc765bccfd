//! Toolchain discovery
//!
//! Finds the Android SDK, Flutter, adb, the emulator binary and Java. Nothing
//! here mutates the process environment: the SDK variables and PATH
//! additions are collected into a [`ToolchainEnv`] for the command runner.

use emurun_cli::output::Status;
use emurun_core::error::{Error, ErrorCode, Result};
use emurun_core::process::{run_lenient, CommandRunner, Invocation, ToolchainEnv};
use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

static JAVA_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"version "(?P<major>\d+)(?:\.(?P<minor>\d+))?[^"]*""#).expect("Invalid java version regex")
});

/// Major Java version assumed when `java -version` says nothing usable
pub const DEFAULT_JAVA_MAJOR: u32 = 11;

/// SDK subdirectories added to PATH, in lookup order
const SDK_PATH_DIRS: &[&str] = &[
    "platform-tools",
    "emulator",
    "cmdline-tools/latest/bin",
    "tools",
    "tools/bin",
];

/// Host operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    /// macOS
    MacOs,
    /// Windows
    Windows,
    /// Linux and other unixes
    Linux,
}

impl HostOs {
    /// The OS this binary runs on
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            _ => Self::Linux,
        }
    }

    fn exe(self, name: &str) -> String {
        match self {
            Self::Windows => format!("{name}.exe"),
            _ => name.to_string(),
        }
    }
}

/// Everything the probe reads from the host, captured once
#[derive(Debug, Clone)]
pub struct ProbeInputs {
    /// `ANDROID_HOME`
    pub android_home: Option<PathBuf>,
    /// `ANDROID_SDK_ROOT`
    pub android_sdk_root: Option<PathBuf>,
    /// Home directory
    pub home: Option<PathBuf>,
    /// `LOCALAPPDATA` (Windows)
    pub local_app_data: Option<PathBuf>,
    /// `APPDATA` (Windows)
    pub app_data: Option<PathBuf>,
    /// `PATH`
    pub path: Option<OsString>,
    /// Host OS
    pub os: HostOs,
}

impl ProbeInputs {
    /// Read the current process environment
    pub fn from_process() -> Self {
        let var = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        Self {
            android_home: var("ANDROID_HOME"),
            android_sdk_root: var("ANDROID_SDK_ROOT"),
            home: dirs::home_dir(),
            local_app_data: var("LOCALAPPDATA"),
            app_data: var("APPDATA"),
            path: std::env::var_os("PATH"),
            os: HostOs::current(),
        }
    }

    /// Inputs with nothing set, for tests and explicit construction
    pub fn empty(os: HostOs) -> Self {
        Self {
            android_home: None,
            android_sdk_root: None,
            home: None,
            local_app_data: None,
            app_data: None,
            path: None,
            os,
        }
    }
}

/// Well-known SDK locations for the host OS
pub fn default_sdk_paths(inputs: &ProbeInputs) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    match inputs.os {
        HostOs::MacOs => {
            if let Some(home) = &inputs.home {
                paths.push(home.join("Library/Android/sdk"));
            }
            paths.push(PathBuf::from("/Applications/Android Studio.app/Contents/sdk"));
        }
        HostOs::Windows => {
            if let Some(local) = &inputs.local_app_data {
                paths.push(local.join("Android").join("Sdk"));
            }
            if let Some(roaming) = &inputs.app_data {
                paths.push(roaming.join("Local").join("Android").join("Sdk"));
            }
        }
        HostOs::Linux => {
            if let Some(home) = &inputs.home {
                paths.push(home.join("Android/Sdk"));
                paths.push(home.join("Android/sdk"));
            }
        }
    }
    paths
}

/// SDK root: `ANDROID_HOME`, then `ANDROID_SDK_ROOT`, then the defaults
///
/// Only existing directories are returned.
pub fn locate_sdk(inputs: &ProbeInputs) -> Option<PathBuf> {
    let from_env = [&inputs.android_home, &inputs.android_sdk_root]
        .into_iter()
        .flatten()
        .cloned();
    let found = from_env
        .chain(default_sdk_paths(inputs))
        .find(|candidate| candidate.is_dir());
    match &found {
        Some(sdk) => tracing::debug!(sdk = %sdk.display(), "android sdk located"),
        None => tracing::debug!("no android sdk found"),
    }
    found
}

/// Environment for child processes with the SDK variables and tool dirs
///
/// Only SDK subdirectories that exist are added. Building twice from the
/// same inputs gives the same PATH.
pub fn toolchain_env(sdk: &Path, inputs: &ProbeInputs) -> ToolchainEnv {
    let mut env = ToolchainEnv::new(inputs.path.clone());
    let sdk_str = sdk.to_string_lossy().into_owned();
    env.set_var("ANDROID_HOME", sdk_str.clone());
    env.set_var("ANDROID_SDK_ROOT", sdk_str);

    // Prepending in reverse leaves the first entry of SDK_PATH_DIRS in front.
    for dir in SDK_PATH_DIRS.iter().rev() {
        let path = sdk.join(dir);
        if path.is_dir() && env.prepend_path(&path) {
            tracing::debug!(dir = %path.display(), "added to PATH");
        }
    }
    env
}

/// Create `~/android-sdk` pointing at the SDK
///
/// Returns the link path when one was created. Existing entries are left
/// alone; on non-unix hosts this does nothing.
pub fn create_sdk_link(home: &Path, sdk: &Path) -> Result<Option<PathBuf>> {
    let link = home.join("android-sdk");
    if link.exists() || link.symlink_metadata().is_ok() {
        return Ok(None);
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(sdk, &link)?;
        tracing::info!(link = %link.display(), sdk = %sdk.display(), "created sdk link");
        Ok(Some(link))
    }
    #[cfg(not(unix))]
    {
        let _ = sdk;
        Ok(None)
    }
}

/// `lib/main.dart` must exist under the project root
pub fn check_project_directory(root: &Path) -> Result<()> {
    if root.join("lib").join("main.dart").is_file() {
        Ok(())
    } else {
        Err(Error::not_a_flutter_project(root))
    }
}

/// NDK versions installed under `<sdk>/ndk`, oldest first
pub fn installed_ndk_versions(sdk: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(sdk.join("ndk")) else {
        return Vec::new();
    };
    let mut versions: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    versions.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        (Ok(_), Err(_)) => std::cmp::Ordering::Greater,
        (Err(_), Ok(_)) => std::cmp::Ordering::Less,
        (Err(_), Err(_)) => a.cmp(b),
    });
    versions
}

/// Newest installed NDK
pub fn latest_ndk(sdk: &Path) -> Option<String> {
    installed_ndk_versions(sdk).pop()
}

/// What `java -version` reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaInfo {
    /// Resolved `java` binary
    pub path: Option<PathBuf>,
    /// Quoted version string, e.g. `17.0.2`
    pub version: Option<String>,
    /// Major version (`1.8` → 8), [`DEFAULT_JAVA_MAJOR`] when unknown
    pub major: u32,
    /// Raw output
    pub raw: String,
}

/// Extract the quoted version and its major number from `java -version`
pub fn parse_java_version(text: &str) -> (Option<String>, u32) {
    let Some(caps) = JAVA_VERSION.captures(text) else {
        return (None, DEFAULT_JAVA_MAJOR);
    };
    let full = caps
        .get(0)
        .map(|m| m.as_str().trim_start_matches("version ").trim_matches('"').to_string());
    let major: u32 = caps["major"].parse().unwrap_or(DEFAULT_JAVA_MAJOR);
    let major = if major == 1 {
        caps.name("minor")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(DEFAULT_JAVA_MAJOR)
    } else {
        major
    };
    (full, major)
}

/// Summary of the SDK check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkReport {
    /// SDK root
    pub root: PathBuf,
    /// Optional components that are missing
    pub missing: Vec<&'static str>,
    /// Whether adb resolves
    pub adb: bool,
}

/// Program names or paths used to reach each tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    /// `flutter`
    pub flutter: String,
    /// `adb`
    pub adb: String,
    /// `emulator`
    pub emulator: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            flutter: "flutter".to_string(),
            adb: "adb".to_string(),
            emulator: "emulator".to_string(),
        }
    }
}

/// Tool checks run through a [`CommandRunner`]
pub struct Probe<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    sdk: Option<PathBuf>,
    os: HostOs,
    timeout: Duration,
}

impl<'a, R: CommandRunner + ?Sized> Probe<'a, R> {
    /// Probe tools for an (optional) SDK root
    pub fn new(runner: &'a R, sdk: Option<PathBuf>, os: HostOs) -> Self {
        Self {
            runner,
            sdk,
            os,
            timeout: Duration::from_secs(30),
        }
    }

    /// Limit for each probe command
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// SDK root this probe looks in
    pub fn sdk(&self) -> Option<&Path> {
        self.sdk.as_deref()
    }

    /// Flutter must be on PATH; returns the first line of `flutter --version`
    pub fn check_flutter(&self) -> Result<String> {
        if self.runner.locate("flutter").is_none() {
            return Err(Error::new(ErrorCode::FlutterNotFound, "flutter not found on PATH")
                .with_suggestion("Install Flutter and add its bin directory to PATH"));
        }
        let result = run_lenient(
            self.runner,
            &Invocation::new("flutter", ["--version"]).with_timeout(self.timeout),
        );
        let version = result
            .output()
            .filter(|_| result.success)
            .and_then(|out| out.lines().next().map(|l| l.trim().to_string()))
            .filter(|line| !line.is_empty())
            .unwrap_or_else(|| "unknown".to_string());
        tracing::info!(%version, "flutter found");
        Ok(version)
    }

    /// The SDK must exist and contain the emulator; other parts only warn
    pub fn check_android_sdk(&self) -> Result<SdkReport> {
        let root = self.sdk.clone().ok_or_else(Error::sdk_not_found)?;
        if !root.is_dir() {
            return Err(Error::sdk_not_found().with_context(root.display().to_string()));
        }

        let mut missing = Vec::new();
        for component in ["platform-tools", "tools"] {
            if !root.join(component).is_dir() {
                Status::warning(&format!("Android SDK {component} not found in {}", root.display()));
                missing.push(component);
            }
        }
        if self.resolve_tool("emulator").is_none() {
            return Err(Error::new(
                ErrorCode::EmulatorNotFound,
                format!("emulator not found in {}", root.display()),
            )
            .with_suggestion("Install the Android Emulator from the SDK Manager"));
        }

        let adb = self.resolve_tool("adb").is_some();
        if !adb {
            Status::warning("adb not found; device detection may fail");
        }
        Ok(SdkReport { root, missing, adb })
    }

    /// Find a tool on PATH, else directly inside the SDK
    pub fn resolve_tool(&self, name: &str) -> Option<PathBuf> {
        if let Some(path) = self.runner.locate(name) {
            return Some(path);
        }
        let sdk = self.sdk.as_ref()?;
        let dir = match name {
            "adb" => "platform-tools",
            "emulator" => "emulator",
            "sdkmanager" | "avdmanager" => "cmdline-tools/latest/bin",
            _ => return None,
        };
        [name.to_string(), self.os.exe(name)]
            .into_iter()
            .map(|file| sdk.join(dir).join(file))
            .find(|candidate| candidate.is_file())
    }

    /// Program paths for the tools, falling back to bare names
    pub fn tools(&self) -> Tools {
        let resolve = |name: &str| {
            self.resolve_tool(name)
                .map_or_else(|| name.to_string(), |p| p.to_string_lossy().into_owned())
        };
        Tools {
            flutter: "flutter".to_string(),
            adb: resolve("adb"),
            emulator: resolve("emulator"),
        }
    }

    /// Run `java -version` (it prints to stderr) and parse the major version
    pub fn java_version_info(&self) -> JavaInfo {
        let path = self.runner.locate("java");
        let result = run_lenient(
            self.runner,
            &Invocation::new("java", ["-version"]).with_timeout(self.timeout),
        );
        let raw = result.combined_output();
        let (version, major) = parse_java_version(&raw);
        tracing::debug!(?path, ?version, major, "java detected");
        JavaInfo {
            path,
            version,
            major,
            raw,
        }
    }
}
