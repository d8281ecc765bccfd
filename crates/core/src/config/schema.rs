//! Configuration schema definitions
//!
//! Every field has a serde default so an empty (or absent) file yields a
//! fully populated configuration.

use serde::{Deserialize, Serialize};

/// Root configuration schema
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigSchema {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub versions: VersionsConfig,

    #[serde(default)]
    pub emulator: EmulatorConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub cascade: CascadeConfig,

    #[serde(default)]
    pub preemptive: PreemptiveConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub environment: EnvironmentConfig,
}

/// Project layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Android platform directory, relative to the project root
    #[serde(default = "default_android_dir")]
    pub android_dir: String,

    /// Package used when none can be read from the manifest or build script
    #[serde(default = "default_fallback_package")]
    pub fallback_package: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            android_dir: default_android_dir(),
            fallback_package: default_fallback_package(),
        }
    }
}

fn default_android_dir() -> String {
    "android".to_string()
}

fn default_fallback_package() -> String {
    "com.example.app".to_string()
}

/// Versions pinned by patches and repairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsConfig {
    /// NDK pinned when the build output names none
    #[serde(default = "default_ndk")]
    pub ndk: String,

    /// Kotlin version written into the root build script
    #[serde(default = "default_kotlin")]
    pub kotlin: String,

    /// Kotlin version used when the JDK is 17 or newer
    #[serde(default = "default_kotlin_java17")]
    pub kotlin_java17: String,

    /// Android Gradle Plugin version
    #[serde(default = "default_agp")]
    pub agp: String,

    /// Gradle wrapper version for the namespace/Kotlin fixes
    #[serde(default = "default_gradle_wrapper")]
    pub gradle_wrapper: String,

    /// Gradle wrapper version used by the emergency cache repair
    #[serde(default = "default_emergency_gradle_wrapper")]
    pub emergency_gradle_wrapper: String,

    /// AGP version used by the emergency cache repair
    #[serde(default = "default_emergency_agp")]
    pub emergency_agp: String,

    /// Kotlin version used by the emergency cache repair
    #[serde(default = "default_emergency_kotlin")]
    pub emergency_kotlin: String,

    /// NDK pinned by the emergency cache repair
    #[serde(default = "default_emergency_ndk")]
    pub emergency_ndk: String,

    /// compileSdk written by template regeneration and the emergency repair
    #[serde(default = "default_compile_sdk")]
    pub compile_sdk: u32,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            ndk: default_ndk(),
            kotlin: default_kotlin(),
            kotlin_java17: default_kotlin_java17(),
            agp: default_agp(),
            gradle_wrapper: default_gradle_wrapper(),
            emergency_gradle_wrapper: default_emergency_gradle_wrapper(),
            emergency_agp: default_emergency_agp(),
            emergency_kotlin: default_emergency_kotlin(),
            emergency_ndk: default_emergency_ndk(),
            compile_sdk: default_compile_sdk(),
        }
    }
}

fn default_ndk() -> String {
    "27.0.12077973".to_string()
}

fn default_kotlin() -> String {
    "1.7.10".to_string()
}

fn default_kotlin_java17() -> String {
    "1.8.10".to_string()
}

fn default_agp() -> String {
    "7.3.0".to_string()
}

fn default_gradle_wrapper() -> String {
    "7.5".to_string()
}

fn default_emergency_gradle_wrapper() -> String {
    "7.2".to_string()
}

fn default_emergency_agp() -> String {
    "4.1.3".to_string()
}

fn default_emergency_kotlin() -> String {
    "1.6.10".to_string()
}

fn default_emergency_ndk() -> String {
    "21.4.7075529".to_string()
}

fn default_compile_sdk() -> u32 {
    33
}

/// Emulator boot behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Give up waiting for boot completion after this many seconds
    #[serde(default = "default_boot_timeout_secs")]
    pub boot_timeout_secs: u64,

    /// Delay between boot polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after boot completes before handing the device to flutter
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,

    /// Serial tried when `adb devices` shows no emulator
    #[serde(default = "default_serial")]
    pub default_serial: String,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            boot_timeout_secs: default_boot_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_secs: default_settle_secs(),
            default_serial: default_serial(),
        }
    }
}

fn default_boot_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_settle_secs() -> u64 {
    2
}

fn default_serial() -> String {
    "emulator-5554".to_string()
}

/// External command limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Timeout for short probe commands (versions, device lists)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// Timeout for builds; 0 disables it
    #[serde(default)]
    pub build_timeout_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
            build_timeout_secs: 0,
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    30
}

/// Repair cascade switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Allow the last-resort regeneration of the Android platform directory
    #[serde(default = "default_true")]
    pub allow_regenerate: bool,

    /// Let repairs evict `~/.gradle/caches`
    #[serde(default = "default_true")]
    pub evict_global_gradle_cache: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            allow_regenerate: true,
            evict_global_gradle_cache: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Patches applied before the first build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreemptiveConfig {
    /// Pin the configured NDK in the app script when `ndk.dir` is not set
    #[serde(default = "default_true")]
    pub pin_ndk: bool,

    /// Insert `namespace` into the app script when it is missing
    #[serde(default = "default_true")]
    pub ensure_namespace: bool,
}

impl Default for PreemptiveConfig {
    fn default() -> Self {
        Self {
            pin_ndk: true,
            ensure_namespace: true,
        }
    }
}

/// What to do about known problematic plugins before building
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PluginStrategy {
    /// Only report them
    #[default]
    Report,
    /// Pin them to a known-good version
    Pin,
    /// Run `flutter pub upgrade` (then `--major-versions`)
    Upgrade,
    /// Do nothing
    Ignore,
}

/// A plugin known to break Android builds at some versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPlugin {
    /// Package name in pubspec.yaml
    pub name: String,
    /// Version known to build
    pub recommended: String,
    /// Newest version known to build
    pub latest: String,
    /// Short description of the failure it causes
    #[serde(default)]
    pub issue: String,
}

/// Plugin handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default)]
    pub strategy: PluginStrategy,

    #[serde(default = "default_known_plugins")]
    pub known: Vec<KnownPlugin>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            strategy: PluginStrategy::default(),
            known: default_known_plugins(),
        }
    }
}

fn default_known_plugins() -> Vec<KnownPlugin> {
    vec![KnownPlugin {
        name: "vibration".to_string(),
        recommended: "1.9.2".to_string(),
        latest: "3.1.3".to_string(),
        issue: "Older versions fail with newer Android Gradle Plugin versions".to_string(),
    }]
}

/// Logging output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG/EMURUN_LOG are unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the error log (and the file log, when enabled)
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Also write tracing output to `<log_dir>/emurun.log`
    #[serde(default)]
    pub file_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: default_log_dir(),
            file_log: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_dir() -> String {
    ".".to_string()
}

/// Host environment conveniences
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnvironmentConfig {
    /// Create `~/android-sdk` pointing at the detected SDK
    #[serde(default)]
    pub create_sdk_link: bool,
}
