/*!
 * Program configuration
 *
 * An INI file under the program home directory, created with defaults on
 * first run. The engine receives a read-only snapshot; nothing here is a
 * process-wide singleton.
 */

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::warn;

use crate::error::{CopyError, MirrorcastError, Result};

/// Log severities accepted by the `loglevel` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "critical" => Some(LogLevel::Critical),
            "error" => Some(LogLevel::Error),
            "warning" => Some(LogLevel::Warning),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    /// tracing has no critical level; critical collapses into error.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Critical | LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `[DEFAULT] profilepath`
    pub profile_path: PathBuf,
    /// `[DEFAULT] loglevel`
    pub log_level: LogLevel,
    /// `[DEFAULT] ignorederrors` — variant names suppressed from observers
    pub ignored_errors: HashSet<String>,
    /// `[ui] font` — forwarded to the UI unchanged
    pub font: String,
    /// `[ui] font_size` — forwarded to the UI unchanged
    pub font_size: u32,
    /// `[BackupBehavior] threadcount`
    pub thread_count: usize,
    /// `[BackupBehavior] sourcemapname`
    pub sourcemap_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            profile_path: program_home().join("backup_profiles.json"),
            log_level: LogLevel::Warning,
            ignored_errors: HashSet::new(),
            font: "monospaced".into(),
            font_size: 12,
            thread_count: 3,
            sourcemap_name: "mapfile".into(),
        }
    }
}

/// Directory holding the configuration, the default profile store, and
/// logs.
pub fn program_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mirrorcast")
}

/// Default configuration file location.
pub fn config_file() -> PathBuf {
    program_home().join("mirrorcast.conf")
}

impl Config {
    /// Loads the configuration, writing a default file first when none
    /// exists yet.
    pub fn load_or_create() -> Result<Config> {
        let path = config_file();
        if path.is_file() {
            Config::load(&path)
        } else {
            let config = Config::default();
            warn!(
                "configuration file not found, saving defaults to {}",
                path.display()
            );
            config.save(&path)?;
            Ok(config)
        }
    }

    pub fn load(path: &Path) -> Result<Config> {
        let ini = Ini::load_from_file(path).map_err(|err| {
            MirrorcastError::Config(format!(
                "failed to read {}: {err}",
                path.display()
            ))
        })?;

        let mut config = Config::default();

        if let Some(section) = ini.section(Some("DEFAULT")) {
            if let Some(value) = section.get("profilepath") {
                config.profile_path = PathBuf::from(value);
            }
            if let Some(value) = section.get("loglevel") {
                match LogLevel::parse(value) {
                    Some(level) => config.log_level = level,
                    None => {
                        return Err(MirrorcastError::Config(format!(
                            "unknown loglevel \"{value}\""
                        )))
                    }
                }
            }
            if let Some(value) = section.get("ignorederrors") {
                config.ignored_errors =
                    value.split_whitespace().map(str::to_string).collect();
                for name in &config.ignored_errors {
                    if !CopyError::VARIANT_NAMES.contains(&name.as_str()) {
                        warn!("ignorederrors lists unknown error type \"{name}\"");
                    }
                }
            }
        }

        if let Some(section) = ini.section(Some("ui")) {
            if let Some(value) = section.get("font") {
                config.font = value.to_string();
            }
            if let Some(value) = section.get("font_size") {
                config.font_size = value.parse().map_err(|_| {
                    MirrorcastError::Config(format!("invalid font_size \"{value}\""))
                })?;
            }
        }

        if let Some(section) = ini.section(Some("BackupBehavior")) {
            if let Some(value) = section.get("threadcount") {
                let count: usize = value.parse().map_err(|_| {
                    MirrorcastError::Config(format!("invalid threadcount \"{value}\""))
                })?;
                if count < 1 {
                    return Err(MirrorcastError::Config(
                        "threadcount must be at least 1".into(),
                    ));
                }
                config.thread_count = count;
            }
            if let Some(value) = section.get("sourcemapname") {
                config.sourcemap_name = value.to_string();
            }
        }

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ignored: Vec<&str> =
            self.ignored_errors.iter().map(String::as_str).collect();
        ignored.sort_unstable();

        let mut ini = Ini::new();
        ini.with_section(Some("DEFAULT"))
            .set("profilepath", self.profile_path.display().to_string())
            .set("loglevel", self.log_level.as_str())
            .set("ignorederrors", ignored.join(" "));
        ini.with_section(Some("ui"))
            .set("font", self.font.as_str())
            .set("font_size", self.font_size.to_string());
        ini.with_section(Some("BackupBehavior"))
            .set("threadcount", self.thread_count.to_string())
            .set("sourcemapname", self.sourcemap_name.as_str());

        ini.write_to_file(path).map_err(|err| {
            MirrorcastError::Config(format!(
                "failed to write {}: {err}",
                path.display()
            ))
        })
    }
}
