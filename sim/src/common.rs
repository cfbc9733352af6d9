//! Shared helpers for the simulation binary: log settings, logger setup and path checks.

use anyhow::{Context, Result, anyhow, bail};
use landmark_pf::sim::LoggingConfig;
use log::LevelFilter;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the effective log level was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelSource {
    CommandLine,
    ConfigFile,
    Default,
}
impl fmt::Display for LevelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelSource::CommandLine => write!(f, "command line"),
            LevelSource::ConfigFile => write!(f, "config file"),
            LevelSource::Default => write!(f, "default"),
        }
    }
}

/// Log level and destination after merging the command line with the config file.
#[derive(Clone, Debug, PartialEq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub source: LevelSource,
    /// Log to this file instead of stderr.
    pub file: Option<PathBuf>,
}
impl LogSettings {
    /// Command line flags win over the config file's `logging` section, which wins over `info`.
    ///
    /// # Errors
    /// Returns an error for a level string that is not one of off, error, warn, info, debug, trace.
    pub fn resolve(
        cli_level: Option<&str>,
        cli_file: Option<&PathBuf>,
        config: Option<&LoggingConfig>,
    ) -> Result<Self> {
        let (level, source) = match (cli_level, config) {
            (Some(level), _) => (level, LevelSource::CommandLine),
            (None, Some(cfg)) => (cfg.level.as_str(), LevelSource::ConfigFile),
            (None, None) => ("info", LevelSource::Default),
        };
        let level = level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow!("invalid log level '{}' from {}", level, source))?;
        let file = cli_file
            .cloned()
            .or_else(|| config.and_then(|cfg| cfg.file.clone()));
        Ok(LogSettings {
            level,
            source,
            file,
        })
    }
}

/// Install env_logger with a timestamped format tagged with `run_label`.
///
/// Library targets are shown relative to the crate, e.g. `particle` for `landmark_pf::particle`.
///
/// # Errors
/// Returns an error if the log file cannot be opened or a logger is already installed.
pub fn init_logger(settings: &LogSettings, run_label: &str) -> Result<()> {
    use std::io::Write;

    let label = run_label.to_string();
    let mut builder = env_logger::Builder::new();
    builder.filter_level(settings.level);
    builder.format(move |buf, record| {
        let target = record.target();
        writeln!(
            buf,
            "{} [{}] {} {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            label,
            target.strip_prefix("landmark_pf::").unwrap_or(target),
            record.args()
        )
    });

    if let Some(log_path) = &settings.file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating log directory {}", parent.display()))?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)
                .with_context(|| format!("opening log file {}", log_path.display()))?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    log::info!("Logging at {} (from {})", settings.level, settings.source);
    Ok(())
}

/// Check that `input` is an existing scenario directory.
pub fn validate_scenario_dir(input: &Path) -> Result<()> {
    if !input.exists() {
        bail!("Input path '{}' does not exist.", input.display());
    }
    if !input.is_dir() {
        bail!("Input path '{}' is not a directory.", input.display());
    }
    Ok(())
}

/// Create the parent directory of an output file if it is missing.
pub fn ensure_parent_dir(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_dir_must_exist() {
        let missing = std::env::temp_dir().join("pf_sim_no_such_scenario_dir");
        assert!(validate_scenario_dir(&missing).is_err());
        assert!(validate_scenario_dir(&std::env::temp_dir()).is_ok());
    }

    #[test]
    fn scenario_dir_rejects_files() {
        let file = std::env::temp_dir().join(format!("pf_sim_common_{}.txt", std::process::id()));
        std::fs::write(&file, "x").unwrap();
        assert!(validate_scenario_dir(&file).is_err());
        let _ = std::fs::remove_file(&file);
    }

    #[test]
    fn log_level_precedence() {
        let cfg = LoggingConfig {
            level: "warn".to_string(),
            file: Some(PathBuf::from("from_config.log")),
        };
        let from_cli = LogSettings::resolve(Some("debug"), None, Some(&cfg)).unwrap();
        assert_eq!(from_cli.level, LevelFilter::Debug);
        assert_eq!(from_cli.source, LevelSource::CommandLine);
        assert_eq!(from_cli.file, Some(PathBuf::from("from_config.log")));

        let from_config = LogSettings::resolve(None, None, Some(&cfg)).unwrap();
        assert_eq!(from_config.level, LevelFilter::Warn);
        assert_eq!(from_config.source, LevelSource::ConfigFile);

        let cli_file = PathBuf::from("cli.log");
        let default = LogSettings::resolve(None, Some(&cli_file), None).unwrap();
        assert_eq!(default.level, LevelFilter::Info);
        assert_eq!(default.source, LevelSource::Default);
        assert_eq!(default.file, Some(cli_file));
    }

    #[test]
    fn invalid_log_level_names_its_source() {
        let cfg = LoggingConfig {
            level: "loud".to_string(),
            file: None,
        };
        let err = LogSettings::resolve(None, None, Some(&cfg)).unwrap_err();
        assert!(err.to_string().contains("config file"), "{err}");
        assert!(LogSettings::resolve(Some("verbose"), None, None).is_err());
    }

    #[test]
    fn parent_dirs_are_created() {
        let root = std::env::temp_dir().join(format!("pf_sim_parent_{}", std::process::id()));
        let output = root.join("nested").join("results.csv");
        ensure_parent_dir(&output).unwrap();
        assert!(root.join("nested").is_dir());
        let _ = std::fs::remove_dir_all(&root);
    }
}
