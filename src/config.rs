use std::path::{Component, Path, PathBuf};

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File, FileFormat};
use miette::{miette, Context, IntoDiagnostic, Result};
use regex::Regex;
use serde::Deserialize;

use crate::{cli::Overrides, types::Container};

/// Configuration file read when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "clipreel.toml";

/// Prefix of the environment variables overriding the configuration
pub const ENV_PREFIX: &str = "CLIPREEL";

/// Links of clips pages and of the clips host
pub const DEFAULT_CLIP_PATTERN: &str = r"/clip/[\w-]+|clips\.twitch\.tv/[\w-]+";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Channel names or URLs to discover clips from
    pub channels: Vec<String>,
    /// Candidate store database
    pub cache: PathBuf,
    /// Directory holding the fetched media, emptied at every run
    pub work_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Target runtime of the output, in seconds
    pub budget: f64,
    pub min_views: u64,
    pub max_age_hours: u32,
    pub clip_pattern: String,
    pub container: Container,
}

impl Settings {
    /// Merge the defaults, the configuration file, the environment and the CLI overrides
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        Self::load_with_env(file, Environment::with_prefix(ENV_PREFIX), overrides)
    }

    fn load_with_env(file: Option<&Path>, env: Environment, overrides: &Overrides) -> Result<Self> {
        let file = match file {
            Some(path) => File::new(&path.to_string_lossy(), FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let env = env
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("channels");

        let builder = defaults(Config::builder())
            .into_diagnostic()?
            .add_source(file)
            .add_source(env);

        let settings: Settings = apply_overrides(builder, overrides)
            .into_diagnostic()?
            .build()
            .into_diagnostic()
            .wrap_err("Could not read the configuration")?
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if !self.budget.is_finite() || self.budget < 0.0 {
            return Err(miette!(
                "The budget must be a number of seconds >= 0, got {}",
                self.budget
            ));
        }

        // The work directory is emptied at every run
        let work_dir = absolute(&self.work_dir)?;
        for (name, path) in [("out_dir", &self.out_dir), ("cache", &self.cache)] {
            if absolute(path)?.starts_with(&work_dir) {
                return Err(miette!(
                    "The {name} '{}' is inside the work_dir '{}' which is emptied at every run",
                    path.display(),
                    self.work_dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Compile the clip link pattern
    pub fn clip_regex(&self) -> Result<Regex> {
        Regex::new(&self.clip_pattern)
            .into_diagnostic()
            .wrap_err_with(|| format!("Invalid clip pattern '{}'", self.clip_pattern))
    }
}

/// Make the path absolute and resolve `.` and `..` without touching the filesystem
fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .into_diagnostic()
            .wrap_err("Could not get the current directory")?
            .join(path)
    };

    let mut res = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                res.pop();
            }
            other => res.push(other),
        }
    }
    Ok(res)
}

fn defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    builder
        .set_default("channels", Vec::<String>::new())?
        .set_default("cache", "clips.sqlite")?
        .set_default("work_dir", "temp")?
        .set_default("out_dir", "final")?
        .set_default("budget", 1200.0)?
        .set_default("min_views", 50_i64)?
        .set_default("max_age_hours", 24_i64)?
        .set_default("clip_pattern", DEFAULT_CLIP_PATTERN)?
        .set_default("container", "mp4")
}

fn apply_overrides(
    builder: ConfigBuilder<DefaultState>,
    overrides: &Overrides,
) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
    let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().into_owned());

    builder
        .set_override_option("cache", path(&overrides.cache))?
        .set_override_option("work_dir", path(&overrides.work_dir))?
        .set_override_option("out_dir", path(&overrides.out_dir))?
        .set_override_option("budget", overrides.budget)?
        .set_override_option("channels", overrides.channels.clone())
}
