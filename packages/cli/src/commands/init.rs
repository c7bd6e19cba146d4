use actionlog_tracker::{ActionRule, TrackerConfig, DEFAULT_CONFIG_NAME};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to write the config into
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Tracker name recorded in exported commands
    #[arg(short, long, default_value = "default")]
    pub name: String,

    /// Maximum undo levels (0 = unlimited)
    #[arg(long, default_value_t = 100)]
    pub max_undo: usize,

    /// Attribute carrying stable node ids
    #[arg(long, default_value = "a_id")]
    pub id_attribute: String,

    /// Add sample save rules for property and text edits
    #[arg(long)]
    pub sample_rules: bool,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs) -> Result<()> {
    let config_path = args.dir.join(DEFAULT_CONFIG_NAME);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            config_path.display().to_string().bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    let mut config = TrackerConfig {
        name: args.name,
        max_undo: args.max_undo,
        id_attribute: args.id_attribute,
        ..TrackerConfig::default()
    };
    if args.sample_rules {
        add_sample_rules(&mut config);
    }

    let written = write_config(&args.dir, &config)?;
    println!("  {} Created {}", "✓".green(), written.display());
    Ok(())
}

fn add_sample_rules(config: &mut TrackerConfig) {
    let id = format!("{{@{}}}", config.id_attribute);
    config.rules.insert(
        "setProperty".to_string(),
        ActionRule::new(format!("rpc:setProperty({id}, {{$name}}, {{$value}})")),
    );
    config.rules.insert(
        "setText".to_string(),
        ActionRule::new(format!("rpc:setText({id}, {{$value}})")),
    );
}

fn write_config(dir: &Path, config: &TrackerConfig) -> Result<PathBuf> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create directory {}", dir.display()))?;
    }
    let path = dir.join(DEFAULT_CONFIG_NAME);
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json).with_context(|| format!("Cannot write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TrackerConfig {
            name: "books".to_string(),
            max_undo: 5,
            ..TrackerConfig::default()
        };
        add_sample_rules(&mut config);

        write_config(dir.path(), &config).unwrap();
        let loaded = TrackerConfig::load(dir.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.rules["setText"].set.as_deref(),
            Some("rpc:setText({@a_id}, {$value})")
        );
    }
}
