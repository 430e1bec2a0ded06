//! The `imgflow config` command: inspect or create the TOML config.
//!
//! The file holds `[transformer]` (threads, queue limit, layout, processor
//! kind, seed), `[input]`, `[output]`, `[logging]` and the ordered
//! `[[pipeline]]` operator entries that `imgflow run` feeds to the
//! transformer.

use clap::{Args, Subcommand, ValueEnum};
use imgflow_core::Config;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration (file values merged over defaults)
    Show {
        /// Print only one section
        #[arg(long, value_enum)]
        section: Option<Section>,
    },

    /// Print the default config file location
    Path,

    /// Write a default config file with a single `decode` pipeline stage
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Top-level config sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Section {
    Transformer,
    Pipeline,
    Input,
    Output,
    Logging,
}

impl Section {
    fn key(self) -> &'static str {
        match self {
            Section::Transformer => "transformer",
            Section::Pipeline => "pipeline",
            Section::Input => "input",
            Section::Output => "output",
            Section::Logging => "logging",
        }
    }
}

/// Render `config`, or only `section` of it, as TOML.
fn render(config: &Config, section: Option<Section>) -> anyhow::Result<String> {
    let Some(section) = section else {
        return Ok(config.to_toml()?);
    };
    let mut full = match toml::Value::try_from(config)? {
        toml::Value::Table(table) => table,
        _ => anyhow::bail!("config did not serialize to a table"),
    };
    let mut only = toml::Table::new();
    if let Some(value) = full.remove(section.key()) {
        only.insert(section.key().to_string(), value);
    }
    Ok(toml::to_string_pretty(&only)?)
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs, config: Config) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show { section } => {
            println!("{}", render(&config, section)?);
        }

        ConfigCommand::Path => {
            println!("{}", Config::default_path().display());
        }

        ConfigCommand::Init { force } => {
            let path = Config::default_path();
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists at: {}\nUse --force to overwrite.",
                    path.display()
                );
            }

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, Config::default().to_toml()?).await?;

            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_section() {
        let mut config = Config::default();
        config.transformer.thread_num = 6;

        let out = render(&config, Some(Section::Transformer)).unwrap();
        assert!(out.contains("[transformer]"));
        assert!(out.contains("thread_num = 6"));
        assert!(!out.contains("[logging]"));

        let pipeline = render(&config, Some(Section::Pipeline)).unwrap();
        assert!(pipeline.contains("[[pipeline]]"));
        assert!(pipeline.contains("decode"));
    }

    #[test]
    fn test_render_full_config_round_trips() {
        let config = Config::default();
        let out = render(&config, None).unwrap();
        let parsed = Config::from_toml(&out).unwrap();
        assert_eq!(parsed.transformer.thread_num, config.transformer.thread_num);
        assert_eq!(parsed.pipeline.len(), 1);
    }
}
