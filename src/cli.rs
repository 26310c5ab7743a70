use std::path::PathBuf;

use caption_engine::EngineSettings;
use caption_types::{BoxId, Label};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};

#[derive(Debug, Default)]
pub struct CliSources {
    pub batch_size_from_cli: bool,
    pub reversal_threshold_from_cli: bool,
    pub max_boxes_from_cli: bool,
    pub min_change_probability_from_cli: bool,
    pub outlier_k_from_cli: bool,
}

impl CliSources {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            batch_size_from_cli: value_from_cli(matches, "batch_size"),
            reversal_threshold_from_cli: value_from_cli(matches, "reversal_threshold"),
            max_boxes_from_cli: value_from_cli(matches, "max_boxes_per_update"),
            min_change_probability_from_cli: value_from_cli(matches, "min_change_probability"),
            outlier_k_from_cli: value_from_cli(matches, "outlier_k"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "caption-layout",
    about = "Classify OCR boxes as caption or noise and infer the caption layout",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Override the configuration file path
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Session snapshot (JSON) to read and update
    #[arg(short = 's', long = "snapshot", value_name = "FILE", global = true)]
    pub snapshot: Option<PathBuf>,

    /// Write the updated snapshot here instead of overwriting the input
    #[arg(short = 'o', long = "output", value_name = "FILE", global = true)]
    pub output: Option<PathBuf>,

    /// Leave the snapshot untouched on disk
    #[arg(long = "dry-run", global = true)]
    pub dry_run: bool,

    /// Boxes recomputed per streaming batch
    #[arg(
        long = "batch-size",
        id = "batch_size",
        global = true,
        default_value_t = EngineSettings::default().batch_size,
        value_parser = clap::value_parser!(usize)
    )]
    pub batch_size: usize,

    /// Reversal rate below which a streaming update stops early
    #[arg(
        long = "reversal-threshold",
        id = "reversal_threshold",
        global = true,
        default_value_t = EngineSettings::default().reversal_threshold
    )]
    pub reversal_threshold: f64,

    /// Upper bound on boxes recomputed for a single label
    #[arg(
        long = "max-boxes",
        id = "max_boxes_per_update",
        global = true,
        default_value_t = EngineSettings::default().max_boxes_per_update,
        value_parser = clap::value_parser!(usize)
    )]
    pub max_boxes_per_update: usize,

    /// Candidates with a lower change probability are skipped
    #[arg(
        long = "min-change-probability",
        id = "min_change_probability",
        global = true,
        default_value_t = EngineSettings::default().min_change_probability
    )]
    pub min_change_probability: f64,

    /// IQR multiplier for outlier rejection in the layout analyzer
    #[arg(
        long = "outlier-k",
        id = "outlier_k",
        global = true,
        default_value_t = EngineSettings::default().outlier_k
    )]
    pub outlier_k: f64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Recompute crop bounds and text anchor from caption boxes
    Layout,
    /// Retrain the classifier from the current user labels
    Retrain,
    /// Record a user label and refresh the predictions it affects
    Label {
        /// Box to label, as <frame>:<box>
        #[arg(value_parser = clap::value_parser!(BoxId))]
        id: BoxId,
        /// Either "in" (caption) or "out" (noise)
        #[arg(value_parser = clap::value_parser!(Label))]
        label: Label,
    },
    /// Predict every box of every frame
    Predict,
    /// Print per-feature Fisher scores of the trained model
    Importance,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Layout => "layout",
            Command::Retrain => "retrain",
            Command::Label { .. } => "label",
            Command::Predict => "predict",
            Command::Importance => "importance",
        }
    }

    /// Whether the command changes the snapshot.
    pub fn writes_snapshot(&self) -> bool {
        !matches!(self, Command::Importance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> (CliArgs, CliSources) {
        let matches = CliArgs::command().try_get_matches_from(args).unwrap();
        let cli = CliArgs::from_arg_matches(&matches).unwrap();
        (cli, CliSources::from_matches(&matches))
    }

    #[test]
    fn defaults_are_not_marked_as_cli_values() {
        let (cli, sources) = parse(&["caption-layout", "predict"]);
        assert_eq!(cli.command, Command::Predict);
        assert_eq!(cli.batch_size, 50);
        assert!(!sources.batch_size_from_cli);
        assert!(!sources.outlier_k_from_cli);
    }

    #[test]
    fn label_command_parses_box_and_label() {
        let (cli, sources) = parse(&[
            "caption-layout",
            "label",
            "12:3",
            "OUT",
            "--batch-size",
            "20",
            "--snapshot",
            "session.json",
        ]);
        assert_eq!(
            cli.command,
            Command::Label {
                id: BoxId::new(12, 3),
                label: Label::Out
            }
        );
        assert_eq!(cli.batch_size, 20);
        assert!(sources.batch_size_from_cli);
        assert_eq!(cli.snapshot, Some(PathBuf::from("session.json")));
    }

    #[test]
    fn malformed_box_id_is_rejected() {
        let result = CliArgs::command().try_get_matches_from(["caption-layout", "label", "12", "in"]);
        assert!(result.is_err());
    }
}
