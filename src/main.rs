//! schalter CLI: German voice-command understanding for smart-home devices.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use sprachschalter::action::{Actuator, DryRunActuator};
use sprachschalter::classifier::{
    BootstrapOutcome, IntentClassifier, TrainingReport, bootstrap,
};
use sprachschalter::config::{AssistantConfig, DeviceSource};
use sprachschalter::device::{
    DeviceNameExtractor, DeviceRecord, DeviceRegistry, DeviceResolver, SnapshotRegistry,
};
use sprachschalter::error::{LinguisticResult, SchalterError, SchalterResult};
use sprachschalter::hub::HubClient;
use sprachschalter::linguistic::{
    RemoteAnalyzer, ScriptedAnalyzer, ServiceCell, SharedLinguistics,
};
use sprachschalter::paths::SchalterPaths;
use sprachschalter::pipeline::{Pipeline, PipelineOutcome};

#[derive(Parser)]
#[command(name = "schalter", version, about = "Understand German smart-home commands")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/sprachschalter/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in lexicon instead of the analysis server. Implies
    /// that no actions are sent to the hub.
    #[arg(long, global = true)]
    offline: bool,

    /// Read devices from this JSON snapshot instead of the configured source.
    #[arg(long, global = true)]
    devices: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the intent model and save it.
    Train {
        /// Training CSV (header row, then `text,label`).
        #[arg(long)]
        data: Option<PathBuf>,

        /// Fraction of examples held out for evaluation.
        #[arg(long)]
        eval_fraction: Option<f32>,
    },

    /// Classify the intent of an utterance.
    Predict {
        text: String,
    },

    /// Extract the device phrase of an utterance.
    Extract {
        text: String,
    },

    /// Match a device phrase against the device list.
    Resolve {
        phrase: String,
    },

    /// List known devices.
    Devices {
        /// Also write the list to the snapshot file.
        #[arg(long)]
        save: bool,
    },

    /// Process commands end to end. Reads lines from stdin if no text is given.
    Run {
        text: Option<String>,

        /// Interpret only; do not send anything to the hub.
        #[arg(long)]
        dry_run: bool,

        /// Retrain the intent model before starting.
        #[arg(long)]
        retrain: bool,
    },

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

/// Everything a command needs, resolved once.
struct Context {
    linguistics: ServiceCell,
    cli_devices: Option<PathBuf>,
    offline: bool,
    config_path: PathBuf,
    config: AssistantConfig,
    paths: SchalterPaths,
}

impl Context {
    fn linguistics(&self) -> LinguisticResult<SharedLinguistics> {
        let offline = self.offline;
        let remote = self.config.linguistics.clone();
        self.linguistics.get_or_try_init(move || {
            if offline {
                tracing::info!("offline mode, using built-in lexicon");
                Ok(Arc::new(ScriptedAnalyzer::german_commands()) as SharedLinguistics)
            } else {
                Ok(Arc::new(RemoteAnalyzer::connect(remote)?) as SharedLinguistics)
            }
        })
    }

    fn classifier(&self, force_train: bool) -> SchalterResult<Arc<IntentClassifier>> {
        let classifier = IntentClassifier::new(self.linguistics()?, self.config.classifier_options());
        let options = self.config.bootstrap_options(&self.paths, force_train);
        match bootstrap(&classifier, &options) {
            BootstrapOutcome::Loaded => {}
            BootstrapOutcome::Trained(report) | BootstrapOutcome::Retrained { report, .. } => {
                print_report(&report);
            }
            BootstrapOutcome::Untrained { error } => return Err(SchalterError::from(error)),
        }
        Ok(Arc::new(classifier))
    }

    fn hub(&self) -> SchalterResult<HubClient> {
        Ok(HubClient::from_env(self.config.hub.clone())?)
    }

    fn devices(&self) -> SchalterResult<Vec<DeviceRecord>> {
        if let Some(path) = &self.cli_devices {
            return Ok(SnapshotRegistry::new(path).snapshot()?);
        }
        match self.config.devices.source {
            DeviceSource::Snapshot => {
                Ok(SnapshotRegistry::new(self.config.snapshot_path(&self.paths)).snapshot()?)
            }
            DeviceSource::Hub => Ok(self.hub()?.snapshot()?),
        }
    }

    fn actuator(&self, dry_run: bool) -> SchalterResult<Arc<dyn Actuator>> {
        if dry_run || self.offline {
            Ok(Arc::new(DryRunActuator))
        } else {
            Ok(Arc::new(self.hub()?))
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let paths = SchalterPaths::resolve()?;
    let config_path = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let config = AssistantConfig::load_or_default(&config_path)?;
    let ctx = Context {
        linguistics: ServiceCell::new(),
        cli_devices: cli.devices,
        offline: cli.offline,
        config_path,
        config,
        paths,
    };

    match cli.command {
        Commands::Train {
            data,
            eval_fraction,
        } => {
            let classifier = IntentClassifier::new(ctx.linguistics()?, ctx.config.classifier_options());
            let mut source = ctx.config.training_source(&ctx.paths);
            if let Some(path) = data {
                source.path = path;
            }
            let examples = source.load()?;
            let fraction = eval_fraction.unwrap_or(ctx.config.classifier.eval_fraction);
            let report = classifier.train(&examples, fraction)?;
            print_report(&report);

            let model_path = ctx.config.model_path(&ctx.paths);
            classifier.persist(&model_path)?;
            println!("Model saved to {}", model_path.display());
        }

        Commands::Predict { text } => {
            let classifier = ctx.classifier(false)?;
            let prediction = classifier.predict(&text)?;
            match &prediction.label {
                Some(label) if prediction.is_confident() => {
                    println!("{label} (score {:.3})", prediction.score)
                }
                _ => println!("no confident intent (best score {:.3})", prediction.score),
            }
        }

        Commands::Extract { text } => {
            let extractor = DeviceNameExtractor::new(ctx.linguistics()?);
            let phrase = extractor.try_extract(&text)?;
            if phrase.is_empty() {
                println!("no device phrase found");
            } else {
                println!("{phrase}");
            }
        }

        Commands::Resolve { phrase } => {
            let devices = ctx.devices()?;
            let resolver = DeviceResolver::new(ctx.linguistics()?)
                .with_threshold(ctx.config.resolver.threshold);
            let scores = resolver.score(&phrase, &devices);
            match resolver.select(scores, &devices) {
                Some(resolution) => println!(
                    "{} ({} match, score {:.3})",
                    resolution.device.name, resolution.signal, resolution.score
                ),
                None => println!(
                    "no device matches \"{phrase}\" (semantic {:.3}, edit {:.3})",
                    scores.best_semantic, scores.best_edit
                ),
            }
        }

        Commands::Devices { save } => {
            let devices = ctx.devices()?;
            if devices.is_empty() {
                println!("No devices.");
            } else {
                println!("Devices ({}):", devices.len());
                for device in &devices {
                    println!(
                        "  {:<30} {:<7} {}",
                        device.name,
                        device.domain,
                        device.entity_id.as_deref().unwrap_or("-")
                    );
                }
            }
            if save {
                let registry = SnapshotRegistry::new(ctx.config.snapshot_path(&ctx.paths));
                registry.save(&devices)?;
                println!("Snapshot written to {}", registry.path().display());
            }
        }

        Commands::Run {
            text,
            dry_run,
            retrain,
        } => {
            let classifier = ctx.classifier(retrain)?;
            let devices = ctx.devices()?;
            let pipeline = Pipeline::with_service(
                ctx.linguistics()?,
                classifier,
                ctx.config.resolver.threshold,
                ctx.actuator(dry_run)?,
            );

            match text {
                Some(text) => run_one(&pipeline, &text, &devices)?,
                None => {
                    let stdin = std::io::stdin();
                    for line in stdin.lock().lines() {
                        let line = line.into_diagnostic()?;
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        // One failed command must not end an interactive session.
                        if let Err(e) = run_one(&pipeline, line, &devices) {
                            eprintln!("{:?}", miette::Report::new(e));
                        }
                    }
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { force } => {
                if ctx.config_path.exists() && !force {
                    println!(
                        "Config already exists at {} (use --force to overwrite)",
                        ctx.config_path.display()
                    );
                } else {
                    AssistantConfig::default().save(&ctx.config_path)?;
                    ctx.paths.ensure_dirs()?;
                    println!("Config written to {}", ctx.config_path.display());
                }
            }
            ConfigAction::Show => {
                println!("# {}", ctx.config_path.display());
                print!("{}", ctx.config.to_toml(&ctx.config_path)?);
            }
        },
    }

    Ok(())
}

fn run_one(pipeline: &Pipeline, text: &str, devices: &[DeviceRecord]) -> SchalterResult<()> {
    match pipeline.process(text, devices)? {
        PipelineOutcome::Dispatched { request, receipt } => {
            if receipt.simulated {
                println!("{request} (dry run)");
            } else {
                println!("{request}");
            }
        }
        PipelineOutcome::NoMatch(no_match) => println!("Nicht verstanden: {no_match}"),
    }
    Ok(())
}

fn print_report(report: &TrainingReport) {
    println!(
        "Trained on {} examples ({} held out, {}stratified, {} features)",
        report.fit_count,
        report.eval_count,
        if report.stratified { "" } else { "not " },
        report.vocabulary_len
    );
    if let Some(accuracy) = report.accuracy {
        println!("Held-out accuracy: {:.1}%", accuracy * 100.0);
    }
    for miss in &report.misses {
        println!(
            "  miss: \"{}\" expected {} got {} ({:.2})",
            miss.text, miss.expected, miss.predicted, miss.score
        );
    }
}
