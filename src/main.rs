//! softlogic CLI: learn rule weights for soft-logic models.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use softlogic::config::Settings;
use softlogic::learn::{LearningContext, MaxLikelihoodMpe, learn_weights};
use softlogic::model::{ModelFile, weights_by_name};
use softlogic::reasoner::{AdmmReasoner, CancellationToken, TermStore};

#[derive(Parser)]
#[command(name = "softlogic", version, about = "Soft-logic weight learning")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn rule weights from a labeled model.
    Learn {
        /// Path to the JSON model file.
        #[arg(long)]
        model: PathBuf,

        /// TOML settings file (defaults apply when omitted).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write learned weights as JSON here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the model with its learned weights to this path.
        #[arg(long)]
        save_model: Option<PathBuf>,
    },

    /// Load a model and print a summary without learning.
    Check {
        /// Path to the JSON model file.
        #[arg(long)]
        model: PathBuf,

        /// TOML settings file (defaults apply when omitted).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the default settings as TOML.
    Config,
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Ok(Settings::load(path)?),
        None => Ok(Settings::default()),
    }
}

fn load_context(model: &ModelFile, settings: &Settings) -> Result<LearningContext> {
    let reasoner = AdmmReasoner::new(settings.reasoner.clone());
    Ok(model.into_context(Box::new(reasoner))?)
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

    match cli.command {
        Commands::Learn {
            model,
            config,
            output,
            save_model,
        } => {
            let settings = load_settings(config.as_deref())?;
            let mut model_file = ModelFile::load(&model)?;
            let mut ctx = load_context(&model_file, &settings)?;

            let report = learn_weights(
                &mut MaxLikelihoodMpe::new(),
                &mut ctx,
                &settings.learn,
                &CancellationToken::new(),
            )?;

            println!(
                "Learning finished: {} after {} iterations ({} MPE solves)",
                report.termination, report.iterations, report.mpe_solves
            );
            println!(
                "  final loss: {:.6}, gradient norm: {:.3e}",
                report.final_loss, report.gradient_norm
            );

            let weights = weights_by_name(ctx.rules());
            let json = serde_json::to_string_pretty(&weights).into_diagnostic()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json).into_diagnostic()?;
                    println!("Weights written to {}", path.display());
                }
                None => println!("{json}"),
            }

            if let Some(path) = save_model {
                model_file.update_weights(ctx.rules());
                std::fs::write(&path, model_file.to_json()?).into_diagnostic()?;
                println!("Model written to {}", path.display());
            }
        }

        Commands::Check { model, config } => {
            let settings = load_settings(config.as_deref())?;
            let model_file = ModelFile::load(&model)?;
            let ctx = load_context(&model_file, &settings)?;

            let random_variables = ctx.atoms().random_variables();
            let unlabeled = random_variables
                .iter()
                .filter(|&&id| ctx.observed().get(id).is_none())
                .count();
            let terms = TermStore::new(ctx.rules(), ctx.ground_rules());
            let objective = terms.objective(ctx.atoms());
            let infeasibility = terms.infeasibility(ctx.atoms());

            println!("Model: {}", model.display());
            println!(
                "  rules:       {} ({} learnable)",
                ctx.rules().len(),
                ctx.mutable_rules().len()
            );
            println!(
                "  atoms:       {} ({} random variables, {} unlabeled)",
                ctx.atoms().len(),
                random_variables.len(),
                unlabeled
            );
            println!("  groundings:  {}", ctx.ground_rules().len());
            println!("  objective:   {objective:.6}");
            println!("  infeasible:  {infeasibility:.6}");
            for rule in ctx.rules().iter() {
                println!(
                    "    {:<24} {:>4} groundings  weight {:.4}",
                    rule.name,
                    ctx.ground_rules().ground_rules(rule.id).len(),
                    rule.weight()
                );
            }
        }

        Commands::Config => {
            print!("{}", Settings::default().to_toml()?);
        }
    }

    Ok(())
}
