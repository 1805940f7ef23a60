// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`    — trains a captioning model
//   2. `evaluate` — BLEU-1..4 of the latest checkpoint
//   3. `caption`  — describes one image
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CaptionArgs, Commands, EvaluateArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "neural-captioner",
    version = "0.1.0",
    about = "Train CNN-LSTM image captioning models, score them with BLEU, caption images."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// The CLI layer only routes; it never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => Self::run_train(args),
            Commands::Evaluate(args) => Self::run_evaluate(args),
            Commands::Caption(args)  => Self::run_caption(args),
        }
    }

    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!("Starting training on captions in: {}", args.captions);
        let checkpoint_dir = args.checkpoint_dir.clone();
        let report = TrainUseCase::new(args.into()).execute()?;

        if let Some(last) = report.losses.last() {
            println!(
                "Training complete after {} epochs (final loss {:.4}). Checkpoints in '{}'.",
                report.losses.len(),
                last,
                checkpoint_dir
            );
        } else {
            println!("Nothing to train. Checkpoints in '{}'.", checkpoint_dir);
        }
        Ok(())
    }

    fn run_evaluate(args: EvaluateArgs) -> Result<()> {
        use crate::application::evaluate_use_case::EvaluateUseCase;

        let report = EvaluateUseCase::new(args.into()).execute()?;
        println!(
            "\n{} model, epoch {}, {} captions ({:?} references)",
            report.model, report.epoch, report.bleu.hypotheses, report.policy
        );
        println!("BLEU-1: {:.4}", report.bleu.bleu1);
        println!("BLEU-2: {:.4}", report.bleu.bleu2);
        println!("BLEU-3: {:.4}", report.bleu.bleu3);
        println!("BLEU-4: {:.4}", report.bleu.bleu4);
        Ok(())
    }

    fn run_caption(args: CaptionArgs) -> Result<()> {
        use crate::application::caption_use_case::CaptionUseCase;

        let captioning = CaptionUseCase::new(args.into()).execute()?;
        println!("\nCaption: {}", captioning.caption);
        Ok(())
    }
}
