// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap, converts them into application types, calls one use
// case and prints its result.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, PredictArgs, SummaryArgs, TrainArgs};

use crate::application::report;
use crate::ml::model::RetinaNetConfig;

#[derive(Parser, Debug)]
#[command(
    name = "retina-grader",
    version,
    about = "Grade diabetic retinopathy severity from fundus photographs with a residual CNN."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case; no computation here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Predict(args)  => run_predict(args),
            Commands::Summary(args)  => run_summary(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on images in: {}", args.data_dir);
    let outcome = TrainUseCase::new(args.into()).execute()?;

    println!("\n{}", report::render_fit(&outcome.fit));
    report::print_test_report(&outcome.test);
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let use_case = EvaluateUseCase::new(
        args.checkpoint_dir,
        args.data_dir,
        args.backend.into(),
        args.predictions_csv,
    );
    let test = use_case.execute()?;
    report::print_test_report(&test);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case   = PredictUseCase::new(args.checkpoint_dir, args.backend.into());
    let prediction = use_case.predict(args.image)?;
    report::print_prediction(&prediction);
    Ok(())
}

fn run_summary(args: SummaryArgs) -> Result<()> {
    let spec = RetinaNetConfig::new()
        .with_image_size(args.image_size)
        .with_num_classes(args.num_classes)
        .spec();
    println!("{}", spec.summary()?);
    Ok(())
}
