// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the four subcommands and all their flags:
//
//   train     — index, split, train with early stopping,
//               evaluate the best checkpoint
//   evaluate  — re-score a finished run on its test split
//   predict   — class probabilities for one image
//   summary   — print the layer table without training
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::{backend::BackendKind, train_use_case::TrainConfig};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the classifier on a folder-per-class image tree
    Train(TrainArgs),

    /// Evaluate a trained checkpoint on its held-out test split
    Evaluate(EvaluateArgs),

    /// Predict the severity grade of a single fundus image
    Predict(PredictArgs),

    /// Print the network's layer table
    Summary(SummaryArgs),
}

/// Tensor backend selectable from the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    /// GPU via wgpu
    Wgpu,
    /// CPU via ndarray
    Ndarray,
}

impl From<BackendArg> for BackendKind {
    fn from(b: BackendArg) -> Self {
        match b {
            BackendArg::Wgpu => BackendKind::Wgpu,
            BackendArg::Ndarray => BackendKind::NdArray,
        }
    }
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Root directory with one sub-folder of images per class
    #[arg(long, default_value = "train")]
    pub data_dir: String,

    /// Directory for weights, run.json and metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// File name (without extension) of the best-weights checkpoint
    #[arg(long, default_value = "retina_weights")]
    pub weights_name: String,

    /// Images are resized to image_size × image_size
    #[arg(long, default_value_t = 256)]
    pub image_size: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Upper bound on training epochs
    #[arg(long, default_value_t = 50)]
    pub epochs: usize,

    /// Epochs without a lower validation loss before stopping
    #[arg(long, default_value_t = 15)]
    pub patience: usize,

    /// Adam learning rate
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Fraction of all images held out for testing
    #[arg(long, default_value_t = 0.2)]
    pub test_fraction: f64,

    /// Fraction of the remaining images used for validation
    #[arg(long, default_value_t = 0.15)]
    pub validation_fraction: f64,

    /// Seed for the split, augmentation and shuffling
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Seed for weight initialisation
    #[arg(long, default_value_t = 0)]
    pub init_seed: u64,

    /// Maximum random shear applied to training images, in degrees
    #[arg(long, default_value_t = 0.2)]
    pub shear_degrees: f32,

    /// Randomly mirror training images left-right
    #[arg(long)]
    pub horizontal_flip: bool,

    /// Data loader worker threads
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// Also write one CSV row per test prediction
    #[arg(long)]
    pub predictions_csv: Option<String>,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:            a.data_dir,
            checkpoint_dir:      a.checkpoint_dir,
            weights_name:        a.weights_name,
            image_size:          a.image_size,
            batch_size:          a.batch_size,
            epochs:              a.epochs,
            patience:            a.patience,
            lr:                  a.lr,
            test_fraction:       a.test_fraction,
            validation_fraction: a.validation_fraction,
            seed:                a.seed,
            init_seed:           a.init_seed,
            shear_degrees:       a.shear_degrees,
            horizontal_flip:     a.horizontal_flip,
            num_workers:         a.num_workers,
            backend:             a.backend.into(),
            predictions_csv:     a.predictions_csv,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Directory written by `train`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Override the data directory recorded at training time
    #[arg(long)]
    pub data_dir: Option<String>,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,

    /// Write one CSV row per test prediction
    #[arg(long)]
    pub predictions_csv: Option<String>,
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Image file to classify
    #[arg(long)]
    pub image: PathBuf,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = BackendArg::Wgpu)]
    pub backend: BackendArg,
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[arg(long, default_value_t = 256)]
    pub image_size: usize,

    #[arg(long, default_value_t = 5)]
    pub num_classes: usize,
}
