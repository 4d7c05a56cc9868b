pub mod explainer;
pub mod features;
pub mod models;
pub mod predictor;

pub use models::{Attribution, Impact, RawMatch};
pub use predictor::{Predictor, WinPredictor};
