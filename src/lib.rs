//! Speech emotion recognition.
//!
//! WAV audio is reduced to a 40-coefficient mean MFCC vector, fed to a small
//! 1-D CNN, and the arg-max of its softmax output picks one of eight emotions.

pub mod audio;
pub mod batch;
pub mod config;
pub mod emotion;
pub mod features;
pub mod model;
pub mod server;


pub use config::Config;
pub use emotion::{predict_path, Emotion, PredictError, PredictionResult, Predictor};
pub use features::{extract_features, FeatureError, FeatureVector};
pub use model::{load_model, LoadError, LoadedModel, ModelCache};
