//! Fit a feature vector to the model's declared input shape.

use ndarray::{ArrayD, IxDyn};

use super::{InputShape, ShapeError};

/// Reshape `features` into a batch of one for a model declaring `shape`.
///
/// `(None, n)` gives `[1, len]`, `(None, n, 1)` gives `[1, len, 1]`. Other
/// layouts are rejected, as is a known `n` different from `len`.
pub fn adapt_input(shape: &InputShape, features: &[f32]) -> Result<ArrayD<f32>, ShapeError> {
    let len = features.len();

    let (feature_dim, target) = match shape.dims() {
        [_, n] => (*n, vec![1, len]),
        [_, n, Some(1)] => (*n, vec![1, len, 1]),
        _ => return Err(ShapeError::Unsupported(shape.clone())),
    };

    if let Some(expected) = feature_dim {
        if expected != len {
            return Err(ShapeError::FeatureLength {
                expected,
                actual: len,
            });
        }
    }

    ArrayD::from_shape_vec(IxDyn(&target), features.to_vec())
        .map_err(|_| ShapeError::Unsupported(shape.clone()))
}
