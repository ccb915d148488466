//! Layer kernels for the sequential CNN forward pass.
//!
//! Activations of one sample are either a sequence `[time, channels]` or a flat
//! vector. Weight layouts follow Keras: Conv1D kernel `[k, in, out]`, Dense
//! kernel `[in, out]`.

use ndarray::{s, Array1, Array2, Array3, Axis};

use super::spec::{Activation, Padding};
use super::InferenceError;

/// Activations flowing between layers for a single sample
#[derive(Debug, Clone, PartialEq)]
pub enum Activations {
    Seq(Array2<f32>),
    Flat(Array1<f32>),
}

/// Static shape of [`Activations`], used while building a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorShape {
    Seq { steps: usize, channels: usize },
    Flat(usize),
}

impl TensorShape {
    /// Size of the innermost axis
    pub fn last_dim(&self) -> usize {
        match *self {
            TensorShape::Seq { channels, .. } => channels,
            TensorShape::Flat(n) => n,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conv1D {
    pub kernel: Array3<f32>,
    pub bias: Array1<f32>,
    pub padding: Padding,
    pub activation: Activation,
}

impl Conv1D {
    pub fn zeros(kernel_size: usize, in_channels: usize, filters: usize) -> Self {
        Self {
            kernel: Array3::zeros((kernel_size, in_channels, filters)),
            bias: Array1::zeros(filters),
            padding: Padding::Valid,
            activation: Activation::Linear,
        }
    }

    pub fn output_steps(&self, steps: usize) -> Option<usize> {
        let k = self.kernel.dim().0;
        match self.padding {
            Padding::Same => Some(steps),
            Padding::Valid => steps.checked_sub(k).map(|n| n + 1),
        }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let (k, _, filters) = self.kernel.dim();
        let (steps, channels) = x.dim();

        // 'same' puts the extra padding sample on the right
        let (left, right) = match self.padding {
            Padding::Same => ((k - 1) / 2, k - 1 - (k - 1) / 2),
            Padding::Valid => (0, 0),
        };
        let mut padded = Array2::<f32>::zeros((steps + left + right, channels));
        padded.slice_mut(s![left..left + steps, ..]).assign(x);

        let out_steps = padded.nrows() + 1 - k;
        let mut out = Array2::<f32>::zeros((out_steps, filters));
        for j in 0..k {
            let window = padded.slice(s![j..j + out_steps, ..]);
            out += &window.dot(&self.kernel.index_axis(Axis(0), j));
        }
        out += &self.bias;
        apply_activation_2d(out, self.activation)
    }
}

#[derive(Debug, Clone)]
pub struct Dense {
    pub kernel: Array2<f32>,
    pub bias: Array1<f32>,
    pub activation: Activation,
}

impl Dense {
    pub fn zeros(in_features: usize, units: usize) -> Self {
        Self {
            kernel: Array2::zeros((in_features, units)),
            bias: Array1::zeros(units),
            activation: Activation::Linear,
        }
    }
}

/// A layer with its weights bound
#[derive(Debug, Clone)]
pub enum Layer {
    Conv1D(Conv1D),
    Dense(Dense),
    Activation(Activation),
    MaxPool1D { pool_size: usize },
    Flatten,
    /// Inference-time identity
    Dropout,
}

impl Layer {
    /// Shape produced from `input`, `None` when the layer cannot take it
    pub fn output_shape(&self, input: TensorShape) -> Option<TensorShape> {
        match (self, input) {
            (Layer::Conv1D(conv), TensorShape::Seq { steps, channels }) => {
                if conv.kernel.dim().1 != channels {
                    return None;
                }
                conv.output_steps(steps)
                    .filter(|&n| n > 0)
                    .map(|steps| TensorShape::Seq {
                        steps,
                        channels: conv.kernel.dim().2,
                    })
            }
            (Layer::Conv1D(_), TensorShape::Flat(_)) => None,
            (Layer::Dense(dense), shape) => {
                let (in_features, units) = dense.kernel.dim();
                if shape.last_dim() != in_features {
                    return None;
                }
                Some(match shape {
                    TensorShape::Seq { steps, .. } => TensorShape::Seq {
                        steps,
                        channels: units,
                    },
                    TensorShape::Flat(_) => TensorShape::Flat(units),
                })
            }
            (Layer::MaxPool1D { pool_size }, TensorShape::Seq { steps, channels }) => {
                let steps = steps / pool_size;
                (steps > 0).then_some(TensorShape::Seq { steps, channels })
            }
            (Layer::MaxPool1D { .. }, TensorShape::Flat(_)) => None,
            (Layer::Flatten, TensorShape::Seq { steps, channels }) => {
                Some(TensorShape::Flat(steps * channels))
            }
            (Layer::Flatten, flat @ TensorShape::Flat(_)) => Some(flat),
            (Layer::Activation(_) | Layer::Dropout, shape) => Some(shape),
        }
    }

    pub fn forward(&self, x: Activations) -> Result<Activations, InferenceError> {
        Ok(match (self, x) {
            (Layer::Conv1D(conv), Activations::Seq(seq)) => {
                if seq.ncols() != conv.kernel.dim().1 || conv.output_steps(seq.nrows()).is_none()
                {
                    return Err(InferenceError::Shape(format!(
                        "Conv1D got [{}, {}], kernel {:?}",
                        seq.nrows(),
                        seq.ncols(),
                        conv.kernel.dim()
                    )));
                }
                Activations::Seq(conv.forward(&seq))
            }
            (Layer::Dense(dense), Activations::Flat(v)) => {
                check_dense_input(dense, v.len())?;
                let out = v.dot(&dense.kernel) + &dense.bias;
                Activations::Flat(apply_activation_1d(out, dense.activation))
            }
            (Layer::Dense(dense), Activations::Seq(seq)) => {
                check_dense_input(dense, seq.ncols())?;
                let out = seq.dot(&dense.kernel) + &dense.bias;
                Activations::Seq(apply_activation_2d(out, dense.activation))
            }
            (Layer::Activation(act), Activations::Seq(seq)) => {
                Activations::Seq(apply_activation_2d(seq, *act))
            }
            (Layer::Activation(act), Activations::Flat(v)) => {
                Activations::Flat(apply_activation_1d(v, *act))
            }
            (Layer::MaxPool1D { pool_size }, Activations::Seq(seq)) => {
                Activations::Seq(max_pool(&seq, *pool_size))
            }
            (Layer::Flatten, Activations::Seq(seq)) => {
                // Row-major: index t * channels + c
                Activations::Flat(seq.iter().copied().collect())
            }
            (Layer::Flatten, flat @ Activations::Flat(_)) => flat,
            (Layer::Dropout, x) => x,
            (layer, Activations::Flat(v)) => {
                return Err(InferenceError::Shape(format!(
                    "{} needs a sequence input, got a flat vector of {}",
                    layer.kind(),
                    v.len()
                )))
            }
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Conv1D(_) => "Conv1D",
            Layer::Dense(_) => "Dense",
            Layer::Activation(_) => "Activation",
            Layer::MaxPool1D { .. } => "MaxPooling1D",
            Layer::Flatten => "Flatten",
            Layer::Dropout => "Dropout",
        }
    }
}

fn check_dense_input(dense: &Dense, len: usize) -> Result<(), InferenceError> {
    let (in_features, _) = dense.kernel.dim();
    if len != in_features {
        return Err(InferenceError::Shape(format!(
            "Dense expects {} features, got {}",
            in_features, len
        )));
    }
    Ok(())
}

fn max_pool(x: &Array2<f32>, pool_size: usize) -> Array2<f32> {
    let steps = x.nrows() / pool_size;
    let mut out = Array2::<f32>::from_elem((steps, x.ncols()), f32::NEG_INFINITY);
    for t in 0..steps {
        let window = x.slice(s![t * pool_size..(t + 1) * pool_size, ..]);
        for row in window.rows() {
            out.row_mut(t).zip_mut_with(&row, |o, &v| *o = o.max(v));
        }
    }
    out
}

fn apply_activation_2d(mut x: Array2<f32>, activation: Activation) -> Array2<f32> {
    match activation {
        Activation::Linear => {}
        Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
        Activation::Softmax => {
            for mut row in x.rows_mut() {
                let soft = Array1::from(softmax(row.to_vec()));
                row.assign(&soft);
            }
        }
    }
    x
}

fn apply_activation_1d(mut x: Array1<f32>, activation: Activation) -> Array1<f32> {
    match activation {
        Activation::Linear => {}
        Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
        Activation::Softmax => x = Array1::from(softmax(x.to_vec())),
    }
    x
}

/// Numerically stable softmax
pub fn softmax(mut values: Vec<f32>) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
    values
}
