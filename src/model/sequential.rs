//! Sequential model built from a [`ModelSpec`] and bound to stored weights.

use ndarray::{Array1, ArrayD, Ix2, Ix3};
use tracing::{debug, warn};

use super::layers::{Activations, Conv1D, Dense, Layer, TensorShape};
use super::spec::{LayerSpec, ModelSpec};
use super::weights::TensorStore;
use super::{EmotionModel, FormatError, InferenceError, InputShape};

/// How stored tensors are matched to the topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Every layer needs its tensors with the exact shape, and nothing may be left over
    Strict,
    /// Take what matches by name and shape, zero-initialise the rest
    ByName,
}

/// Outcome of binding tensors to layers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindReport {
    /// Tensors bound to a layer
    pub loaded: Vec<String>,
    /// Tensors present in the file but not used
    pub skipped: Vec<String>,
    /// Layers left with zero weights
    pub zeroed: Vec<String>,
}

pub struct SequentialModel {
    name: String,
    input_shape: InputShape,
    layers: Vec<(String, Layer)>,
    output_width: usize,
}

impl SequentialModel {
    /// Build the topology and bind weights taken from `store`
    pub fn build(
        spec: &ModelSpec,
        store: &mut TensorStore,
        binding: Binding,
    ) -> Result<(Self, BindReport), FormatError> {
        let mut shape = initial_shape(&spec.input_shape)?;
        let mut report = BindReport::default();
        let mut layers = Vec::with_capacity(spec.layers.len());

        for layer_spec in &spec.layers {
            let name = layer_spec.name().to_string();
            let layer = match layer_spec {
                LayerSpec::Conv1D {
                    filters,
                    kernel_size,
                    padding,
                    activation,
                    ..
                } => {
                    if *kernel_size == 0 || *filters == 0 {
                        return Err(FormatError::Topology(format!(
                            "{}: kernel_size {} with {} filters",
                            name, kernel_size, filters
                        )));
                    }
                    let TensorShape::Seq { channels, .. } = shape else {
                        return Err(FormatError::Topology(format!(
                            "{} needs a sequence input",
                            name
                        )));
                    };
                    let mut conv = Conv1D::zeros(*kernel_size, channels, *filters);
                    conv.padding = *padding;
                    conv.activation = *activation;

                    let kernel = bind_tensor(store, &name, "kernel", conv.kernel.shape(), binding, &mut report)?;
                    let bias = bind_tensor(store, &name, "bias", conv.bias.shape(), binding, &mut report)?;
                    if kernel.is_none() || bias.is_none() {
                        report.zeroed.push(name.clone());
                    }
                    if let Some(kernel) = kernel {
                        conv.kernel = kernel
                            .into_dimensionality::<Ix3>()
                            .map_err(|e| FormatError::Topology(e.to_string()))?;
                    }
                    if let Some(bias) = bias {
                        conv.bias = Array1::from_iter(bias.iter().copied());
                    }
                    Layer::Conv1D(conv)
                }
                LayerSpec::Dense {
                    units, activation, ..
                } => {
                    if *units == 0 {
                        return Err(FormatError::Topology(format!("{}: units 0", name)));
                    }
                    let mut dense = Dense::zeros(shape.last_dim(), *units);
                    dense.activation = *activation;

                    let kernel = bind_tensor(store, &name, "kernel", dense.kernel.shape(), binding, &mut report)?;
                    let bias = bind_tensor(store, &name, "bias", dense.bias.shape(), binding, &mut report)?;
                    if kernel.is_none() || bias.is_none() {
                        report.zeroed.push(name.clone());
                    }
                    if let Some(kernel) = kernel {
                        dense.kernel = kernel
                            .into_dimensionality::<Ix2>()
                            .map_err(|e| FormatError::Topology(e.to_string()))?;
                    }
                    if let Some(bias) = bias {
                        dense.bias = Array1::from_iter(bias.iter().copied());
                    }
                    Layer::Dense(dense)
                }
                LayerSpec::Activation { activation, .. } => Layer::Activation(*activation),
                LayerSpec::Dropout { .. } => Layer::Dropout,
                LayerSpec::MaxPooling1D { pool_size, .. } => {
                    if *pool_size == 0 {
                        return Err(FormatError::Topology(format!("{}: pool_size 0", name)));
                    }
                    Layer::MaxPool1D {
                        pool_size: *pool_size,
                    }
                }
                LayerSpec::Flatten { .. } => Layer::Flatten,
            };

            shape = layer.output_shape(shape).ok_or_else(|| {
                FormatError::Topology(format!("{} ({}) cannot take input {:?}", name, layer.kind(), shape))
            })?;
            layers.push((name, layer));
        }

        let output_width = match shape {
            TensorShape::Flat(n) => n,
            other => {
                return Err(FormatError::Topology(format!(
                    "model output must be a flat vector, got {:?}",
                    other
                )))
            }
        };

        let leftover: Vec<String> = store.names().map(str::to_string).collect();
        if !leftover.is_empty() {
            match binding {
                Binding::Strict => {
                    return Err(FormatError::UnexpectedTensors(leftover.join(", ")));
                }
                Binding::ByName => {
                    for name in &leftover {
                        debug!("Skipping tensor '{}': no layer of that name", name);
                    }
                    report.skipped.extend(leftover);
                }
            }
        }

        let model = Self {
            name: spec.name.clone(),
            input_shape: InputShape::new(spec.input_shape.clone()),
            layers,
            output_width,
        };
        Ok((model, report))
    }

    /// Topology with all weights zero
    pub fn zeros(spec: &ModelSpec) -> Result<Self, FormatError> {
        let mut empty = TensorStore::default();
        Self::build(spec, &mut empty, Binding::ByName).map(|(model, _)| model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn forward_one(&self, mut x: Activations) -> Result<Vec<f32>, InferenceError> {
        for (name, layer) in &self.layers {
            x = layer
                .forward(x)
                .map_err(|e| InferenceError::Shape(format!("{}: {}", name, e)))?;
        }
        match x {
            Activations::Flat(v) => Ok(v.to_vec()),
            Activations::Seq(_) => Err(InferenceError::Shape(
                "model produced a sequence instead of a vector".to_string(),
            )),
        }
    }
}

impl EmotionModel for SequentialModel {
    fn input_shape(&self) -> &InputShape {
        &self.input_shape
    }

    fn output_width(&self) -> usize {
        self.output_width
    }

    fn predict(&self, input: &ArrayD<f32>) -> Result<Vec<Vec<f32>>, InferenceError> {
        let declared = self.input_shape.dims();
        if input.ndim() != declared.len() {
            return Err(InferenceError::Shape(format!(
                "input has rank {}, model expects {}",
                input.ndim(),
                self.input_shape
            )));
        }
        for (axis, (&actual, expected)) in input.shape().iter().zip(declared).enumerate().skip(1) {
            if let Some(expected) = expected {
                if actual != *expected {
                    return Err(InferenceError::Shape(format!(
                        "input axis {} has size {}, model expects {}",
                        axis, actual, self.input_shape
                    )));
                }
            }
        }

        input
            .outer_iter()
            .map(|sample| {
                let x = match sample.ndim() {
                    1 => Activations::Flat(sample.iter().copied().collect()),
                    _ => Activations::Seq(
                        sample
                            .into_dimensionality::<Ix2>()
                            .map_err(|e| InferenceError::Shape(e.to_string()))?
                            .to_owned(),
                    ),
                };
                self.forward_one(x)
            })
            .collect()
    }
}

/// Activation shape of one sample given the declared `[batch, ...]` shape
fn initial_shape(dims: &[Option<usize>]) -> Result<TensorShape, FormatError> {
    let known = |d: Option<usize>| {
        d.filter(|&n| n > 0).ok_or_else(|| {
            FormatError::Topology(format!("input shape {:?} has an unknown feature axis", dims))
        })
    };
    match dims {
        [_, n] => Ok(TensorShape::Flat(known(*n)?)),
        [_, steps, channels] => Ok(TensorShape::Seq {
            steps: known(*steps)?,
            channels: known(*channels)?,
        }),
        _ => Err(FormatError::Topology(format!(
            "input shape {:?} must have rank 2 or 3",
            dims
        ))),
    }
}

fn bind_tensor(
    store: &mut TensorStore,
    layer: &str,
    param: &str,
    expected: &[usize],
    binding: Binding,
    report: &mut BindReport,
) -> Result<Option<ArrayD<f32>>, FormatError> {
    let key = format!("{}/{}", layer, param);
    match (store.take(&key), binding) {
        (Some(tensor), _) if tensor.shape() == expected => {
            report.loaded.push(key);
            Ok(Some(tensor))
        }
        (Some(tensor), Binding::Strict) => Err(FormatError::ShapeMismatch {
            tensor: key,
            expected: expected.to_vec(),
            found: tensor.shape().to_vec(),
        }),
        (Some(tensor), Binding::ByName) => {
            warn!(
                "Skipping tensor '{}': shape {:?} does not match {:?}",
                key,
                tensor.shape(),
                expected
            );
            report.skipped.push(key);
            Ok(None)
        }
        (None, Binding::Strict) => Err(FormatError::MissingTensor(key)),
        (None, Binding::ByName) => Ok(None),
    }
}
