//! Model file I/O.
//!
//! A model file is a safetensors container. Weight tensors are named
//! `<layer>/kernel` and `<layer>/bias`; the header metadata carries the topology
//! (`model_config`) and the `format_version`.

use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use super::spec::{ModelSpec, FORMAT_VERSION};
use super::FormatError;

pub const META_MODEL_CONFIG: &str = "model_config";
pub const META_FORMAT_VERSION: &str = "format_version";

/// Tensors and header metadata read from a model file
#[derive(Debug, Default)]
pub struct TensorStore {
    tensors: BTreeMap<String, ArrayD<f32>>,
    metadata: HashMap<String, String>,
}

impl TensorStore {
    /// Read every tensor of a safetensors file into memory
    pub fn read(path: &Path) -> Result<Self, FormatError> {
        let bytes = std::fs::read(path).map_err(|e| FormatError::Io(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let (_, header) = SafeTensors::read_metadata(bytes)
            .map_err(|e| FormatError::Container(e.to_string()))?;
        let metadata = header.metadata().clone().unwrap_or_default();

        let container =
            SafeTensors::deserialize(bytes).map_err(|e| FormatError::Container(e.to_string()))?;

        let mut tensors = BTreeMap::new();
        for (name, view) in container.tensors() {
            let values = decode_values(&name, &view)?;
            let array = ArrayD::from_shape_vec(IxDyn(view.shape()), values)
                .map_err(|e| FormatError::Container(format!("{}: {}", name, e)))?;
            tensors.insert(normalize_name(&name).to_string(), array);
        }

        debug!("Read {} tensors from model container", tensors.len());
        Ok(Self { tensors, metadata })
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Names of the tensors still in the store
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    /// Remove a tensor from the store
    pub fn take(&mut self, name: &str) -> Option<ArrayD<f32>> {
        self.tensors.remove(name)
    }

    /// Topology declared in the header
    pub fn model_spec(&self) -> Result<ModelSpec, FormatError> {
        let version = self
            .metadata(META_FORMAT_VERSION)
            .ok_or(FormatError::MissingMetadata(META_FORMAT_VERSION))?;
        let version: u32 = version
            .trim()
            .parse()
            .map_err(|_| FormatError::UnsupportedVersion(version.to_string()))?;
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version.to_string()));
        }

        let config = self
            .metadata(META_MODEL_CONFIG)
            .ok_or(FormatError::MissingMetadata(META_MODEL_CONFIG))?;
        ModelSpec::from_json(config).map_err(|e| FormatError::Topology(e.to_string()))
    }
}

/// Keras exports name variables `dense_1/kernel:0`
fn normalize_name(name: &str) -> &str {
    name.strip_suffix(":0").unwrap_or(name)
}

fn decode_values(name: &str, view: &TensorView<'_>) -> Result<Vec<f32>, FormatError> {
    let data = view.data();
    match view.dtype() {
        Dtype::F32 => Ok(data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()),
        Dtype::F64 => Ok(data
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32)
            .collect()),
        other => Err(FormatError::UnsupportedDtype {
            tensor: name.to_string(),
            dtype: format!("{:?}", other),
        }),
    }
}

/// Write a complete model file: topology metadata plus `f32` weight tensors
pub fn save_model(
    path: &Path,
    spec: &ModelSpec,
    weights: &BTreeMap<String, ArrayD<f32>>,
) -> Result<(), FormatError> {
    let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = weights
        .iter()
        .map(|(name, array)| {
            let bytes = array.iter().flat_map(|v| v.to_le_bytes()).collect();
            (name.clone(), array.shape().to_vec(), bytes)
        })
        .collect();

    let mut views = Vec::with_capacity(buffers.len());
    for (name, shape, bytes) in &buffers {
        let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
            .map_err(|e| FormatError::Container(format!("{}: {}", name, e)))?;
        views.push((name.clone(), view));
    }

    let config = spec
        .to_json()
        .map_err(|e| FormatError::Topology(e.to_string()))?;
    let metadata = HashMap::from([
        (META_MODEL_CONFIG.to_string(), config),
        (META_FORMAT_VERSION.to_string(), FORMAT_VERSION.to_string()),
    ]);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| FormatError::Io(e.to_string()))?;
        }
    }

    safetensors::serialize_to_file(views, &Some(metadata), path)
        .map_err(|e| FormatError::Container(e.to_string()))?;

    debug!("Saved model '{}' with {} tensors to {:?}", spec.name, buffers.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::spec::reference_architecture;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let mut weights = BTreeMap::new();
        weights.insert(
            "dense_1/kernel".to_string(),
            ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        );
        let spec = reference_architecture();
        save_model(&path, &spec, &weights).unwrap();

        let mut store = TensorStore::read(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.model_spec().unwrap(), spec);
        let kernel = store.take("dense_1/kernel").unwrap();
        assert_eq!(kernel.shape(), &[2, 3]);
        assert_eq!(kernel[[1, 2]], 6.0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_keras_suffix_stripped() {
        assert_eq!(normalize_name("conv1d_1/kernel:0"), "conv1d_1/kernel");
        assert_eq!(normalize_name("conv1d_1/bias"), "conv1d_1/bias");
    }

    #[test]
    fn test_not_a_container() {
        assert!(matches!(
            TensorStore::from_bytes(b"definitely not safetensors"),
            Err(FormatError::Container(_))
        ));
    }

    #[test]
    fn test_missing_topology() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bare.safetensors");
        let bytes = vec![0u8; 8];
        let view = TensorView::new(Dtype::F32, vec![2], &bytes).unwrap();
        safetensors::serialize_to_file(vec![("w".to_string(), view)], &None, &path).unwrap();

        let store = TensorStore::read(&path).unwrap();
        assert!(matches!(
            store.model_spec(),
            Err(FormatError::MissingMetadata(META_FORMAT_VERSION))
        ));
    }
}
