//! Sequence model bundle: a JSON layer graph with inline weights, plus an
//! `ndarray` forward pass (embedding, LSTM, pooling, dense) over padded token ids.
//!
//! Loading tries, in order:
//! 1. `standard`: strict schema, unknown layer config fields are rejected
//! 2. `compat`: drop fields listed in [`legacy::DEPRECATED_LAYER_FIELDS`],
//!    then the same strict schema
//!
//! Both strategies shape-check the graph before it is handed out.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use super::legacy;
use super::{load_first, read_artifact, Strategy};
use crate::error::{InferenceError, LoadError};

/// Anything that maps a padded id sequence to a positive-sentiment probability.
pub trait SentimentModel: Send + Sync {
    /// First output scalar for one sequence.
    fn predict(&self, sequence: &[u32]) -> Result<f32, InferenceError>;
}

/* ----------------------------
Bundle schema
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
pub struct ModelBundle {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    pub layers: Vec<LayerSpec>,
}

fn default_format_version() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "class_name")]
pub enum LayerSpec {
    Embedding {
        config: EmbeddingConfig,
        weights: EmbeddingWeights,
    },
    #[serde(rename = "LSTM")]
    Lstm {
        config: LstmConfig,
        weights: LstmWeights,
    },
    GlobalAveragePooling1D {
        #[serde(default)]
        config: NamedConfig,
    },
    Dropout {
        #[serde(default)]
        config: DropoutConfig,
    },
    Dense {
        config: DenseConfig,
        weights: DenseWeights,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamedConfig {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub input_dim: usize,
    pub output_dim: usize,
    #[serde(default)]
    pub mask_zero: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingWeights {
    pub embeddings: Vec<Vec<f32>>,
}

fn default_tanh() -> Activation {
    Activation::Tanh
}

fn default_sigmoid() -> Activation {
    Activation::Sigmoid
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LstmConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub units: usize,
    #[serde(default = "default_tanh")]
    pub activation: Activation,
    #[serde(default = "default_sigmoid")]
    pub recurrent_activation: Activation,
    #[serde(default)]
    pub return_sequences: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LstmWeights {
    pub kernel: Vec<Vec<f32>>,
    pub recurrent_kernel: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropoutConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rate: f32,
}

fn default_linear() -> Activation {
    Activation::Linear
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenseConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub units: usize,
    #[serde(default = "default_linear")]
    pub activation: Activation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DenseWeights {
    pub kernel: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl LayerSpec {
    fn display_name(&self, position: usize) -> String {
        let (kind, name) = match self {
            LayerSpec::Embedding { config, .. } => ("embedding", config.name.as_deref()),
            LayerSpec::Lstm { config, .. } => ("lstm", config.name.as_deref()),
            LayerSpec::GlobalAveragePooling1D { config } => ("pooling", config.name.as_deref()),
            LayerSpec::Dropout { config } => ("dropout", config.name.as_deref()),
            LayerSpec::Dense { config, .. } => ("dense", config.name.as_deref()),
        };
        name.map(str::to_string)
            .unwrap_or_else(|| format!("{kind}_{position}"))
    }
}

/* ----------------------------
Loading
---------------------------- */

const STRATEGIES: &[Strategy<SequenceModel>] = &[
    Strategy {
        name: "standard",
        load: load_standard,
    },
    Strategy {
        name: "compat",
        load: load_compat,
    },
];

/// Read and validate the model bundle at `path`.
pub fn load_model(path: &Path) -> Result<SequenceModel, LoadError> {
    let bytes = read_artifact(path)?;
    let (model, strategy) = load_first(&bytes, STRATEGIES)?;
    info!(
        path = %path.display(),
        strategy,
        layers = model.layers.len(),
        vocab = model.vocab_size,
        "model loaded"
    );
    Ok(model)
}

fn load_standard(bytes: &[u8]) -> Result<SequenceModel, LoadError> {
    let bundle: ModelBundle = serde_json::from_slice(bytes)?;
    SequenceModel::from_bundle(bundle)
}

fn load_compat(bytes: &[u8]) -> Result<SequenceModel, LoadError> {
    let mut raw: serde_json::Value = serde_json::from_slice(bytes)?;
    let dropped = legacy::strip_deprecated_fields(&mut raw);
    if dropped == 0 {
        return Err(LoadError::NotApplicable(
            "no deprecated layer fields to drop".to_string(),
        ));
    }
    let bundle: ModelBundle = serde_json::from_value(raw)?;
    SequenceModel::from_bundle(bundle)
}

/* ----------------------------
Validated model + forward pass
---------------------------- */

/// A layer with its weights laid out as arrays, ready to run.
#[derive(Debug, Clone)]
enum Layer {
    /// `[vocab, dim]` lookup table.
    Embedding { table: Array2<f32> },
    /// Kernels are `[input, 4 * units]` and `[units, 4 * units]`, gate order
    /// input, forget, cell, output.
    Lstm {
        kernel: Array2<f32>,
        recurrent: Array2<f32>,
        bias: Array1<f32>,
        units: usize,
        activation: Activation,
        recurrent_activation: Activation,
        return_sequences: bool,
    },
    AveragePool,
    /// `[input, units]` kernel.
    Dense {
        kernel: Array2<f32>,
        bias: Array1<f32>,
        activation: Activation,
    },
}

/// A shape-checked layer graph, read-only after construction.
#[derive(Debug, Clone)]
pub struct SequenceModel {
    layers: Vec<Layer>,
    vocab_size: usize,
    mask_zero: bool,
}

/// What flows between layers during validation.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Sequence(usize),
    Vector(usize),
}

fn shape_err(layer: &str, detail: impl Into<String>) -> LoadError {
    LoadError::Shape {
        layer: layer.to_string(),
        detail: detail.into(),
    }
}

fn matrix(
    layer: &str,
    what: &str,
    m: Vec<Vec<f32>>,
    rows: usize,
    cols: usize,
) -> Result<Array2<f32>, LoadError> {
    if m.len() != rows {
        return Err(shape_err(
            layer,
            format!("{what} has {} rows, expected {rows}", m.len()),
        ));
    }
    if let Some(bad) = m.iter().position(|r| r.len() != cols) {
        return Err(shape_err(
            layer,
            format!("{what} row {bad} has {} columns, expected {cols}", m[bad].len()),
        ));
    }
    Array2::from_shape_vec((rows, cols), m.concat())
        .map_err(|e| shape_err(layer, format!("{what}: {e}")))
}

fn vector(layer: &str, what: &str, v: Vec<f32>, len: usize) -> Result<Array1<f32>, LoadError> {
    if v.len() != len {
        return Err(shape_err(
            layer,
            format!("{what} has {} entries, expected {len}", v.len()),
        ));
    }
    Ok(Array1::from(v))
}

impl SequenceModel {
    pub fn from_bundle(bundle: ModelBundle) -> Result<Self, LoadError> {
        let first_name = bundle
            .layers
            .first()
            .map(|l| l.display_name(0))
            .unwrap_or_default();
        let mut specs = bundle.layers.into_iter().enumerate();

        let (vocab_size, mask_zero, mut stage, table) = match specs.next() {
            Some((_, LayerSpec::Embedding { config, weights })) => {
                if config.input_dim == 0 || config.output_dim == 0 {
                    return Err(shape_err(&first_name, "embedding dims must be non-zero"));
                }
                let table = matrix(
                    &first_name,
                    "embeddings",
                    weights.embeddings,
                    config.input_dim,
                    config.output_dim,
                )?;
                (
                    config.input_dim,
                    config.mask_zero,
                    Stage::Sequence(config.output_dim),
                    table,
                )
            }
            Some(_) => {
                return Err(LoadError::Incompatible(
                    "first layer must be an Embedding".to_string(),
                ))
            }
            None => return Err(LoadError::Incompatible("model has no layers".to_string())),
        };

        let mut layers = vec![Layer::Embedding { table }];
        for (pos, spec) in specs {
            let name = spec.display_name(pos);
            stage = match (spec, stage) {
                (LayerSpec::Embedding { .. }, _) => {
                    return Err(shape_err(&name, "only the first layer may be an Embedding"))
                }
                (LayerSpec::Lstm { config, weights }, Stage::Sequence(input)) => {
                    if config.units == 0 {
                        return Err(shape_err(&name, "units must be non-zero"));
                    }
                    let gates = 4 * config.units;
                    layers.push(Layer::Lstm {
                        kernel: matrix(&name, "kernel", weights.kernel, input, gates)?,
                        recurrent: matrix(
                            &name,
                            "recurrent_kernel",
                            weights.recurrent_kernel,
                            config.units,
                            gates,
                        )?,
                        bias: vector(&name, "bias", weights.bias, gates)?,
                        units: config.units,
                        activation: config.activation,
                        recurrent_activation: config.recurrent_activation,
                        return_sequences: config.return_sequences,
                    });
                    if config.return_sequences {
                        Stage::Sequence(config.units)
                    } else {
                        Stage::Vector(config.units)
                    }
                }
                (LayerSpec::GlobalAveragePooling1D { .. }, Stage::Sequence(dim)) => {
                    layers.push(Layer::AveragePool);
                    Stage::Vector(dim)
                }
                // identity at inference
                (LayerSpec::Dropout { .. }, s) => s,
                (LayerSpec::Dense { config, weights }, Stage::Vector(input)) => {
                    if config.units == 0 {
                        return Err(shape_err(&name, "units must be non-zero"));
                    }
                    layers.push(Layer::Dense {
                        kernel: matrix(&name, "kernel", weights.kernel, input, config.units)?,
                        bias: vector(&name, "bias", weights.bias, config.units)?,
                        activation: config.activation,
                    });
                    Stage::Vector(config.units)
                }
                (LayerSpec::Lstm { .. } | LayerSpec::GlobalAveragePooling1D { .. }, _) => {
                    return Err(shape_err(&name, "expects a sequence input"))
                }
                (LayerSpec::Dense { .. }, _) => {
                    return Err(shape_err(&name, "expects a reduced (vector) input"))
                }
            };
        }

        if !matches!(stage, Stage::Vector(n) if n > 0) {
            return Err(LoadError::Incompatible(
                "model must end in a vector output".to_string(),
            ));
        }

        Ok(Self {
            layers,
            vocab_size,
            mask_zero,
        })
    }

    /// Rows in the embedding table; every id fed to the model must be below it.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn forward(&self, sequence: &[u32]) -> Result<Array1<f32>, InferenceError> {
        let mut seq = Array2::<f32>::zeros((0, 0));
        let mut mask: Vec<bool> = Vec::new();
        let mut output: Option<Array1<f32>> = None;

        for layer in &self.layers {
            match layer {
                Layer::Embedding { table } => {
                    let mut rows = Vec::with_capacity(sequence.len());
                    for &id in sequence {
                        let index = id as usize;
                        if index >= self.vocab_size {
                            return Err(InferenceError::TokenOutOfRange {
                                index,
                                vocab: self.vocab_size,
                            });
                        }
                        rows.push(index);
                    }
                    seq = table.select(Axis(0), &rows);
                    mask = sequence.iter().map(|&id| !(self.mask_zero && id == 0)).collect();
                }
                Layer::Lstm {
                    kernel,
                    recurrent,
                    bias,
                    units,
                    activation,
                    recurrent_activation,
                    return_sequences,
                } => {
                    let cell = LstmCell {
                        kernel,
                        recurrent,
                        bias,
                        units: *units,
                        activation: *activation,
                        recurrent_activation: *recurrent_activation,
                    };
                    let (steps, last) = cell.run(seq.view(), &mask, *return_sequences);
                    if *return_sequences {
                        seq = steps;
                    } else {
                        output = Some(last);
                    }
                }
                Layer::AveragePool => {
                    output = Some(average_pool(seq.view(), &mask)?);
                }
                Layer::Dense {
                    kernel,
                    bias,
                    activation,
                } => {
                    let input = output
                        .take()
                        .ok_or_else(|| InferenceError::Shape("dense without input".to_string()))?;
                    let mut z = input.dot(kernel) + bias;
                    activate_in_place(*activation, &mut z);
                    output = Some(z);
                }
            }
        }

        output.ok_or(InferenceError::EmptyOutput)
    }
}

impl SentimentModel for SequenceModel {
    fn predict(&self, sequence: &[u32]) -> Result<f32, InferenceError> {
        let out = self.forward(sequence)?;
        let score = *out.get(0).ok_or(InferenceError::EmptyOutput)?;
        if !score.is_finite() {
            return Err(InferenceError::NonFinite(score));
        }
        Ok(score)
    }
}

fn activate(f: Activation, x: f32) -> f32 {
    match f {
        Activation::Linear | Activation::Softmax => x,
        Activation::Relu => x.max(0.0),
        Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        Activation::Tanh => x.tanh(),
    }
}

fn activate_in_place(f: Activation, z: &mut Array1<f32>) {
    if f == Activation::Softmax {
        let max = z.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        z.mapv_inplace(|v| (v - max).exp());
        let sum = z.sum();
        if sum > 0.0 {
            *z /= sum;
        }
    } else {
        z.mapv_inplace(|v| activate(f, v));
    }
}

struct LstmCell<'a> {
    kernel: &'a Array2<f32>,
    recurrent: &'a Array2<f32>,
    bias: &'a Array1<f32>,
    units: usize,
    activation: Activation,
    recurrent_activation: Activation,
}

impl LstmCell<'_> {
    /// Returns per-step outputs (empty unless `return_sequences`) and the final
    /// hidden state. Masked steps carry the previous state forward unchanged.
    fn run(
        &self,
        seq: ArrayView2<f32>,
        mask: &[bool],
        return_sequences: bool,
    ) -> (Array2<f32>, Array1<f32>) {
        let u = self.units;
        let mut h = Array1::<f32>::zeros(u);
        let mut c = Array1::<f32>::zeros(u);
        let steps = if return_sequences { seq.nrows() } else { 0 };
        let mut outputs = Array2::<f32>::zeros((steps, u));

        for (t, (x, &keep)) in seq.outer_iter().zip(mask).enumerate() {
            if keep {
                let z = x.dot(self.kernel) + h.dot(self.recurrent) + self.bias;
                let gate = |k: usize, act: Activation| {
                    z.slice(s![k * u..(k + 1) * u]).mapv(|v| activate(act, v))
                };
                let i = gate(0, self.recurrent_activation);
                let f = gate(1, self.recurrent_activation);
                let g = gate(2, self.activation);
                let o = gate(3, self.recurrent_activation);
                c = &f * &c + &i * &g;
                h = &o * &c.mapv(|v| activate(self.activation, v));
            }
            if return_sequences {
                outputs.row_mut(t).assign(&h);
            }
        }
        (outputs, h)
    }
}

fn average_pool(seq: ArrayView2<f32>, mask: &[bool]) -> Result<Array1<f32>, InferenceError> {
    if seq.nrows() == 0 {
        return Err(InferenceError::Shape("pooling over an empty sequence".to_string()));
    }
    let kept: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(t, &keep)| keep.then_some(t))
        .collect();
    Ok(seq
        .select(Axis(0), &kept)
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(seq.ncols())))
}
