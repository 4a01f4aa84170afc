// ============================================================
// Layer 3 — Network Topology Description
// ============================================================
// The residual network is described as plain data: an input
// shape followed by an ordered list of LayerSpecs. Shape
// inference walks the list and reports every intermediate
// shape by layer name, so a residual unit whose shortcut does
// not line up with its main path is rejected here, before any
// tensor is allocated.
//
// Shapes use (height, width, channels) ordering.
//
// The graph builder in ml/model.rs consumes a validated spec
// and turns it into Burn modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Filter widths of the three residual stages.
pub const STAGE_FILTERS: [[usize; 3]; 3] = [[64, 64, 256], [128, 128, 512], [256, 256, 1024]];

/// Identity units that follow the projection unit in every stage.
pub const IDENTITY_UNITS_PER_STAGE: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("layer '{layer}': expected {expected} input channels, found {found}")]
    ChannelMismatch {
        layer:    String,
        expected: usize,
        found:    usize,
    },

    #[error("layer '{layer}': spatial size {height}x{width} is smaller than window {window}")]
    SpatialTooSmall {
        layer:  String,
        height: usize,
        width:  usize,
        window: usize,
    },

    #[error("layer '{layer}' needs a feature map input, got a flat vector")]
    ExpectedFeatureMap { layer: String },

    #[error("layer '{layer}' needs a flat vector input, got a feature map")]
    ExpectedVector { layer: String },

    #[error("layer '{layer}': stride must be at least 1")]
    ZeroStride { layer: String },

    #[error("network has no layers")]
    Empty,

    #[error("unsupported layer arrangement: {0}")]
    UnsupportedLayout(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    Valid,
    Same,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// Shortcut is a 1x1 conv + 2x2 max-pool + batch norm; halves the spatial size
    Projection,
    /// Shortcut is the unit's input unchanged
    Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerSpec {
    ZeroPad { name: String, pad: usize },
    Conv {
        name:    String,
        filters: usize,
        kernel:  usize,
        stride:  usize,
        padding: Padding,
    },
    BatchNorm { name: String },
    Relu { name: String },
    MaxPool { name: String, size: usize, stride: usize },
    Residual {
        name:    String,
        filters: [usize; 3],
        kind:    UnitKind,
    },
    GlobalAvgPool { name: String },
    Flatten { name: String },
    Dense { name: String, units: usize },
    Softmax { name: String },
}

impl LayerSpec {
    pub fn name(&self) -> &str {
        match self {
            LayerSpec::ZeroPad { name, .. }
            | LayerSpec::Conv { name, .. }
            | LayerSpec::BatchNorm { name }
            | LayerSpec::Relu { name }
            | LayerSpec::MaxPool { name, .. }
            | LayerSpec::Residual { name, .. }
            | LayerSpec::GlobalAvgPool { name }
            | LayerSpec::Flatten { name }
            | LayerSpec::Dense { name, .. }
            | LayerSpec::Softmax { name } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LayerSpec::ZeroPad { .. } => "ZeroPadding2D",
            LayerSpec::Conv { .. } => "Conv2D",
            LayerSpec::BatchNorm { .. } => "BatchNorm",
            LayerSpec::Relu { .. } => "ReLU",
            LayerSpec::MaxPool { .. } => "MaxPool2D",
            LayerSpec::Residual { kind: UnitKind::Projection, .. } => "ConvResidual",
            LayerSpec::Residual { kind: UnitKind::Identity, .. } => "IdentityResidual",
            LayerSpec::GlobalAvgPool { .. } => "GlobalAvgPool",
            LayerSpec::Flatten { .. } => "Flatten",
            LayerSpec::Dense { .. } => "Dense",
            LayerSpec::Softmax { .. } => "Softmax",
        }
    }
}

// ─── TensorShape ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorShape {
    Map { height: usize, width: usize, channels: usize },
    Vector(usize),
}

impl TensorShape {
    pub fn map(height: usize, width: usize, channels: usize) -> Self {
        TensorShape::Map { height, width, channels }
    }

    /// Channel count of a feature map, or the length of a vector.
    pub fn channels(&self) -> usize {
        match *self {
            TensorShape::Map { channels, .. } => channels,
            TensorShape::Vector(n) => n,
        }
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorShape::Map { height, width, channels } => {
                write!(f, "({height}, {width}, {channels})")
            }
            TensorShape::Vector(n) => write!(f, "({n})"),
        }
    }
}

/// Output shape of one layer, keyed by the layer's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedShape {
    pub name:   String,
    pub kind:   &'static str,
    pub input:  TensorShape,
    pub output: TensorShape,
    pub params: usize,
}

// ─── NetworkSpec ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name:   String,
    /// (height, width, channels)
    pub input:  [usize; 3],
    pub layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    /// The reduced ResNet used for retinopathy grading.
    pub fn retina_resnet(image_size: usize, num_classes: usize) -> Self {
        let mut layers = vec![
            LayerSpec::ZeroPad { name: "zero_pad".into(), pad: 3 },
            LayerSpec::Conv {
                name:    "conv1".into(),
                filters: 64,
                kernel:  7,
                stride:  2,
                padding: Padding::Valid,
            },
            LayerSpec::BatchNorm { name: "bn_conv1".into() },
            LayerSpec::Relu { name: "relu_conv1".into() },
            LayerSpec::MaxPool { name: "pool_conv1".into(), size: 3, stride: 2 },
        ];

        for (i, filters) in STAGE_FILTERS.iter().enumerate() {
            let stage = i + 2;
            layers.push(LayerSpec::Residual {
                name:    format!("res_{stage}_conv"),
                filters: *filters,
                kind:    UnitKind::Projection,
            });
            for unit in 1..=IDENTITY_UNITS_PER_STAGE {
                layers.push(LayerSpec::Residual {
                    name:    format!("res_{stage}_identity_{unit}"),
                    filters: *filters,
                    kind:    UnitKind::Identity,
                });
            }
        }

        layers.extend([
            LayerSpec::GlobalAvgPool { name: "avg_pool".into() },
            LayerSpec::Flatten { name: "flatten".into() },
            LayerSpec::Dense { name: "dense_final".into(), units: num_classes },
            LayerSpec::Softmax { name: "softmax".into() },
        ]);

        Self {
            name: "retina_resnet".into(),
            input: [image_size, image_size, 3],
            layers,
        }
    }

    pub fn input_shape(&self) -> TensorShape {
        TensorShape::map(self.input[0], self.input[1], self.input[2])
    }

    /// Walk the layers and compute every output shape.
    pub fn infer_shapes(&self) -> Result<Vec<NamedShape>, ShapeError> {
        if self.layers.is_empty() {
            return Err(ShapeError::Empty);
        }
        let mut shape = self.input_shape();
        let mut out   = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let output = layer_output(layer, shape)?;
            out.push(NamedShape {
                name:   layer.name().to_string(),
                kind:   layer.kind(),
                input:  shape,
                output,
                params: layer_params(layer, shape),
            });
            shape = output;
        }
        Ok(out)
    }

    /// Trainable parameter count: conv/dense weights + biases, batch norm gamma + beta.
    pub fn trainable_params(&self) -> Result<usize, ShapeError> {
        Ok(self.infer_shapes()?.iter().map(|s| s.params).sum())
    }

    /// Model summary table, one row per layer.
    pub fn summary(&self) -> Result<String, ShapeError> {
        use std::fmt::Write;

        let shapes = self.infer_shapes()?;
        let mut s  = String::new();
        let rule   = "-".repeat(78);
        // Writing into a String cannot fail
        let _ = writeln!(s, "Model: \"{}\"", self.name);
        let _ = writeln!(s, "{rule}");
        let _ = writeln!(s, "{:<24} {:<18} {:<20} {:>12}", "Layer", "Type", "Output shape", "Params");
        let _ = writeln!(s, "{rule}");
        let _ = writeln!(s, "{:<24} {:<18} {:<20} {:>12}", "input", "Input", self.input_shape().to_string(), 0);
        for row in &shapes {
            let _ = writeln!(
                s,
                "{:<24} {:<18} {:<20} {:>12}",
                row.name,
                row.kind,
                row.output.to_string(),
                row.params
            );
        }
        let _ = writeln!(s, "{rule}");
        let _ = writeln!(s, "Trainable params: {}", self.trainable_params()?);
        Ok(s)
    }
}

fn feature_map(layer: &LayerSpec, shape: TensorShape) -> Result<(usize, usize, usize), ShapeError> {
    match shape {
        TensorShape::Map { height, width, channels } => Ok((height, width, channels)),
        TensorShape::Vector(_) => Err(ShapeError::ExpectedFeatureMap {
            layer: layer.name().to_string(),
        }),
    }
}

fn windowed(
    layer: &LayerSpec,
    (h, w): (usize, usize),
    window: usize,
    stride: usize,
) -> Result<(usize, usize), ShapeError> {
    if stride == 0 {
        return Err(ShapeError::ZeroStride { layer: layer.name().to_string() });
    }
    if h < window || w < window {
        return Err(ShapeError::SpatialTooSmall {
            layer:  layer.name().to_string(),
            height: h,
            width:  w,
            window,
        });
    }
    Ok(((h - window) / stride + 1, (w - window) / stride + 1))
}

fn layer_output(layer: &LayerSpec, shape: TensorShape) -> Result<TensorShape, ShapeError> {
    match layer {
        LayerSpec::ZeroPad { pad, .. } => {
            let (h, w, c) = feature_map(layer, shape)?;
            Ok(TensorShape::map(h + 2 * pad, w + 2 * pad, c))
        }
        LayerSpec::Conv { filters, kernel, stride, padding, .. } => {
            let (h, w, _) = feature_map(layer, shape)?;
            let (oh, ow) = match padding {
                Padding::Valid => windowed(layer, (h, w), *kernel, *stride)?,
                Padding::Same => {
                    if *stride == 0 {
                        return Err(ShapeError::ZeroStride { layer: layer.name().to_string() });
                    }
                    (h.div_ceil(*stride), w.div_ceil(*stride))
                }
            };
            Ok(TensorShape::map(oh, ow, *filters))
        }
        LayerSpec::BatchNorm { .. } | LayerSpec::Relu { .. } => {
            feature_map(layer, shape)?;
            Ok(shape)
        }
        LayerSpec::MaxPool { size, stride, .. } => {
            let (h, w, c) = feature_map(layer, shape)?;
            let (oh, ow) = windowed(layer, (h, w), *size, *stride)?;
            Ok(TensorShape::map(oh, ow, c))
        }
        LayerSpec::Residual { filters, kind, .. } => {
            let (h, w, c) = feature_map(layer, shape)?;
            let f3 = filters[2];
            match kind {
                UnitKind::Projection => {
                    let (oh, ow) = windowed(layer, (h, w), 2, 2)?;
                    Ok(TensorShape::map(oh, ow, f3))
                }
                UnitKind::Identity => {
                    if c != f3 {
                        return Err(ShapeError::ChannelMismatch {
                            layer:    layer.name().to_string(),
                            expected: f3,
                            found:    c,
                        });
                    }
                    Ok(shape)
                }
            }
        }
        LayerSpec::GlobalAvgPool { .. } => {
            let (_, _, c) = feature_map(layer, shape)?;
            Ok(TensorShape::Vector(c))
        }
        LayerSpec::Flatten { .. } => match shape {
            TensorShape::Map { height, width, channels } => {
                Ok(TensorShape::Vector(height * width * channels))
            }
            TensorShape::Vector(_) => Ok(shape),
        },
        LayerSpec::Dense { units, .. } => match shape {
            TensorShape::Vector(_) => Ok(TensorShape::Vector(*units)),
            TensorShape::Map { .. } => Err(ShapeError::ExpectedVector {
                layer: layer.name().to_string(),
            }),
        },
        LayerSpec::Softmax { .. } => match shape {
            TensorShape::Vector(_) => Ok(shape),
            TensorShape::Map { .. } => Err(ShapeError::ExpectedVector {
                layer: layer.name().to_string(),
            }),
        },
    }
}

fn conv_params(c_in: usize, c_out: usize, kernel: usize) -> usize {
    kernel * kernel * c_in * c_out + c_out
}

fn layer_params(layer: &LayerSpec, input: TensorShape) -> usize {
    let c_in = input.channels();
    match layer {
        LayerSpec::Conv { filters, kernel, .. } => conv_params(c_in, *filters, *kernel),
        LayerSpec::BatchNorm { .. } => 2 * c_in,
        LayerSpec::Residual { filters: [f1, f2, f3], kind, .. } => {
            let main = conv_params(c_in, *f1, 1)
                + conv_params(*f1, *f2, 3)
                + conv_params(*f2, *f3, 1)
                + 2 * (f1 + f2 + f3);
            match kind {
                UnitKind::Projection => main + conv_params(c_in, *f3, 1) + 2 * f3,
                UnitKind::Identity => main,
            }
        }
        LayerSpec::Dense { units, .. } => c_in * units + units,
        _ => 0,
    }
}
