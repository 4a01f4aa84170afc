use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::{relu, softmax},
};

use crate::domain::topology::{LayerSpec, NetworkSpec, Padding, ShapeError, UnitKind};

// Glorot/Xavier uniform for every convolution and the dense head
const GLOROT: Initializer = Initializer::XavierUniform { gain: 1.0 };

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct RetinaNetConfig {
    #[config(default = 5)]
    pub num_classes: usize,
    #[config(default = 256)]
    pub image_size:  usize,
    /// Backend RNG seed set before any weight is drawn
    #[config(default = 0)]
    pub init_seed:   u64,
}

impl RetinaNetConfig {
    pub fn spec(&self) -> NetworkSpec {
        NetworkSpec::retina_resnet(self.image_size, self.num_classes)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<RetinaNet<B>, ShapeError> {
        B::seed(self.init_seed);
        build_network(&self.spec(), device)
    }
}

fn conv<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    padding: PaddingConfig2d,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(padding)
        .with_initializer(GLOROT)
        .init(device)
}

// epsilon 1e-3; a 0.99 moving average is momentum 0.01 in burn terms
fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B, 2> {
    BatchNormConfig::new(channels)
        .with_epsilon(1e-3)
        .with_momentum(0.01)
        .init(device)
}

fn max_pool(size: usize, stride: usize) -> MaxPool2d {
    MaxPool2dConfig::new([size, size]).with_strides([stride, stride]).init()
}

// ─── Stem ─────────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    conv: Conv2d<B>,
    bn:   BatchNorm<B, 2>,
    pool: MaxPool2d,
}

impl<B: Backend> Stem<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = relu(self.bn.forward(x));
        self.pool.forward(x)
    }
}

// ─── Residual units ───────────────────────────────────────────────────────────
/// Learned shortcut of a projection unit: 1x1 conv → 2x2 max-pool → batch norm.
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
    bn:   BatchNorm<B, 2>,
}

impl<B: Backend> Projection<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.pool.forward(self.conv.forward(x)))
    }
}

/// Bottleneck residual unit: relu(main(x) + shortcut(x)).
///
/// Main path: 1x1 → [2x2 max-pool] → BN → ReLU → 3x3 same → BN → ReLU → 1x1 → BN.
/// The pool and the projection shortcut exist only for projection units.
#[derive(Module, Debug)]
pub struct ResidualUnit<B: Backend> {
    conv_a:   Conv2d<B>,
    pool_a:   Option<MaxPool2d>,
    bn_a:     BatchNorm<B, 2>,
    conv_b:   Conv2d<B>,
    bn_b:     BatchNorm<B, 2>,
    conv_c:   Conv2d<B>,
    bn_c:     BatchNorm<B, 2>,
    shortcut: Option<Projection<B>>,
}

impl<B: Backend> ResidualUnit<B> {
    pub fn new(in_channels: usize, filters: [usize; 3], kind: UnitKind, device: &B::Device) -> Self {
        let [f1, f2, f3] = filters;
        let (pool_a, shortcut) = match kind {
            UnitKind::Projection => (
                Some(max_pool(2, 2)),
                Some(Projection {
                    conv: conv([in_channels, f3], 1, 1, PaddingConfig2d::Valid, device),
                    pool: max_pool(2, 2),
                    bn:   batch_norm(f3, device),
                }),
            ),
            UnitKind::Identity => (None, None),
        };

        Self {
            conv_a: conv([in_channels, f1], 1, 1, PaddingConfig2d::Valid, device),
            pool_a,
            bn_a: batch_norm(f1, device),
            conv_b: conv([f1, f2], 3, 1, PaddingConfig2d::Same, device),
            bn_b: batch_norm(f2, device),
            conv_c: conv([f2, f3], 1, 1, PaddingConfig2d::Valid, device),
            bn_c: batch_norm(f3, device),
            shortcut,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = match &self.shortcut {
            Some(projection) => projection.forward(x.clone()),
            None => x.clone(),
        };

        let mut y = self.conv_a.forward(x);
        if let Some(pool) = &self.pool_a {
            y = pool.forward(y);
        }
        let y = relu(self.bn_a.forward(y));
        let y = relu(self.bn_b.forward(self.conv_b.forward(y)));
        let y = self.bn_c.forward(self.conv_c.forward(y));

        relu(y + residual)
    }
}

// ─── RetinaNet ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct RetinaNet<B: Backend> {
    stem:  Stem<B>,
    units: Vec<ResidualUnit<B>>,
    pool:  AdaptiveAvgPool2d,
    head:  Linear<B>,
}

impl<B: Backend> RetinaNet<B> {
    /// images: [batch, 3, H, W] → unnormalised class scores [batch, classes]
    pub fn forward_logits(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.stem.forward(images);
        for unit in &self.units {
            x = unit.forward(x);
        }
        let x = self.pool.forward(x); // [batch, C, 1, 1]
        let [batch, channels, _, _] = x.dims();
        self.head.forward(x.reshape([batch, channels]))
    }

    /// images: [batch, 3, H, W] → class probabilities [batch, classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward_logits(images), 1)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    #[cfg(test)]
    pub(crate) fn head_weights(&self) -> Vec<f32> {
        self.head.weight.val().into_data().to_vec::<f32>().unwrap()
    }
}

// ─── Graph builder ────────────────────────────────────────────────────────────
/// Turn a shape-checked NetworkSpec into Burn modules.
///
/// The layer list must read: stem (zero-pad, conv, batch-norm, relu, max-pool),
/// one or more residual units, then head (global-avg-pool, flatten, dense,
/// softmax). Anything else is `ShapeError::UnsupportedLayout`.
pub fn build_network<B: Backend>(spec: &NetworkSpec, device: &B::Device) -> Result<RetinaNet<B>, ShapeError> {
    let shapes = spec.infer_shapes()?;

    let is_unit = |l: &LayerSpec| matches!(l, LayerSpec::Residual { .. });
    let first = spec
        .layers
        .iter()
        .position(is_unit)
        .ok_or_else(|| ShapeError::UnsupportedLayout("network has no residual units".into()))?;
    let last = spec.layers.iter().rposition(is_unit).unwrap_or(first);

    let stem = build_stem(&spec.layers[..first], spec.input[2], device)?;

    let mut units = Vec::with_capacity(last - first + 1);
    for (layer, shape) in spec.layers[first..=last].iter().zip(&shapes[first..=last]) {
        match layer {
            LayerSpec::Residual { filters, kind, .. } => {
                units.push(ResidualUnit::new(shape.input.channels(), *filters, *kind, device));
            }
            other => {
                return Err(ShapeError::UnsupportedLayout(format!(
                    "'{}' sits between residual units",
                    other.name()
                )));
            }
        }
    }

    let features = shapes[last].output.channels();
    let head = match &spec.layers[last + 1..] {
        [LayerSpec::GlobalAvgPool { .. }, LayerSpec::Flatten { .. }, LayerSpec::Dense { units: classes, .. }, LayerSpec::Softmax { .. }] => {
            LinearConfig::new(features, *classes)
                .with_initializer(GLOROT)
                .init(device)
        }
        _ => {
            return Err(ShapeError::UnsupportedLayout(
                "head must be global-avg-pool, flatten, dense, softmax".into(),
            ));
        }
    };

    tracing::debug!("Built '{}' with {} residual units", spec.name, units.len());

    Ok(RetinaNet {
        stem,
        units,
        pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        head,
    })
}

fn build_stem<B: Backend>(layers: &[LayerSpec], in_channels: usize, device: &B::Device) -> Result<Stem<B>, ShapeError> {
    match layers {
        [LayerSpec::ZeroPad { pad, .. }, LayerSpec::Conv { filters, kernel, stride, padding: Padding::Valid, .. }, LayerSpec::BatchNorm { .. }, LayerSpec::Relu { .. }, LayerSpec::MaxPool { size, stride: pool_stride, .. }] => {
            Ok(Stem {
                // zero padding folds into the convolution's explicit padding
                conv: conv([in_channels, *filters], *kernel, *stride, PaddingConfig2d::Explicit(*pad, *pad), device),
                bn:   batch_norm(*filters, device),
                pool: max_pool(*size, *pool_stride),
            })
        }
        _ => Err(ShapeError::UnsupportedLayout(
            "stem must be zero-pad, valid conv, batch-norm, relu, max-pool".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_is_a_distribution_at_full_size() {
        let device = Default::default();
        let model: RetinaNet<TestBackend> = RetinaNetConfig::new().init(&device).unwrap();

        let input = Tensor::<TestBackend, 4>::random([1, 3, 256, 256], Distribution::Uniform(0.0, 1.0), &device);
        let probs = model.forward(input);
        assert_eq!(probs.dims(), [1, 5]);

        let values: Vec<f32> = probs.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|p| *p >= 0.0));
        let sum: f32 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "sum = {sum}");
    }

    #[test]
    fn test_identity_unit_preserves_shape() {
        let device = Default::default();
        let unit   = ResidualUnit::<TestBackend>::new(256, [64, 64, 256], UnitKind::Identity, &device);
        let x      = Tensor::<TestBackend, 4>::random([2, 256, 7, 7], Distribution::Default, &device);
        assert_eq!(unit.forward(x).dims(), [2, 256, 7, 7]);
    }

    #[test]
    fn test_projection_unit_halves_and_widens() {
        let device = Default::default();
        let unit   = ResidualUnit::<TestBackend>::new(64, [64, 64, 256], UnitKind::Projection, &device);
        let x      = Tensor::<TestBackend, 4>::random([1, 64, 15, 15], Distribution::Default, &device);
        assert_eq!(unit.forward(x).dims(), [1, 256, 7, 7]);
    }

    #[test]
    fn test_small_instance_matches_spec() {
        let device = Default::default();
        let cfg    = RetinaNetConfig::new().with_image_size(64).with_num_classes(2);
        let model: RetinaNet<TestBackend> = cfg.init(&device).unwrap();

        assert_eq!(model.unit_count(), 9);
        assert_eq!(model.num_params(), cfg.spec().trainable_params().unwrap());

        let x = Tensor::<TestBackend, 4>::zeros([3, 3, 64, 64], &device);
        assert_eq!(model.forward(x).dims(), [3, 2]);
    }

    #[test]
    fn test_shape_error_surfaces_at_construction() {
        let device = Default::default();
        let result = RetinaNetConfig::new().with_image_size(32).init::<TestBackend>(&device);
        assert!(matches!(result, Err(ShapeError::SpatialTooSmall { .. })));
    }

    #[test]
    fn test_layout_without_units_is_unsupported() {
        let mut spec = NetworkSpec::retina_resnet(64, 5);
        spec.layers.retain(|l| !matches!(l, LayerSpec::Residual { .. }));
        let result = build_network::<TestBackend>(&spec, &Default::default());
        assert!(matches!(result, Err(ShapeError::UnsupportedLayout(_))));
    }
}
