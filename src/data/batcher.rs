// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait: N RetinaItems in, one
// RetinaBatch out.
//
//   images:  [N, 3, size, size]  float, values in [0, 1]
//   targets: [N]                 int, class index
//
// Every item is already resized to the same square size by
// the preprocessor, so batching is a flat concatenation
// followed by a reshape.

use burn::{data::dataloader::batcher::Batcher, prelude::*};

use crate::data::{dataset::RetinaItem, preprocessor::CHANNELS};

#[derive(Debug, Clone)]
pub struct RetinaBatch<B: Backend> {
    pub images:  Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct RetinaBatcher<B: Backend> {
    pub device:     B::Device,
    pub image_size: usize,
}

impl<B: Backend> RetinaBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<RetinaItem, RetinaBatch<B>> for RetinaBatcher<B> {
    fn batch(&self, items: Vec<RetinaItem>) -> RetinaBatch<B> {
        let batch_size = items.len();
        let side       = self.image_size;

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.iter().copied())
            .collect();

        let labels: Vec<i32> = items.iter().map(|item| item.label as i32).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(pixels, [batch_size, CHANNELS, side, side]),
            &self.device,
        );

        let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        RetinaBatch { images, targets }
    }
}
