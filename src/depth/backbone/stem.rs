//! 3단 3x3 합성곱 stem (원래 ResNet의 7x7 stem 대체)

use crate::core::layers::{max_pool2d_padded, BatchNorm2d, Conv2d, ConvSpec, LayerMut, LayerRef, Layers};
use anyhow::Result;
use candle_core::{Device, Tensor};

/// conv3x3 -> BN -> ReLU
#[derive(Debug, Clone)]
pub struct StemStage {
    pub conv: Conv2d,
    pub bn: BatchNorm2d,
}

impl StemStage {
    fn new(index: usize, in_c: usize, out_c: usize, stride: usize, device: &Device) -> Result<Self> {
        let spec = ConvSpec::new(in_c, out_c, 3).stride(stride).padding(1).no_bias();
        Ok(Self {
            conv: Conv2d::new(format!("stem.conv1_{index}"), spec, device)?,
            bn: BatchNorm2d::new(format!("stem.bn1_{index}"), out_c, device)?,
        })
    }

    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(xs.apply(&self.conv)?.apply(&self.bn)?.relu()?)
    }
}

impl Layers for StemStage {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        Box::new(self.conv.layers().chain(self.bn.layers()))
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.conv.visit_layers_mut(f);
        self.bn.visit_layers_mut(f);
    }
}

/// in -> c0 (stride 2) -> c1 -> c2, 이어서 3x3/2 max-pool
#[derive(Debug, Clone)]
pub struct Stem {
    stages: Vec<StemStage>,
}

impl Stem {
    pub fn new(in_channels: usize, channels: [usize; 3], device: &Device) -> Result<Self> {
        let stages = vec![
            StemStage::new(1, in_channels, channels[0], 2, device)?,
            StemStage::new(2, channels[0], channels[1], 1, device)?,
            StemStage::new(3, channels[1], channels[2], 1, device)?,
        ];
        Ok(Self { stages })
    }

    pub fn out_channels(&self) -> usize {
        self.stages[2].conv.spec().out_channels
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for stage in &self.stages {
            xs = stage.forward(&xs)?;
        }
        // ReLU 출력이므로 0 패딩 max-pool이 정확하다
        Ok(max_pool2d_padded(&xs, 3, 2, 1)?)
    }
}

impl Layers for Stem {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        self.stages.layers()
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.stages.visit_layers_mut(f)
    }
}
