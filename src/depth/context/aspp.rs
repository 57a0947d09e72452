//! ASPP 브랜치: conv -> ReLU -> 1x1 conv -> ReLU

use crate::core::layers::{Conv2d, ConvSpec, LayerMut, LayerRef, Layers};
use anyhow::Result;
use candle_core::{Device, Tensor};

#[derive(Debug, Clone)]
pub struct AsppBranch {
    conv: Conv2d,
    proj: Conv2d,
}

impl AsppBranch {
    /// `dilation == None` 이면 1x1, 아니면 3x3 팽창 합성곱 (padding = dilation)
    pub fn new(
        name: &str,
        in_channels: usize,
        width: usize,
        dilation: Option<usize>,
        device: &Device,
    ) -> Result<Self> {
        let spec = match dilation {
            None => ConvSpec::new(in_channels, width, 1),
            Some(d) => ConvSpec::new(in_channels, width, 3).padding(d).dilation(d),
        };
        Ok(Self {
            conv: Conv2d::new(format!("{name}.conv"), spec, device)?,
            proj: Conv2d::new(format!("{name}.proj"), ConvSpec::new(width, width, 1), device)?,
        })
    }

    pub fn dilation(&self) -> usize {
        self.conv.spec().dilation
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(xs.apply(&self.conv)?.relu()?.apply(&self.proj)?.relu()?)
    }
}

impl Layers for AsppBranch {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        Box::new(self.conv.layers().chain(self.proj.layers()))
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.conv.visit_layers_mut(f);
        self.proj.visit_layers_mut(f);
    }
}
