//! ResNet v1.5 bottleneck 블록 (stride는 3x3 합성곱에 둔다)

use crate::core::layers::{BatchNorm2d, Conv2d, ConvSpec, LayerMut, LayerRef, Layers};
use crate::depth::config::EXPANSION;
use anyhow::Result;
use candle_core::{Device, Tensor};

/// 1x1 projection + BN (`downsample.0`, `downsample.1`)
#[derive(Debug, Clone)]
pub struct Shortcut {
    pub conv: Conv2d,
    pub bn: BatchNorm2d,
}

impl Layers for Shortcut {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        Box::new(self.conv.layers().chain(self.bn.layers()))
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.conv.visit_layers_mut(f);
        self.bn.visit_layers_mut(f);
    }
}

#[derive(Debug, Clone)]
pub struct Bottleneck {
    pub conv1: Conv2d,
    pub bn1: BatchNorm2d,
    pub conv2: Conv2d,
    pub bn2: BatchNorm2d,
    pub conv3: Conv2d,
    pub bn3: BatchNorm2d,
    pub downsample: Option<Shortcut>,
}

impl Bottleneck {
    /// `prefix` 는 torchvision 경로 (예: `layer3.0`)
    pub fn new(prefix: &str, in_channels: usize, width: usize, stride: usize, device: &Device) -> Result<Self> {
        let out_channels = width * EXPANSION;
        let conv = |name: &str, spec: ConvSpec| Conv2d::new(format!("{prefix}.{name}"), spec, device);
        let bn = |name: &str, c: usize| BatchNorm2d::new(format!("{prefix}.{name}"), c, device);

        let downsample = if stride != 1 || in_channels != out_channels {
            Some(Shortcut {
                conv: conv("downsample.0", ConvSpec::new(in_channels, out_channels, 1).stride(stride).no_bias())?,
                bn: bn("downsample.1", out_channels)?,
            })
        } else {
            None
        };

        Ok(Self {
            conv1: conv("conv1", ConvSpec::new(in_channels, width, 1).no_bias())?,
            bn1: bn("bn1", width)?,
            conv2: conv("conv2", ConvSpec::new(width, width, 3).stride(stride).padding(1).no_bias())?,
            bn2: bn("bn2", width)?,
            conv3: conv("conv3", ConvSpec::new(width, out_channels, 1).no_bias())?,
            bn3: bn("bn3", out_channels)?,
            downsample,
        })
    }

    pub fn in_channels(&self) -> usize {
        self.conv1.spec().in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.conv3.spec().out_channels
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let out = xs.apply(&self.conv1)?.apply(&self.bn1)?.relu()?;
        let out = out.apply(&self.conv2)?.apply(&self.bn2)?.relu()?;
        let out = out.apply(&self.conv3)?.apply(&self.bn3)?;
        let identity = match &self.downsample {
            Some(shortcut) => xs.apply(&shortcut.conv)?.apply(&shortcut.bn)?,
            None => xs.clone(),
        };
        Ok((out + identity)?.relu()?)
    }
}

impl Layers for Bottleneck {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        Box::new(
            self.conv1
                .layers()
                .chain(self.bn1.layers())
                .chain(self.conv2.layers())
                .chain(self.bn2.layers())
                .chain(self.conv3.layers())
                .chain(self.bn3.layers())
                .chain(self.downsample.layers()),
        )
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.conv1.visit_layers_mut(f);
        self.bn1.visit_layers_mut(f);
        self.conv2.visit_layers_mut(f);
        self.bn2.visit_layers_mut(f);
        self.conv3.visit_layers_mut(f);
        self.bn3.visit_layers_mut(f);
        self.downsample.visit_layers_mut(f);
    }
}

/// 같은 폭의 bottleneck 블록 묶음 (`layer1` .. `layer4`)
#[derive(Debug, Clone)]
pub struct ResidualStage {
    name: String,
    pub blocks: Vec<Bottleneck>,
}

impl ResidualStage {
    /// 첫 블록만 stride / projection 을 가진다
    pub fn new(
        name: impl Into<String>,
        in_channels: usize,
        width: usize,
        num_blocks: usize,
        stride: usize,
        device: &Device,
    ) -> Result<Self> {
        let name = name.into();
        let mut blocks = Vec::with_capacity(num_blocks);
        let mut in_c = in_channels;
        for i in 0..num_blocks {
            let s = if i == 0 { stride } else { 1 };
            let block = Bottleneck::new(&format!("{name}.{i}"), in_c, width, s, device)?;
            in_c = block.out_channels();
            blocks.push(block);
        }
        Ok(Self { name, blocks })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn out_channels(&self) -> usize {
        self.blocks.last().map(|b| b.out_channels()).unwrap_or(0)
    }

    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }
        Ok(xs)
    }
}

impl Layers for ResidualStage {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        self.blocks.layers()
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.blocks.visit_layers_mut(f)
    }
}
