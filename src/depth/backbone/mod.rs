//! # ResNet 백본
//!
//! 3단 stem 위에 torchvision 배치의 bottleneck stage 네 개를 쌓는다.
//! 생성 순서:
//!
//! 1. torchvision 배치로 stem 과 stage 를 만든다 (stage 1 입력 = `base_width`)
//! 2. 전체를 kaiming 초기화
//! 3. `pretrained` 가 있으면 stage 가중치를 읽는다
//! 4. [`dorn_repairs`] 의 합성곱 교체를 적용한다 (새 kaiming 가중치)
//! 5. `freeze_norm` 이면 모든 BatchNorm2d 를 고정
//!
//! stage 3, 4 의 stride 를 없애서 출력은 입력의 1/8 해상도다.

pub mod bottleneck;
pub mod pretrained;
pub mod stem;

#[cfg(test)]
mod __tests__;

pub use bottleneck::{Bottleneck, ResidualStage, Shortcut};
pub use pretrained::{load_from_tensors, load_pretrained};
pub use stem::{Stem, StemStage};

use crate::core::error::DornError;
use crate::core::init::{weights_init, InitScheme};
use crate::core::layers::{Conv2d, ConvSpec, LayerMut, LayerRef, Layers};
use crate::depth::config::{BackboneConfig, DornConfig, EXPANSION};
use anyhow::Result;
use candle_core::{Device, Tensor};
use rand::Rng;
use std::fmt;

/// 교체할 합성곱 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairSite {
    Conv1,
    Conv2,
    ShortcutConv,
}

impl fmt::Display for RepairSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepairSite::Conv1 => "conv1",
            RepairSite::Conv2 => "conv2",
            RepairSite::ShortcutConv => "downsample.0",
        })
    }
}

/// 사전학습 블록 안의 합성곱 하나를 새 형상으로 바꾸는 명시적 교체
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repair {
    /// 1부터 시작 (`layer1` .. `layer4`)
    pub stage: usize,
    pub block: usize,
    pub site: RepairSite,
    pub spec: ConvSpec,
}

impl Repair {
    pub fn target(&self) -> String {
        format!("layer{}.{}.{}", self.stage, self.block, self.site)
    }
}

/// 3단 stem 출력 폭을 받도록 stage 1 을, 해상도를 유지하도록 stage 3, 4 를 고친다
pub fn dorn_repairs(config: &BackboneConfig) -> Vec<Repair> {
    let s2 = config.stem_out();
    let w = config.base_width;
    let repair = |stage, site, spec| Repair {
        stage,
        block: 0,
        site,
        spec,
    };
    vec![
        repair(1, RepairSite::Conv1, ConvSpec::new(s2, w, 1).no_bias()),
        repair(1, RepairSite::ShortcutConv, ConvSpec::new(s2, w * EXPANSION, 1).no_bias()),
        repair(3, RepairSite::Conv2, ConvSpec::new(4 * w, 4 * w, 3).padding(1).no_bias()),
        repair(3, RepairSite::ShortcutConv, ConvSpec::new(8 * w, 16 * w, 1).no_bias()),
        repair(4, RepairSite::Conv2, ConvSpec::new(8 * w, 8 * w, 3).padding(1).no_bias()),
        repair(4, RepairSite::ShortcutConv, ConvSpec::new(16 * w, 32 * w, 1).no_bias()),
    ]
}

/// torchvision 배치의 stage 네 개 (stride 1, 2, 2, 2)
pub fn build_stages(config: &BackboneConfig, device: &Device) -> Result<Vec<ResidualStage>> {
    let strides = [1, 2, 2, 2];
    let mut in_c = config.base_width;
    let mut stages = Vec::with_capacity(4);
    for (i, (&blocks, &stride)) in config.blocks.iter().zip(strides.iter()).enumerate() {
        let stage = ResidualStage::new(
            format!("layer{}", i + 1),
            in_c,
            config.stage_width(i),
            blocks,
            stride,
            device,
        )?;
        in_c = stage.out_channels();
        stages.push(stage);
    }
    Ok(stages)
}

#[derive(Debug, Clone)]
pub struct ResNetBackbone {
    stem: Stem,
    stages: Vec<ResidualStage>,
}

impl ResNetBackbone {
    pub fn new<R: Rng + ?Sized>(config: &DornConfig, rng: &mut R, device: &Device) -> Result<Self> {
        let bb = &config.backbone;
        let mut backbone = Self {
            stem: Stem::new(config.input_channels, bb.stem_channels, device)?,
            stages: build_stages(bb, device)?,
        };
        weights_init(&backbone, InitScheme::Kaiming, rng)?;

        if let Some(path) = &config.pretrained {
            load_pretrained(backbone.stages.as_slice(), path, device)?;
        }
        for repair in dorn_repairs(bb) {
            backbone.repair_pretrained_submodule(&repair, rng, device)?;
        }
        if config.freeze_norm {
            backbone.freeze_norm();
        }
        log::debug!(
            "backbone: {} stages, blocks={:?}, {} -> {} channels",
            backbone.stages.len(),
            bb.blocks,
            config.input_channels,
            backbone.out_channels()
        );
        Ok(backbone)
    }

    /// 지정한 합성곱을 kaiming 초기화된 새 합성곱으로 바꾼다.
    /// 출력 채널이 다르면 블록의 나머지와 맞지 않으므로 거부한다.
    pub fn repair_pretrained_submodule<R: Rng + ?Sized>(
        &mut self,
        repair: &Repair,
        rng: &mut R,
        device: &Device,
    ) -> Result<()> {
        let target = repair.target();
        let block = repair
            .stage
            .checked_sub(1)
            .and_then(|s| self.stages.get_mut(s))
            .and_then(|stage| stage.blocks.get_mut(repair.block))
            .ok_or_else(|| DornError::InvalidConfig(format!("no block for repair {target}")))?;
        let slot = match repair.site {
            RepairSite::Conv1 => &mut block.conv1,
            RepairSite::Conv2 => &mut block.conv2,
            RepairSite::ShortcutConv => match block.downsample.as_mut() {
                Some(shortcut) => &mut shortcut.conv,
                None => {
                    return Err(DornError::InvalidConfig(format!("{target}: block has no shortcut")).into())
                }
            },
        };
        let old = *slot.spec();
        if old.out_channels != repair.spec.out_channels {
            return Err(DornError::shape(
                format!("{target} out channels"),
                &[old.out_channels],
                &[repair.spec.out_channels],
            )
            .into());
        }
        let conv = Conv2d::new(target.clone(), repair.spec, device)?;
        weights_init(&conv, InitScheme::Kaiming, rng)?;
        *slot = conv;
        log::debug!(
            "repair {}: {}->{} k{} s{} -> {}->{} k{} s{}",
            target,
            old.in_channels,
            old.out_channels,
            old.kernel,
            old.stride,
            repair.spec.in_channels,
            repair.spec.out_channels,
            repair.spec.kernel,
            repair.spec.stride
        );
        Ok(())
    }

    pub fn stem(&self) -> &Stem {
        &self.stem
    }

    pub fn stages(&self) -> &[ResidualStage] {
        &self.stages
    }

    pub fn out_channels(&self) -> usize {
        self.stages.last().map(|s| s.out_channels()).unwrap_or(0)
    }

    /// (N, in, H, W) -> (N, 32w, H/8, W/8)
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = self.stem.forward(xs)?;
        for stage in &self.stages {
            xs = stage.forward(&xs)?;
        }
        Ok(xs)
    }
}

impl Layers for ResNetBackbone {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        Box::new(self.stem.layers().chain(self.stages.layers()))
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.stem.visit_layers_mut(f);
        self.stages.visit_layers_mut(f);
    }
}
