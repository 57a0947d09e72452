//! # 장면 이해(다중 스케일 문맥) 모듈
//!
//! 백본 특징맵을 전역 인코더와 ASPP 브랜치 네 개에 동시에 넣고,
//! 채널 방향으로 이어 붙인 뒤 1x1 합성곱 두 번으로 서수 로짓 `2 * ord_num` 채널을 만든다.

pub mod aspp;
pub mod encoder;

#[cfg(test)]
mod __tests__;

pub use aspp::AsppBranch;
pub use encoder::GlobalContextEncoder;

use crate::core::init::weights_init;
use crate::core::layers::{upsample_bilinear2d, Conv2d, ConvSpec, Dropout2d, LayerMut, LayerRef, Layers};
use crate::depth::config::DornConfig;
use anyhow::Result;
use candle_core::{Device, Tensor};
use rand::Rng;

#[derive(Debug, Clone)]
pub struct MultiScaleContext {
    encoder: GlobalContextEncoder,
    branches: Vec<AsppBranch>,
    drop1: Dropout2d,
    fuse: Conv2d,
    drop2: Dropout2d,
    classifier: Conv2d,
    output_size: (usize, usize),
}

impl MultiScaleContext {
    /// 모든 레이어를 `config.head_init` 으로 초기화해서 돌려준다
    pub fn new<R: Rng + ?Sized>(config: &DornConfig, rng: &mut R, device: &Device) -> Result<Self> {
        let ctx = &config.context;
        let in_c = config.backbone.feature_channels();
        let width = ctx.branch_channels;

        let mut branches = vec![AsppBranch::new("aspp1", in_c, width, None, device)?];
        for (i, &d) in ctx.dilations.iter().enumerate() {
            branches.push(AsppBranch::new(&format!("aspp{}", i + 2), in_c, width, Some(d), device)?);
        }
        let fused_in = width * (branches.len() + 1);

        let module = Self {
            encoder: GlobalContextEncoder::new(config, device)?,
            branches,
            drop1: Dropout2d::new("concat.dropout1", ctx.dropout)?,
            fuse: Conv2d::new("concat.fuse", ConvSpec::new(fused_in, ctx.fused_channels, 1), device)?,
            drop2: Dropout2d::new("concat.dropout2", ctx.dropout)?,
            classifier: Conv2d::new(
                "concat.classifier",
                ConvSpec::new(ctx.fused_channels, config.ordinal_channels(), 1),
                device,
            )?,
            output_size: config.output_size,
        };
        weights_init(&module, config.head_init, rng)?;
        Ok(module)
    }

    pub fn encoder(&self) -> &GlobalContextEncoder {
        &self.encoder
    }

    pub fn branches(&self) -> &[AsppBranch] {
        &self.branches
    }

    pub fn out_channels(&self) -> usize {
        self.classifier.spec().out_channels
    }

    /// (N, C_feat, fh, fw) -> (N, 2 * ord_num, out_h, out_w)
    pub fn forward(&self, features: &Tensor) -> Result<Tensor> {
        let mut parts = Vec::with_capacity(self.branches.len() + 1);
        parts.push(self.encoder.forward(features)?);
        for branch in &self.branches {
            parts.push(branch.forward(features)?);
        }
        let xs = Tensor::cat(&parts, 1)?
            .apply(&self.drop1)?
            .apply(&self.fuse)?
            .relu()?
            .apply(&self.drop2)?
            .apply(&self.classifier)?;
        Ok(upsample_bilinear2d(&xs, self.output_size.0, self.output_size.1)?)
    }
}

impl Layers for MultiScaleContext {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        Box::new(
            self.encoder
                .layers()
                .chain(self.branches.layers())
                .chain(self.drop1.layers())
                .chain(self.fuse.layers())
                .chain(self.drop2.layers())
                .chain(self.classifier.layers()),
        )
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.encoder.visit_layers_mut(f);
        self.branches.visit_layers_mut(f);
        self.drop1.visit_layers_mut(f);
        self.fuse.visit_layers_mut(f);
        self.drop2.visit_layers_mut(f);
        self.classifier.visit_layers_mut(f);
    }
}
