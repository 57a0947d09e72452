//! 전역 문맥 인코더: 특징맵 전체를 벡터 하나로 요약해 모든 위치에 다시 뿌린다

use crate::core::error::DornError;
use crate::core::layers::{
    avg_pool2d_padded, upsample_bilinear2d, Conv2d, ConvSpec, Dropout2d, LayerMut, LayerRef, Layers, Linear,
};
use crate::depth::config::DornConfig;
use anyhow::Result;
use candle_core::{Device, Tensor};

#[derive(Debug, Clone)]
pub struct GlobalContextEncoder {
    in_channels: usize,
    feature_size: (usize, usize),
    pool_kernel: usize,
    pool_stride: usize,
    pool_padding: usize,
    pooled_size: (usize, usize),
    dropout: Dropout2d,
    global_fc: Linear,
    conv1: Conv2d,
}

impl GlobalContextEncoder {
    pub fn new(config: &DornConfig, device: &Device) -> Result<Self> {
        let ctx = &config.context;
        let in_channels = config.backbone.feature_channels();
        let width = ctx.branch_channels;
        Ok(Self {
            in_channels,
            feature_size: ctx.feature_size,
            pool_kernel: ctx.pool_kernel,
            pool_stride: ctx.pool_stride,
            pool_padding: ctx.pool_padding,
            pooled_size: ctx.pooled_size,
            dropout: Dropout2d::new("encoder.dropout", ctx.dropout)?,
            global_fc: Linear::new("encoder.global_fc", ctx.pooled_len(in_channels), width, true, device)?,
            conv1: Conv2d::new("encoder.conv1", ConvSpec::new(width, width, 1), device)?,
        })
    }

    pub fn out_channels(&self) -> usize {
        self.conv1.spec().out_channels
    }

    /// (N, C, fh, fw) -> (N, width, fh, fw)
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (n, c, h, w) = xs.dims4()?;
        let expected = [self.in_channels, self.feature_size.0, self.feature_size.1];
        if [c, h, w] != expected {
            return Err(DornError::shape("encoder input", &expected, &[c, h, w]).into());
        }
        let pooled = avg_pool2d_padded(xs, self.pool_kernel, self.pool_stride, self.pool_padding)?;
        let (_, _, ph, pw) = pooled.dims4()?;
        if (ph, pw) != self.pooled_size {
            return Err(DornError::shape(
                "encoder pooled grid",
                &[self.pooled_size.0, self.pooled_size.1],
                &[ph, pw],
            )
            .into());
        }
        let flat = pooled.apply(&self.dropout)?.flatten_from(1)?;
        let global = flat.apply(&self.global_fc)?.relu()?;
        let global = global
            .reshape((n, self.global_fc.out_features(), 1, 1))?
            .apply(&self.conv1)?;
        Ok(upsample_bilinear2d(&global, self.feature_size.0, self.feature_size.1)?)
    }
}

impl Layers for GlobalContextEncoder {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        Box::new(
            self.dropout
                .layers()
                .chain(self.global_fc.layers())
                .chain(self.conv1.layers()),
        )
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.dropout.visit_layers_mut(f);
        self.global_fc.visit_layers_mut(f);
        self.conv1.visit_layers_mut(f);
    }
}
