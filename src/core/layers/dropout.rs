//! 채널 단위 드롭아웃 (Dropout2d)

use anyhow::{bail, Result};
use candle_core::{Module, Tensor};

/// 학습 모드에서 (N, C) 채널 전체를 확률 `p`로 0으로 만들고 나머지를 `1/(1-p)`로 스케일.
/// 평가 모드에서는 항등 함수. 난수는 candle 기본 RNG를 쓴다.
#[derive(Debug, Clone)]
pub struct Dropout2d {
    name: String,
    p: f32,
    training: bool,
}

impl Dropout2d {
    pub fn new(name: impl Into<String>, p: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            bail!("Dropout probability must be in [0, 1], got {}", p);
        }
        Ok(Self {
            name: name.into(),
            p,
            training: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

impl Module for Dropout2d {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        if !self.training || self.p == 0.0 {
            return Ok(xs.clone());
        }
        if self.p >= 1.0 {
            return xs.zeros_like();
        }
        let (n, c) = (xs.dim(0)?, xs.dim(1)?);
        let mut mask_dims = vec![n, c];
        mask_dims.extend(std::iter::repeat(1).take(xs.rank() - 2));
        let keep = Tensor::rand(0f32, 1f32, mask_dims, xs.device())?
            .ge(self.p)?
            .to_dtype(xs.dtype())?;
        let scale = 1.0 / (1.0 - self.p as f64);
        xs.broadcast_mul(&keep.affine(scale, 0.0)?)
    }
}

leaf_layer!(Dropout2d, Dropout);
