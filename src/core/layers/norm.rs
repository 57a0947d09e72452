//! BatchNorm2d — 채널별 정규화 + affine
//!
//! 학습 모드에서는 배치 통계로 정규화하고 running 버퍼를 갱신한다.
//! `freeze()`된 레이어는 주변 모드와 상관없이 항상 running 버퍼를 쓴다.
//! running 버퍼는 그래프에 올리지 않는다.

use super::param::Param;
use anyhow::Result;
use candle_core::{DType, Device, Module, Tensor, Var};

pub const BN_EPS: f64 = 1e-5;
pub const BN_MOMENTUM: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct BatchNorm2d {
    name: String,
    num_features: usize,
    weight: Param,
    bias: Param,
    running_mean: Var,
    running_var: Var,
    eps: f64,
    momentum: f64,
    training: bool,
    frozen: bool,
}

impl BatchNorm2d {
    pub fn new(name: impl Into<String>, num_features: usize, device: &Device) -> Result<Self> {
        let name = name.into();
        let weight = Param::zeros(format!("{name}.weight"), &[num_features], device)?;
        let bias = Param::zeros(format!("{name}.bias"), &[num_features], device)?;
        weight.fill(1.0)?;
        Ok(Self {
            name,
            num_features,
            weight,
            bias,
            running_mean: Var::zeros(num_features, DType::F32, device)?,
            running_var: Var::ones(num_features, DType::F32, device)?,
            eps: BN_EPS,
            momentum: BN_MOMENTUM,
            training: false,
            frozen: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn weight(&self) -> &Param {
        &self.weight
    }

    pub fn bias(&self) -> &Param {
        &self.bias
    }

    pub fn running_mean(&self) -> &Var {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Var {
        &self.running_var
    }

    /// 배치 통계를 쓰는지 여부. 고정된 레이어는 항상 false
    pub fn is_training(&self) -> bool {
        self.training && !self.frozen
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    /// 되돌릴 수 없음
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut Param> {
        vec![&mut self.weight, &mut self.bias]
    }

    fn channel_view(&self, t: &Tensor) -> candle_core::Result<Tensor> {
        t.reshape((1, self.num_features, 1, 1))
    }

    fn update_running_stats(&self, mean: &Tensor, var: &Tensor, count: usize) -> candle_core::Result<()> {
        // running_var는 불편 분산으로 갱신
        let unbiased = if count > 1 {
            var.affine(count as f64 / (count - 1) as f64, 0.0)?
        } else {
            var.clone()
        };
        let m = self.momentum;
        let new_mean = self
            .running_mean
            .affine(1.0 - m, 0.0)?
            .add(&mean.affine(m, 0.0)?)?;
        let new_var = self
            .running_var
            .affine(1.0 - m, 0.0)?
            .add(&unbiased.affine(m, 0.0)?)?;
        self.running_mean.set(&new_mean)?;
        self.running_var.set(&new_var)
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (n, c, h, w) = xs.dims4()?;
        if c != self.num_features {
            candle_core::bail!(
                "{}: expected {} channels, got {}",
                self.name,
                self.num_features,
                c
            );
        }
        let (mean, var) = if self.is_training() {
            let mean = xs.mean_keepdim((0, 2, 3))?;
            let var = xs.broadcast_sub(&mean)?.sqr()?.mean_keepdim((0, 2, 3))?;
            self.update_running_stats(&mean.detach().flatten_all()?, &var.detach().flatten_all()?, n * h * w)?;
            (mean, var)
        } else {
            (
                self.channel_view(&self.running_mean.as_tensor().detach())?,
                self.channel_view(&self.running_var.as_tensor().detach())?,
            )
        };
        let std = var.affine(1.0, self.eps)?.sqrt()?;
        let normed = xs.broadcast_sub(&mean)?.broadcast_div(&std)?;
        normed
            .broadcast_mul(&self.channel_view(&self.weight.value())?)?
            .broadcast_add(&self.channel_view(&self.bias.value())?)
    }
}

leaf_layer!(BatchNorm2d, Norm);
