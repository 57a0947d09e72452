//! # 서수 회귀 디코더
//!
//! 채널 `2k`, `2k+1` 을 임계값 k 의 (미초과, 초과) 로짓 쌍으로 보고
//! 2-way softmax 의 "초과" 확률을 모두 더해 서수 순위를 얻는다.

use crate::core::error::DornError;
use anyhow::Result;
use candle_core::{DType, Tensor};

/// softmax 전에 값을 가두는 범위
pub const CLAMP_MIN: f32 = 1e-8;
pub const CLAMP_MAX: f32 = 1e8;

/// 채널 짝/홀 분리 결과. 각 (N, ord_num, H, W)
#[derive(Debug, Clone)]
pub struct OrdinalPairs {
    pub even: Tensor,
    pub odd: Tensor,
}

impl OrdinalPairs {
    pub fn split(xs: &Tensor) -> Result<Self> {
        let (_, c, _, _) = xs.dims4()?;
        if c % 2 != 0 {
            return Err(DornError::OddChannelCount(c).into());
        }
        let device = xs.device();
        let even: Vec<u32> = (0..c as u32).step_by(2).collect();
        let odd: Vec<u32> = (1..c as u32).step_by(2).collect();
        let k = even.len();
        Ok(Self {
            even: xs.index_select(&Tensor::from_vec(even, k, device)?, 1)?,
            odd: xs.index_select(&Tensor::from_vec(odd, k, device)?, 1)?,
        })
    }

    /// `split` 의 역. 짝수 위치에 even, 홀수 위치에 odd
    pub fn merge(&self) -> Result<Tensor> {
        let (n, k, h, w) = self.even.dims4()?;
        if self.odd.dims() != self.even.dims() {
            return Err(DornError::shape("ordinal odd group", self.even.dims(), self.odd.dims()).into());
        }
        Ok(Tensor::stack(&[&self.even, &self.odd], 2)?.reshape((n, 2 * k, h, w))?)
    }
}

#[derive(Debug, Clone)]
pub struct OrdinalOutput {
    /// (N, 1, H, W), 값 범위 [0, ord_num]
    pub decoded: Tensor,
    /// (N, ord_num, H, W), 임계값별 초과 확률
    pub probabilities: Tensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdinalRegression {
    ord_num: usize,
}

impl OrdinalRegression {
    pub fn new(ord_num: usize) -> Self {
        Self { ord_num }
    }

    pub fn ord_num(&self) -> usize {
        self.ord_num
    }

    pub fn forward(&self, xs: &Tensor) -> Result<OrdinalOutput> {
        let (n, c, h, w) = xs.dims4()?;
        if c % 2 != 0 {
            return Err(DornError::OddChannelCount(c).into());
        }
        if c != 2 * self.ord_num {
            return Err(DornError::shape("ordinal channels", &[2 * self.ord_num], &[c]).into());
        }
        let k = self.ord_num;
        let pairs = OrdinalPairs::split(xs)?;
        let a = pairs.even.reshape((n, 1, k * h * w))?;
        let b = pairs.odd.reshape((n, 1, k * h * w))?;
        let logits = Tensor::cat(&[&a, &b], 1)?.clamp(CLAMP_MIN, CLAMP_MAX)?;
        let prob = candle_nn::ops::softmax(&logits, 1)?;
        let probabilities = prob.narrow(1, 1, 1)?.reshape((n, k, h, w))?;
        let decoded = probabilities.sum_keepdim(1)?;
        Ok(OrdinalOutput {
            decoded,
            probabilities,
        })
    }
}

/// 정수 순위 맵 (N, 1, H, W) -> 이진 목표 (N, ord_num, H, W).
/// 임계값 k 는 `k < rank` 일 때 1. 채널 합이 `min(rank, ord_num)` 이 된다.
pub fn ordinal_targets(labels: &Tensor, ord_num: usize) -> Result<Tensor> {
    let (n, c, h, w) = labels.dims4()?;
    if c != 1 {
        return Err(DornError::shape("ordinal labels", &[n, 1, h, w], labels.dims()).into());
    }
    let thresholds: Vec<f32> = (0..ord_num).map(|k| k as f32).collect();
    let thresholds = Tensor::from_vec(thresholds, (1, ord_num, 1, 1), labels.device())?;
    let ranks = labels.to_dtype(DType::F32)?;
    Ok(ranks.broadcast_gt(&thresholds)?.to_dtype(DType::F32)?)
}
