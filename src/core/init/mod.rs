//! # 가중치 초기화
//!
//! 레이어 종류(`LayerKind`)에 따라 규칙을 고른다.
//!
//! | 종류 | xavier | kaiming | msra-normal |
//! |---|---|---|---|
//! | ConvLike | N(0, sqrt(2/(fan_in+fan_out))) | N(0, sqrt(2/fan_in)) | N(0, sqrt(2/(k*k*out))) |
//! | NormLike | weight=1, bias=0 | 〃 | 〃 |
//! | LinearLike | xavier normal | kaiming normal | weight=1 |
//!
//! 편향은 항상 0으로 채운다.

use crate::core::layers::{LayerKind, LayerRef, Layers, Param};
use anyhow::{bail, Result};
use candle_core::Tensor;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitScheme {
    #[serde(rename = "xavier")]
    Xavier,
    #[serde(rename = "kaiming", alias = "msra")]
    Kaiming,
    /// 합성곱은 sqrt(2/n) 정규분포, 선형은 1로 채움
    #[serde(rename = "msra-normal")]
    MsraNormal,
}

impl FromStr for InitScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "xavier" => Ok(InitScheme::Xavier),
            "kaiming" | "msra" => Ok(InitScheme::Kaiming),
            "msra-normal" => Ok(InitScheme::MsraNormal),
            other => bail!("unknown init scheme '{}'", other),
        }
    }
}

impl fmt::Display for InitScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitScheme::Xavier => "xavier",
            InitScheme::Kaiming => "kaiming",
            InitScheme::MsraNormal => "msra-normal",
        };
        f.write_str(name)
    }
}

/// (fan_in, fan_out). 가중치 dims[0], dims[1] 과 나머지 receptive field 크기로 계산
pub fn fans(dims: &[usize]) -> (usize, usize) {
    match dims {
        [] => (1, 1),
        [n] => (*n, *n),
        [d0, d1, rest @ ..] => {
            let receptive: usize = rest.iter().product();
            (d1 * receptive, d0 * receptive)
        }
    }
}

/// Box-Muller 정규분포 샘플
pub fn sample_normal<R: Rng + ?Sized>(rng: &mut R, count: usize, std: f64) -> Vec<f32> {
    let mut out = Vec::with_capacity(count + 1);
    while out.len() < count {
        let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = rng.gen();
        let r = (-2.0 * u1.ln()).sqrt() * std;
        let theta = 2.0 * std::f64::consts::PI * u2;
        out.push((r * theta.cos()) as f32);
        out.push((r * theta.sin()) as f32);
    }
    out.truncate(count);
    out
}

fn fill_normal<R: Rng + ?Sized>(param: &Param, std: f64, rng: &mut R) -> Result<()> {
    let values = sample_normal(rng, param.elem_count(), std);
    let tensor = Tensor::from_vec(values, param.dims(), param.var().device())?;
    param.set(&tensor)
}

fn xavier_std(dims: &[usize]) -> f64 {
    let (fan_in, fan_out) = fans(dims);
    (2.0 / (fan_in + fan_out) as f64).sqrt()
}

fn kaiming_std(dims: &[usize]) -> f64 {
    let (fan_in, _) = fans(dims);
    (2.0 / fan_in as f64).sqrt()
}

/// 한 레이어 초기화
pub fn init_layer<R: Rng + ?Sized>(layer: LayerRef<'_>, scheme: InitScheme, rng: &mut R) -> Result<()> {
    let (Some(kind), Some(weight)) = (layer.kind(), layer.weight()) else {
        return Ok(());
    };
    match kind {
        LayerKind::ConvLike { kernel, out_channels } => {
            let std = match scheme {
                InitScheme::Xavier => xavier_std(weight.dims()),
                InitScheme::Kaiming => kaiming_std(weight.dims()),
                InitScheme::MsraNormal => (2.0 / (kernel * kernel * out_channels) as f64).sqrt(),
            };
            fill_normal(weight, std, rng)?;
        }
        LayerKind::NormLike => weight.fill(1.0)?,
        LayerKind::LinearLike => match scheme {
            InitScheme::Xavier => fill_normal(weight, xavier_std(weight.dims()), rng)?,
            InitScheme::Kaiming => fill_normal(weight, kaiming_std(weight.dims()), rng)?,
            InitScheme::MsraNormal => weight.fill(1.0)?,
        },
    }
    if let Some(bias) = layer.bias() {
        bias.fill(0.0)?;
    }
    Ok(())
}

/// 단일 레이어 또는 레이어 컨테이너 전체를 초기화 (in-place)
pub fn weights_init<L, R>(layers: &L, scheme: InitScheme, rng: &mut R) -> Result<()>
where
    L: Layers + ?Sized,
    R: Rng + ?Sized,
{
    let mut count = 0usize;
    for layer in layers.layers() {
        init_layer(layer, scheme, rng)?;
        count += 1;
    }
    log::trace!("weights_init: {} layers, scheme={}", count, scheme);
    Ok(())
}
