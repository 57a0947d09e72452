//! 2D 합성곱 / 전치 합성곱

use super::param::Param;
use anyhow::Result;
use candle_core::{Device, Module, Tensor};

/// 합성곱 형상 설정 (정사각형 커널)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSpec {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub bias: bool,
}

impl ConvSpec {
    /// stride 1, padding 0, dilation 1, bias 포함
    pub fn new(in_channels: usize, out_channels: usize, kernel: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel,
            stride: 1,
            padding: 0,
            dilation: 1,
            bias: true,
        }
    }

    pub fn stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// 팽창 합성곱. 같은 해상도를 유지하려면 padding = dilation (3x3 기준)
    pub fn dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn no_bias(mut self) -> Self {
        self.bias = false;
        self
    }

    /// 출력 공간 크기 (floor 규칙)
    pub fn output_len(&self, input_len: usize) -> usize {
        let effective = self.dilation * (self.kernel - 1) + 1;
        (input_len + 2 * self.padding).saturating_sub(effective) / self.stride + 1
    }
}

#[derive(Debug, Clone)]
pub struct Conv2d {
    name: String,
    spec: ConvSpec,
    weight: Param,
    bias: Option<Param>,
}

impl Conv2d {
    /// 0으로 채운 가중치로 생성. 값은 `init::weights_init` 또는 사전학습 로더가 채운다.
    pub fn new(name: impl Into<String>, spec: ConvSpec, device: &Device) -> Result<Self> {
        let name = name.into();
        let weight = Param::zeros(
            format!("{name}.weight"),
            &[spec.out_channels, spec.in_channels, spec.kernel, spec.kernel],
            device,
        )?;
        let bias = if spec.bias {
            Some(Param::zeros(format!("{name}.bias"), &[spec.out_channels], device)?)
        } else {
            None
        };
        Ok(Self {
            name,
            spec,
            weight,
            bias,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &ConvSpec {
        &self.spec
    }

    pub fn weight(&self) -> &Param {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Param> {
        self.bias.as_ref()
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = vec![&mut self.weight];
        params.extend(self.bias.as_mut());
        params
    }
}

impl Module for Conv2d {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let c_in = xs.dim(1)?;
        if c_in != self.spec.in_channels {
            candle_core::bail!(
                "{}: expected {} input channels, got {}",
                self.name,
                self.spec.in_channels,
                c_in
            );
        }
        let config = candle_nn::Conv2dConfig {
            padding: self.spec.padding,
            stride: self.spec.stride,
            dilation: self.spec.dilation,
            ..Default::default()
        };
        candle_nn::Conv2d::new(self.weight.value(), self.bias.as_ref().map(Param::value), config).forward(xs)
    }
}

leaf_layer!(Conv2d, Conv);

/// 전치 합성곱. 가중치 형상은 (in, out, k, k)
#[derive(Debug, Clone)]
pub struct ConvTranspose2d {
    name: String,
    spec: ConvSpec,
    weight: Param,
    bias: Option<Param>,
}

impl ConvTranspose2d {
    pub fn new(name: impl Into<String>, spec: ConvSpec, device: &Device) -> Result<Self> {
        let name = name.into();
        let weight = Param::zeros(
            format!("{name}.weight"),
            &[spec.in_channels, spec.out_channels, spec.kernel, spec.kernel],
            device,
        )?;
        let bias = if spec.bias {
            Some(Param::zeros(format!("{name}.bias"), &[spec.out_channels], device)?)
        } else {
            None
        };
        Ok(Self {
            name,
            spec,
            weight,
            bias,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &ConvSpec {
        &self.spec
    }

    pub fn weight(&self) -> &Param {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Param> {
        self.bias.as_ref()
    }

    /// (H-1)*stride - 2*padding + dilation*(k-1) + 1. 빈 입력은 0
    pub fn output_len(&self, input_len: usize) -> usize {
        if input_len == 0 {
            return 0;
        }
        (input_len.saturating_sub(1) * self.spec.stride + self.spec.dilation * (self.spec.kernel - 1) + 1)
            .saturating_sub(2 * self.spec.padding)
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut Param> {
        let mut params = vec![&mut self.weight];
        params.extend(self.bias.as_mut());
        params
    }
}

impl Module for ConvTranspose2d {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let config = candle_nn::ConvTranspose2dConfig {
            padding: self.spec.padding,
            stride: self.spec.stride,
            dilation: self.spec.dilation,
            ..Default::default()
        };
        candle_nn::ConvTranspose2d::new(self.weight.value(), self.bias.as_ref().map(Param::value), config)
            .forward(xs)
    }
}

leaf_layer!(ConvTranspose2d, ConvTranspose);
