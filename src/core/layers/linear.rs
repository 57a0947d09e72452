//! 완전연결 레이어

use super::param::Param;
use anyhow::Result;
use candle_core::{Device, Module, Tensor};

#[derive(Debug, Clone)]
pub struct Linear {
    name: String,
    in_features: usize,
    out_features: usize,
    weight: Param,
    bias: Option<Param>,
}

impl Linear {
    pub fn new(
        name: impl Into<String>,
        in_features: usize,
        out_features: usize,
        bias: bool,
        device: &Device,
    ) -> Result<Self> {
        let name = name.into();
        let weight = Param::zeros(format!("{name}.weight"), &[out_features, in_features], device)?;
        let bias = if bias {
            Some(Param::zeros(format!("{name}.bias"), &[out_features], device)?)
        } else {
            None
        };
        Ok(Self {
            name,
            in_features,
            out_features,
            weight,
            bias,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
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

impl Module for Linear {
    /// (N, in) -> (N, out)
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        candle_nn::Linear::new(self.weight.value(), self.bias.as_ref().map(Param::value)).forward(xs)
    }
}

leaf_layer!(Linear, Linear);
