//! 이름 있는 학습 파라미터

use crate::core::error::DornError;
use anyhow::Result;
use candle_core::{DType, Device, Tensor, Var};

/// 레이어가 소유하는 가중치/편향.
///
/// `Var`는 내부적으로 공유 저장소를 가리키므로 `set`은 `&self`로 값을 덮어쓴다.
/// 형상은 생성 후 바뀌지 않는다.
#[derive(Debug, Clone)]
pub struct Param {
    name: String,
    var: Var,
    requires_grad: bool,
}

impl Param {
    pub fn zeros(name: impl Into<String>, dims: &[usize], device: &Device) -> Result<Self> {
        let var = Var::zeros(dims, DType::F32, device)?;
        Ok(Self {
            name: name.into(),
            var,
            requires_grad: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var(&self) -> &Var {
        &self.var
    }

    /// 저장된 값 (항상 `Var` 자체)
    pub fn tensor(&self) -> &Tensor {
        self.var.as_tensor()
    }

    /// forward 에 쓰는 값. `requires_grad` 가 꺼져 있으면 그래프에서 떼어낸다.
    pub fn value(&self) -> Tensor {
        if self.requires_grad {
            self.var.as_tensor().clone()
        } else {
            self.var.as_tensor().detach()
        }
    }

    pub fn dims(&self) -> &[usize] {
        self.var.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.var.elem_count()
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    /// 같은 형상의 값으로 덮어쓰기
    pub fn set(&self, values: &Tensor) -> Result<()> {
        if values.dims() != self.dims() {
            return Err(DornError::shape(self.name.clone(), self.dims(), values.dims()).into());
        }
        let values = values.to_dtype(DType::F32)?.to_device(self.var.device())?;
        self.var.set(&values)?;
        Ok(())
    }

    pub fn fill(&self, value: f32) -> Result<()> {
        let values = Tensor::full(value, self.dims(), self.var.device())?;
        self.set(&values)
    }
}
