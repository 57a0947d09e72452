//! DORN (Deep Ordinal Regression Network) 단안 깊이 추정 라이브러리
//!
//! candle 위에서 ResNet 백본, 다중 스케일 문맥 모듈, 서수 회귀 디코더를 구성한다.

pub mod core;
pub mod depth;

pub use crate::core::{weights_init, DornError, InitScheme, Layers, Param};
pub use crate::depth::{
    ordinal_targets, Dorn, DornConfig, OrdinalOutput, OrdinalRegression, ParamGroup, HEAD_LR_MULT,
};
