//! # 핵심 구성요소
//!
//! 레이어, 레이어 순회, 가중치 초기화, 에러 타입

pub mod error;
pub mod init;
pub mod layers;

// 주요 타입들 재수출
pub use error::DornError;
pub use init::{weights_init, InitScheme};
pub use layers::{
    BatchNorm2d, Conv2d, ConvSpec, ConvTranspose2d, Dropout2d, LayerKind, LayerMut, LayerRef,
    Layers, Linear, Param,
};
