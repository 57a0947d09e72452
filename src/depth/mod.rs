//! # 단안 깊이 추정 네트워크 (DORN)

pub mod backbone;
pub mod config;
pub mod context;
pub mod model;
pub mod ordinal;

#[cfg(test)]
mod __tests__;

pub use backbone::{dorn_repairs, Repair, RepairSite, ResNetBackbone};
pub use config::{BackboneConfig, ContextConfig, DornConfig};
pub use context::{AsppBranch, GlobalContextEncoder, MultiScaleContext};
pub use model::{Dorn, ParamGroup, HEAD_LR_MULT};
pub use ordinal::{ordinal_targets, OrdinalOutput, OrdinalPairs, OrdinalRegression};
