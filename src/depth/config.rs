//! # DORN 구성 설정
//!
//! 풀링 커널, flatten 길이, 업샘플 목표 크기는 데이터셋 입력 해상도에 묶인 상수다.
//! 런타임에 입력 형상에서 유도하지 않고 여기서 명시적으로 설정한다.
//! `validate()`는 상수들이 서로 맞는지만 확인한다.

use crate::core::layers::ConvSpec;
use crate::core::{DornError, InitScheme};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// bottleneck 확장 비율 (ResNet v1.5)
pub const EXPANSION: usize = 4;

/// 백본 설정. 기본값은 ResNet-101
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackboneConfig {
    /// 3단 stem 출력 채널 (기본 64, 64, 128)
    pub stem_channels: [usize; 3],
    /// 첫 stage bottleneck 폭. stage i 는 base_width * 2^i
    pub base_width: usize,
    /// stage 별 블록 수
    pub blocks: [usize; 4],
}

impl Default for BackboneConfig {
    fn default() -> Self {
        Self {
            stem_channels: [64, 64, 128],
            base_width: 64,
            blocks: [3, 4, 23, 3],
        }
    }
}

impl BackboneConfig {
    pub fn stem_out(&self) -> usize {
        self.stem_channels[2]
    }

    pub fn stage_width(&self, stage: usize) -> usize {
        self.base_width << stage
    }

    /// 백본 출력 채널 (기본 2048)
    pub fn feature_channels(&self) -> usize {
        self.stage_width(3) * EXPANSION
    }
}

/// 장면 이해 모듈 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// 백본 출력 공간 크기 (H, W)
    pub feature_size: (usize, usize),
    pub pool_kernel: usize,
    pub pool_stride: usize,
    pub pool_padding: usize,
    /// 전역 평균 풀링 후 격자 크기. Linear 입력 = feature_channels * ph * pw
    pub pooled_size: (usize, usize),
    pub branch_channels: usize,
    pub fused_channels: usize,
    /// ASPP 팽창률 (1x1 브랜치 제외)
    pub dilations: [usize; 3],
    pub dropout: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        // KITTI 385x513 입력 기준
        Self {
            feature_size: (49, 65),
            pool_kernel: 16,
            pool_stride: 16,
            pool_padding: 8,
            pooled_size: (4, 5),
            branch_channels: 512,
            fused_channels: 2048,
            dilations: [6, 12, 18],
            dropout: 0.5,
        }
    }
}

impl ContextConfig {
    pub fn pooled_len(&self, feature_channels: usize) -> usize {
        feature_channels * self.pooled_size.0 * self.pooled_size.1
    }
}

/// 모델 생성 파라미터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DornConfig {
    pub input_channels: usize,
    /// 입력 이미지 크기 (H, W)
    pub input_size: (usize, usize),
    /// 최종 출력 크기 (H, W)
    pub output_size: (usize, usize),
    /// SID 구간 수. 출력 채널 = 2 * ord_num
    pub ord_num: usize,
    /// torchvision 이름 규칙의 safetensors 파일
    #[serde(default)]
    pub pretrained: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub freeze_norm: bool,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_head_init")]
    pub head_init: InitScheme,
    #[serde(default)]
    pub backbone: BackboneConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

fn default_true() -> bool {
    true
}

fn default_head_init() -> InitScheme {
    InitScheme::Xavier
}

impl Default for DornConfig {
    fn default() -> Self {
        Self::kitti()
    }
}

impl DornConfig {
    /// KITTI: 385x513 입력, 49x65 특징맵, 4x5 풀링 격자, 142 채널
    pub fn kitti() -> Self {
        Self {
            input_channels: 3,
            input_size: (385, 513),
            output_size: (385, 513),
            ord_num: 71,
            pretrained: None,
            freeze_norm: true,
            seed: 0,
            head_init: InitScheme::Xavier,
            backbone: BackboneConfig::default(),
            context: ContextConfig::default(),
        }
    }

    /// NYU Depth v2: 257x353 입력, 33x45 특징맵, 3x3 풀링 격자, 136 채널
    pub fn nyu() -> Self {
        Self {
            input_size: (257, 353),
            output_size: (257, 353),
            ord_num: 68,
            context: ContextConfig {
                feature_size: (33, 45),
                pooled_size: (3, 3),
                ..ContextConfig::default()
            },
            ..Self::kitti()
        }
    }

    /// 구조는 같고 폭만 줄인 설정 (스모크 테스트용)
    pub fn tiny() -> Self {
        Self {
            input_channels: 3,
            input_size: (33, 49),
            output_size: (33, 49),
            ord_num: 4,
            pretrained: None,
            freeze_norm: true,
            seed: 7,
            head_init: InitScheme::Xavier,
            backbone: BackboneConfig {
                stem_channels: [4, 4, 8],
                base_width: 2,
                blocks: [1, 1, 1, 1],
            },
            context: ContextConfig {
                feature_size: (5, 7),
                pool_kernel: 4,
                pool_stride: 4,
                pool_padding: 2,
                pooled_size: (2, 2),
                branch_channels: 8,
                fused_channels: 16,
                dilations: [6, 12, 18],
                dropout: 0.5,
            },
        }
    }

    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "kitti" => Ok(Self::kitti()),
            "nyu" => Ok(Self::nyu()),
            "tiny" => Ok(Self::tiny()),
            other => Err(DornError::InvalidConfig(format!("unknown preset '{}'", other)).into()),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("설정 파일 읽기 실패: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("설정 파싱 실패: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 서수 출력 채널 수 C
    pub fn ordinal_channels(&self) -> usize {
        2 * self.ord_num
    }

    /// 입력 크기에 백본 stride를 적용한 특징맵 크기
    /// (stem stride 2, max-pool stride 2, stage 2 stride 2)
    pub fn expected_feature_size(&self) -> (usize, usize) {
        // stem, max-pool, stage 2 모두 3x3 / stride 2 / padding 1 창이다
        let down = ConvSpec::new(1, 1, 3).stride(2).padding(1);
        let f = |len: usize| down.output_len(down.output_len(down.output_len(len)));
        (f(self.input_size.0), f(self.input_size.1))
    }

    pub fn expected_pooled_size(&self) -> (usize, usize) {
        let c = &self.context;
        let f = |len: usize| (len + 2 * c.pool_padding).saturating_sub(c.pool_kernel) / c.pool_stride + 1;
        (f(c.feature_size.0), f(c.feature_size.1))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(DornError::InvalidConfig(msg).into()) };

        if self.input_channels == 0 {
            return invalid("input_channels must be positive".into());
        }
        if self.ord_num == 0 {
            return invalid("ord_num must be positive".into());
        }
        let sizes = [
            ("input_size", self.input_size),
            ("output_size", self.output_size),
            ("feature_size", self.context.feature_size),
            ("pooled_size", self.context.pooled_size),
        ];
        for (what, (h, w)) in sizes {
            if h == 0 || w == 0 {
                return invalid(format!("{what} must be non-zero, got {h}x{w}"));
            }
        }
        if self.backbone.base_width == 0 || self.backbone.stem_channels.contains(&0) {
            return invalid("backbone widths must be positive".into());
        }
        if self.backbone.blocks.contains(&0) {
            return invalid("every backbone stage needs at least one block".into());
        }
        let c = &self.context;
        if c.pool_kernel == 0 || c.pool_stride == 0 || c.branch_channels == 0 || c.fused_channels == 0 {
            return invalid("context kernel, stride and widths must be positive".into());
        }
        if 2 * c.pool_padding > c.pool_kernel {
            return invalid(format!(
                "pool padding {} must be at most half the kernel {}",
                c.pool_padding, c.pool_kernel
            ));
        }
        if !(0.0..1.0).contains(&c.dropout) {
            return invalid(format!("dropout must be in [0, 1), got {}", c.dropout));
        }
        let feature = self.expected_feature_size();
        if feature != c.feature_size {
            return invalid(format!(
                "feature_size {:?} does not match input_size {:?} (expected {:?})",
                c.feature_size, self.input_size, feature
            ));
        }
        let pooled = self.expected_pooled_size();
        if pooled != c.pooled_size {
            return invalid(format!(
                "pooled_size {:?} does not match pooling of {:?} (expected {:?})",
                c.pooled_size, c.feature_size, pooled
            ));
        }
        Ok(())
    }
}
