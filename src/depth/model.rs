//! # DORN 모델
//!
//! 이미지 -> 백본 -> 다중 스케일 문맥 -> 서수 디코더.
//! 파라미터는 백본 그룹(낮은 학습률)과 헤드 그룹(높은 학습률)으로 나뉜다.

use crate::core::error::DornError;
use crate::core::layers::{LayerMut, LayerRef, Layers, Param};
use crate::depth::backbone::ResNetBackbone;
use crate::depth::config::DornConfig;
use crate::depth::context::MultiScaleContext;
use crate::depth::ordinal::{OrdinalOutput, OrdinalRegression};
use anyhow::Result;
use candle_core::{Device, Tensor, Var};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// 헤드 학습률 배율
pub const HEAD_LR_MULT: f64 = 10.0;

/// 옵티마이저에 넘길 학습률 그룹
#[derive(Debug, Clone)]
pub struct ParamGroup {
    pub name: &'static str,
    pub lr: f64,
    pub vars: Vec<Var>,
}

impl ParamGroup {
    pub fn elem_count(&self) -> usize {
        self.vars.iter().map(|v| v.elem_count()).sum()
    }
}

/// `Layers` 구현으로 `parameters()`(전체), `trainable_parameters()`(두 그룹의 합),
/// `set_training()` 을 함께 제공한다.
#[derive(Debug)]
pub struct Dorn {
    config: DornConfig,
    backbone: ResNetBackbone,
    context: MultiScaleContext,
    decoder: OrdinalRegression,
    training: bool,
}

impl Dorn {
    /// 설정 검증 후 `config.seed` 로 시드한 난수로 모든 가중치를 만든다.
    /// 생성 직후는 평가 모드다.
    pub fn new(config: &DornConfig, device: &Device) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let backbone = ResNetBackbone::new(config, &mut rng, device)?;
        let context = MultiScaleContext::new(config, &mut rng, device)?;
        let decoder = OrdinalRegression::new(config.ord_num);

        let model = Self {
            config: config.clone(),
            backbone,
            context,
            decoder,
            training: false,
        };
        log::info!(
            "DORN: input {:?} -> output {:?}, ord_num={}, pretrained={}, freeze_norm={}, params backbone={} head={}",
            config.input_size,
            config.output_size,
            config.ord_num,
            config.pretrained.is_some(),
            config.freeze_norm,
            count(model.backbone.parameters()),
            count(model.context.parameters()),
        );
        Ok(model)
    }

    pub fn config(&self) -> &DornConfig {
        &self.config
    }

    pub fn backbone(&self) -> &ResNetBackbone {
        &self.backbone
    }

    pub fn context(&self) -> &MultiScaleContext {
        &self.context
    }

    pub fn decoder(&self) -> &OrdinalRegression {
        &self.decoder
    }

    /// (N, in_c, H, W) -> decoded (N, 1, oh, ow), probabilities (N, ord_num, oh, ow)
    pub fn forward(&self, xs: &Tensor) -> Result<OrdinalOutput> {
        let (n, c, h, w) = xs.dims4()?;
        let (ih, iw) = self.config.input_size;
        if (c, h, w) != (self.config.input_channels, ih, iw) {
            return Err(DornError::shape("model input", &[n, self.config.input_channels, ih, iw], xs.dims()).into());
        }
        let features = self.backbone.forward(xs)?;
        let logits = self.context.forward(&features)?;
        self.decoder.forward(&logits)
    }

    pub fn train(&mut self) {
        self.set_training(true);
    }

    pub fn eval(&mut self) {
        self.set_training(false);
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// 백본 그룹: requires_grad 가 켜진 백본 파라미터, 선언 순서
    pub fn backbone_parameters(&self) -> impl Iterator<Item = &Param> + '_ {
        self.backbone.trainable_parameters()
    }

    /// 헤드 그룹: 문맥 모듈 (디코더는 파라미터가 없다)
    pub fn head_parameters(&self) -> impl Iterator<Item = &Param> + '_ {
        self.context.trainable_parameters()
    }

    /// 백본 동결 / 해제
    pub fn set_backbone_trainable(&mut self, trainable: bool) {
        self.backbone.set_requires_grad(trainable);
    }

    /// 백본 `base_lr`, 헤드 `HEAD_LR_MULT * base_lr`
    pub fn param_groups(&self, base_lr: f64) -> Vec<ParamGroup> {
        vec![
            ParamGroup {
                name: "backbone",
                lr: base_lr,
                vars: self.backbone_parameters().map(|p| p.var().clone()).collect(),
            },
            ParamGroup {
                name: "head",
                lr: base_lr * HEAD_LR_MULT,
                vars: self.head_parameters().map(|p| p.var().clone()).collect(),
            },
        ]
    }

    /// 학습 가능 여부와 무관한 전체 스칼라 수
    pub fn parameter_count(&self) -> usize {
        count(self.parameters())
    }

    pub fn output_shape(&self, batch: usize) -> ((usize, usize, usize, usize), (usize, usize, usize, usize)) {
        let (h, w) = self.config.output_size;
        ((batch, 1, h, w), (batch, self.config.ord_num, h, w))
    }
}

fn count<'a>(params: impl Iterator<Item = &'a Param>) -> usize {
    params.map(|p| p.elem_count()).sum()
}

impl Layers for Dorn {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        Box::new(self.backbone.layers().chain(self.context.layers()))
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.backbone.visit_layers_mut(f);
        self.context.visit_layers_mut(f);
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        self.visit_layers_mut(&mut |layer| match layer {
            LayerMut::Norm(norm) => norm.set_training(training),
            LayerMut::Dropout(dropout) => dropout.set_training(training),
            _ => {}
        });
    }
}
