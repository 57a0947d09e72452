use crate::core::error::DornError;
use crate::core::layers::{LayerRef, Layers};
use crate::depth::config::DornConfig;
use crate::depth::context::{AsppBranch, GlobalContextEncoder, MultiScaleContext};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn features(config: &DornConfig, batch: usize) -> Result<Tensor> {
    let (fh, fw) = config.context.feature_size;
    Ok(Tensor::randn(
        0f32,
        1f32,
        (batch, config.backbone.feature_channels(), fh, fw),
        &Device::Cpu,
    )?)
}

fn context(config: &DornConfig) -> Result<MultiScaleContext> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    MultiScaleContext::new(config, &mut rng, &Device::Cpu)
}

#[test]
fn 전역_인코더는_모든_위치에_같은_벡터() -> Result<()> {
    let config = DornConfig::tiny();
    let module = context(&config)?;
    let encoder: &GlobalContextEncoder = module.encoder();

    let out = encoder.forward(&features(&config, 2)?)?;
    let (fh, fw) = config.context.feature_size;
    assert_eq!(out.dims(), &[2, config.context.branch_channels, fh, fw]);

    let first = out.narrow(2, 0, 1)?.narrow(3, 0, 1)?;
    let diff = out.broadcast_sub(&first)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?;
    assert!(diff < 1e-5);
    Ok(())
}

#[test]
fn 전역_인코더는_고정된_특징맵_크기만_받는다() -> Result<()> {
    let config = DornConfig::tiny();
    let module = context(&config)?;
    let wrong = Tensor::zeros((1, config.backbone.feature_channels(), 9, 13), DType::F32, &Device::Cpu)?;
    let err = module.encoder().forward(&wrong).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DornError>(),
        Some(DornError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn aspp_브랜치는_해상도_유지() -> Result<()> {
    let device = Device::Cpu;
    let xs = Tensor::randn(0f32, 1f32, (1, 6, 5, 7), &device)?;
    for dilation in [None, Some(6), Some(12), Some(18)] {
        let branch = AsppBranch::new("aspp", 6, 4, dilation, &device)?;
        assert_eq!(branch.dilation(), dilation.unwrap_or(1));
        let ys = branch.forward(&xs)?;
        assert_eq!(ys.dims(), &[1, 4, 5, 7]);
    }
    Ok(())
}

#[test]
fn 문맥_모듈_출력_형상() -> Result<()> {
    let config = DornConfig::tiny();
    let module = context(&config)?;
    assert_eq!(module.branches().len(), 4);
    assert_eq!(module.out_channels(), config.ordinal_channels());

    let out = module.forward(&features(&config, 2)?)?;
    let (oh, ow) = config.output_size;
    assert_eq!(out.dims(), &[2, 2 * config.ord_num, oh, ow]);
    assert!(out.flatten_all()?.to_vec1::<f32>()?.iter().all(|v| v.is_finite()));
    Ok(())
}

#[test]
fn 평가_모드는_결정적() -> Result<()> {
    let config = DornConfig::tiny();
    let module = context(&config)?;
    let xs = features(&config, 1)?;
    let a = module.forward(&xs)?.flatten_all()?.to_vec1::<f32>()?;
    let b = module.forward(&xs)?.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn 헤드_초기화와_순서() -> Result<()> {
    let config = DornConfig::tiny();
    let module = context(&config)?;
    let names: Vec<&str> = module.layers().map(|l| l.name()).collect();
    assert_eq!(names.first().copied(), Some("encoder.dropout"));
    assert_eq!(names.last().copied(), Some("concat.classifier"));
    assert_eq!(module.layers().filter(|l| matches!(l, LayerRef::Dropout(_))).count(), 3);

    // xavier: 편향 0, 가중치 0 아님
    for layer in module.layers() {
        if let Some(bias) = layer.bias() {
            assert!(bias.tensor().flatten_all()?.to_vec1::<f32>()?.iter().all(|&v| v == 0.0));
        }
        if let Some(weight) = layer.weight() {
            assert!(weight.tensor().flatten_all()?.to_vec1::<f32>()?.iter().any(|&v| v != 0.0));
        }
    }
    Ok(())
}
