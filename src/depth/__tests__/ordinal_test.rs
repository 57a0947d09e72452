use crate::core::error::DornError;
use crate::depth::ordinal::{ordinal_targets, OrdinalPairs, OrdinalRegression};
use anyhow::Result;
use approx::assert_relative_eq;
use candle_core::{DType, Device, Tensor};

#[test]
fn 짝홀_분리는_전단사() -> Result<()> {
    let device = Device::Cpu;
    let xs = Tensor::arange(0f32, 2.0 * 6.0 * 2.0 * 3.0, &device)?.reshape((2, 6, 2, 3))?;
    let pairs = OrdinalPairs::split(&xs)?;
    assert_eq!(pairs.even.dims(), &[2, 3, 2, 3]);

    // 채널 0, 2, 4 의 첫 원소
    let even_first = pairs.even.narrow(0, 0, 1)?.narrow(2, 0, 1)?.narrow(3, 0, 1)?;
    assert_eq!(even_first.flatten_all()?.to_vec1::<f32>()?, vec![0.0, 12.0, 24.0]);

    let merged = pairs.merge()?;
    assert_eq!(
        merged.flatten_all()?.to_vec1::<f32>()?,
        xs.flatten_all()?.to_vec1::<f32>()?
    );
    Ok(())
}

#[test]
fn 홀수_채널은_에러() -> Result<()> {
    let xs = Tensor::zeros((1, 5, 2, 2), DType::F32, &Device::Cpu)?;
    let err = OrdinalRegression::new(2).forward(&xs).unwrap_err();
    assert_eq!(err.downcast_ref::<DornError>(), Some(&DornError::OddChannelCount(5)));
    assert!(OrdinalPairs::split(&xs).is_err());
    Ok(())
}

#[test]
fn 구간_수_불일치는_에러() -> Result<()> {
    let xs = Tensor::zeros((1, 6, 2, 2), DType::F32, &Device::Cpu)?;
    let err = OrdinalRegression::new(4).forward(&xs).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DornError>(),
        Some(DornError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn 출력_형상과_범위() -> Result<()> {
    let device = Device::Cpu;
    let ord_num = 5;
    let xs = Tensor::randn(0f32, 3f32, (2, 2 * ord_num, 4, 3), &device)?;
    let out = OrdinalRegression::new(ord_num).forward(&xs)?;
    assert_eq!(out.decoded.dims(), &[2, 1, 4, 3]);
    assert_eq!(out.probabilities.dims(), &[2, ord_num, 4, 3]);

    for p in out.probabilities.flatten_all()?.to_vec1::<f32>()? {
        assert!((0.0..=1.0).contains(&p));
    }
    for d in out.decoded.flatten_all()?.to_vec1::<f32>()? {
        assert!(d.is_finite());
        assert!((0.0..=ord_num as f32).contains(&d));
    }
    // decoded = 확률의 채널 합
    let summed = out.probabilities.sum_keepdim(1)?;
    let diff = (summed - &out.decoded)?.abs()?.flatten_all()?.max(0)?.to_scalar::<f32>()?;
    assert!(diff < 1e-5);
    Ok(())
}

#[test]
fn 로짓_차이가_클수록_확률이_1에_가까움() -> Result<()> {
    let device = Device::Cpu;
    // 임계값 0..3 에 대해 초과 로짓만 증가 (미초과 로짓은 clamp 하한)
    let mut values = Vec::new();
    for k in 0..4 {
        values.push(0.0f32);
        values.push(k as f32);
    }
    let xs = Tensor::from_vec(values, (1, 8, 1, 1), &device)?;
    let out = OrdinalRegression::new(4).forward(&xs)?;
    let probs = out.probabilities.flatten_all()?.to_vec1::<f32>()?;

    assert_relative_eq!(probs[0], 0.5, epsilon = 1e-5);
    for w in probs.windows(2) {
        assert!(w[1] > w[0]);
    }
    let expected: f32 = (0..4).map(|k| 1.0 / (1.0 + (-(k as f32 - 1e-8)).exp())).sum();
    assert_relative_eq!(out.decoded.flatten_all()?.to_vec1::<f32>()?[0], expected, epsilon = 1e-4);
    Ok(())
}

#[test]
fn 큰_로짓도_유한() -> Result<()> {
    let xs = Tensor::from_vec(vec![-1e30f32, 1e30, 1e30, -1e30], (1, 4, 1, 1), &Device::Cpu)?;
    let out = OrdinalRegression::new(2).forward(&xs)?;
    let probs = out.probabilities.flatten_all()?.to_vec1::<f32>()?;
    assert!(probs.iter().all(|p| p.is_finite()));
    assert_relative_eq!(probs[0], 1.0, epsilon = 1e-6);
    assert_relative_eq!(probs[1], 0.0, epsilon = 1e-6);
    Ok(())
}

#[test]
fn 목표_인코딩은_순위로_복원() -> Result<()> {
    let device = Device::Cpu;
    let ranks = Tensor::from_vec(vec![0u32, 1, 3, 6], (1, 1, 2, 2), &device)?;
    let targets = ordinal_targets(&ranks, 4)?;
    assert_eq!(targets.dims(), &[1, 4, 2, 2]);
    // 채널 합 = min(rank, ord_num)
    let decoded = targets.sum_keepdim(1)?.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(decoded, vec![0.0, 1.0, 3.0, 4.0]);

    let bad = Tensor::zeros((1, 2, 2, 2), DType::F32, &device)?;
    assert!(ordinal_targets(&bad, 4).is_err());
    Ok(())
}
