use crate::core::layers::{norm::BN_EPS, BatchNorm2d};
use anyhow::Result;
use approx::assert_relative_eq;
use candle_core::{Device, Module, Tensor};

fn channel_constant_input(device: &Device) -> Result<Tensor> {
    // 채널 0 = 2.0, 채널 1 = -1.0
    let values: Vec<f32> = (0..2 * 2 * 3 * 3)
        .map(|i| if (i / 9) % 2 == 0 { 2.0 } else { -1.0 })
        .collect();
    Ok(Tensor::from_vec(values, (2, 2, 3, 3), device)?)
}

#[test]
fn 기본값은_평가_모드_항등에_가까움() -> Result<()> {
    let device = Device::Cpu;
    let bn = BatchNorm2d::new("bn", 2, &device)?;
    assert!(!bn.is_training());
    let xs = channel_constant_input(&device)?;
    let ys = bn.forward(&xs)?.flatten_all()?.to_vec1::<f32>()?;
    let scale = 1.0 / (1.0 + BN_EPS as f32).sqrt();
    for (x, y) in xs.flatten_all()?.to_vec1::<f32>()?.into_iter().zip(ys) {
        assert_relative_eq!(y, x * scale, epsilon = 1e-5);
    }
    Ok(())
}

#[test]
fn 학습_모드는_배치_통계와_running_갱신() -> Result<()> {
    let device = Device::Cpu;
    let mut bn = BatchNorm2d::new("bn", 2, &device)?;
    bn.set_training(true);
    let ys = bn.forward(&channel_constant_input(&device)?)?;

    // 채널이 상수이므로 정규화 결과는 0
    for v in ys.flatten_all()?.to_vec1::<f32>()? {
        assert_relative_eq!(v, 0.0, epsilon = 1e-4);
    }
    let mean = bn.running_mean().as_tensor().to_vec1::<f32>()?;
    assert_relative_eq!(mean[0], 0.2, epsilon = 1e-6);
    assert_relative_eq!(mean[1], -0.1, epsilon = 1e-6);
    let var = bn.running_var().as_tensor().to_vec1::<f32>()?;
    assert_relative_eq!(var[0], 0.9, epsilon = 1e-6);
    Ok(())
}

#[test]
fn 고정된_norm은_학습_모드를_무시() -> Result<()> {
    let device = Device::Cpu;
    let mut bn = BatchNorm2d::new("bn", 2, &device)?;
    bn.freeze();
    bn.set_training(true);
    assert!(bn.is_frozen());
    assert!(!bn.is_training());

    bn.forward(&channel_constant_input(&device)?)?;
    assert_eq!(bn.running_mean().as_tensor().to_vec1::<f32>()?, vec![0.0, 0.0]);
    assert_eq!(bn.running_var().as_tensor().to_vec1::<f32>()?, vec![1.0, 1.0]);
    Ok(())
}

#[test]
fn 채널_수_불일치는_에러() -> Result<()> {
    let device = Device::Cpu;
    let bn = BatchNorm2d::new("bn", 3, &device)?;
    assert!(bn.forward(&channel_constant_input(&device)?).is_err());
    Ok(())
}
