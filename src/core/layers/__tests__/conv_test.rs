use crate::core::layers::{Conv2d, ConvSpec, ConvTranspose2d};
use anyhow::Result;
use approx::assert_relative_eq;
use candle_core::{DType, Device, Module, Tensor};

#[test]
fn 합성곱_출력_크기_계산() {
    // 385 -> 193 (stride 2, pad 1)
    assert_eq!(ConvSpec::new(3, 64, 3).stride(2).padding(1).output_len(385), 193);
    // 팽창 합성곱은 padding = dilation 이면 크기 유지
    assert_eq!(ConvSpec::new(8, 8, 3).padding(6).dilation(6).output_len(49), 49);
    assert_eq!(ConvSpec::new(8, 8, 1).output_len(65), 65);
}

#[test]
fn 합성곱_1x1_가중치_적용() -> Result<()> {
    let device = Device::Cpu;
    let conv = Conv2d::new("conv", ConvSpec::new(2, 1, 1), &device)?;
    conv.weight().set(&Tensor::from_vec(vec![2f32, 3.0], (1, 2, 1, 1), &device)?)?;
    conv.bias().expect("bias").fill(0.5)?;

    let xs = Tensor::ones((1, 2, 2, 2), DType::F32, &device)?;
    let ys = conv.forward(&xs)?;
    assert_eq!(ys.dims(), &[1, 1, 2, 2]);
    for v in ys.flatten_all()?.to_vec1::<f32>()? {
        assert_relative_eq!(v, 5.5, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn 이름과_가중치_형상() -> Result<()> {
    let device = Device::Cpu;
    let conv = Conv2d::new("layer1.0.conv2", ConvSpec::new(4, 8, 3).no_bias(), &device)?;
    assert_eq!(conv.weight().name(), "layer1.0.conv2.weight");
    assert_eq!(conv.weight().dims(), &[8, 4, 3, 3]);
    assert!(conv.bias().is_none());
    Ok(())
}

#[test]
fn 입력_채널_불일치는_에러() -> Result<()> {
    let device = Device::Cpu;
    let conv = Conv2d::new("conv", ConvSpec::new(3, 4, 3).padding(1), &device)?;
    let xs = Tensor::zeros((1, 5, 4, 4), DType::F32, &device)?;
    assert!(conv.forward(&xs).is_err());
    Ok(())
}

#[test]
fn 팽창_합성곱은_해상도_유지() -> Result<()> {
    let device = Device::Cpu;
    let conv = Conv2d::new("aspp", ConvSpec::new(2, 3, 3).padding(2).dilation(2), &device)?;
    let xs = Tensor::ones((1, 2, 5, 7), DType::F32, &device)?;
    assert_eq!(conv.forward(&xs)?.dims(), &[1, 3, 5, 7]);
    Ok(())
}

#[test]
fn 전치_합성곱_가중치와_출력_형상() -> Result<()> {
    let device = Device::Cpu;
    let spec = ConvSpec::new(2, 3, 3).stride(2).padding(1);
    let deconv = ConvTranspose2d::new("up", spec, &device)?;
    // (in, out, k, k)
    assert_eq!(deconv.weight().dims(), &[2, 3, 3, 3]);
    assert_eq!(deconv.output_len(3), 5);

    let xs = Tensor::ones((1, 2, 3, 3), DType::F32, &device)?;
    let ys = deconv.forward(&xs)?;
    assert_eq!(ys.dims(), &[1, 3, 5, 5]);
    Ok(())
}

#[test]
fn 빈_입력의_전치_합성곱_출력은_0() -> Result<()> {
    let spec = ConvSpec::new(2, 3, 3).stride(2).padding(1);
    let deconv = ConvTranspose2d::new("up", spec, &Device::Cpu)?;
    assert_eq!(deconv.output_len(0), 0);
    assert_eq!(deconv.output_len(1), 1);
    Ok(())
}

#[test]
fn 합성곱_역전파는_가중치와_편향에_도달() -> Result<()> {
    let device = Device::Cpu;
    let conv = Conv2d::new("conv", ConvSpec::new(2, 4, 3).padding(2).dilation(2), &device)?;
    conv.weight().fill(0.1)?;
    let xs = Tensor::ones((1, 2, 5, 5), DType::F32, &device)?;
    let loss = conv.forward(&xs)?.sum_all()?;
    let grads = loss.backward()?;

    let dw = grads.get(conv.weight().tensor()).expect("weight grad");
    assert_eq!(dw.dims(), conv.weight().dims());
    let db = grads.get(conv.bias().expect("bias").tensor()).expect("bias grad");
    // 편향 기울기 = 출력 화소 수
    for v in db.to_vec1::<f32>()? {
        assert_relative_eq!(v, 25.0, epsilon = 1e-5);
    }
    Ok(())
}
