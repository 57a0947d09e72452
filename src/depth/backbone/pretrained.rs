//! torchvision 이름 규칙의 safetensors 가중치 로딩
//!
//! 키 예시: `layer1.0.conv1.weight`, `layer3.2.bn2.running_var`,
//! `layer2.0.downsample.0.weight`. stem 은 새로 만든 구조라서 읽지 않는다.

use crate::core::error::DornError;
use crate::core::layers::{LayerRef, Layers};
use anyhow::{Context, Result};
use candle_core::{safetensors, DType, Device, Tensor, Var};
use std::collections::HashMap;
use std::path::Path;

fn take<'a>(tensors: &'a HashMap<String, Tensor>, key: &str) -> Result<&'a Tensor> {
    tensors
        .get(key)
        .ok_or_else(|| DornError::MissingWeight(key.to_string()).into())
}

fn set_buffer(buffer: &Var, key: &str, values: &Tensor) -> Result<()> {
    if values.dims() != buffer.dims() {
        return Err(DornError::shape(key, buffer.dims(), values.dims()).into());
    }
    buffer.set(&values.to_dtype(DType::F32)?.to_device(buffer.device())?)?;
    Ok(())
}

/// 이미 읽어 둔 텐서 맵에서 레이어 값을 채운다. 채운 텐서 수를 돌려준다.
pub fn load_from_tensors<L: Layers + ?Sized>(layers: &L, tensors: &HashMap<String, Tensor>) -> Result<usize> {
    let mut loaded = 0usize;
    for layer in layers.layers() {
        for param in layer.params() {
            param.set(take(tensors, param.name())?)?;
            loaded += 1;
        }
        if let LayerRef::Norm(norm) = layer {
            let mean_key = format!("{}.running_mean", norm.name());
            let var_key = format!("{}.running_var", norm.name());
            set_buffer(norm.running_mean(), &mean_key, take(tensors, &mean_key)?)?;
            set_buffer(norm.running_var(), &var_key, take(tensors, &var_key)?)?;
            loaded += 2;
        }
    }
    Ok(loaded)
}

/// safetensors 파일에서 `layers` 의 가중치와 BN running 버퍼를 읽는다.
/// 파일에 남는 키(`fc.*`, `conv1.*`, `num_batches_tracked` 등)는 무시한다.
pub fn load_pretrained<L: Layers + ?Sized>(layers: &L, path: &Path, device: &Device) -> Result<usize> {
    let tensors = safetensors::load(path, device)
        .with_context(|| format!("사전학습 가중치 읽기 실패: {}", path.display()))?;
    let loaded = load_from_tensors(layers, &tensors)?;
    log::info!(
        "pretrained: {} tensors loaded from {} ({} in file)",
        loaded,
        path.display(),
        tensors.len()
    );
    Ok(loaded)
}
