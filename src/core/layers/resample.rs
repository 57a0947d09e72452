//! 풀링 / 쌍선형 업샘플링

use candle_core::{Result, Tensor};

fn pad_spatial(xs: &Tensor, padding: usize) -> Result<Tensor> {
    if padding == 0 {
        return Ok(xs.clone());
    }
    xs.pad_with_zeros(2, padding, padding)?
        .pad_with_zeros(3, padding, padding)
}

/// `kernel x kernel` 창의 각 위치를 stride 간격으로 뽑은 탭들을 `combine` 으로 접는다.
/// candle 풀링은 kernel == stride 일 때만 역전파되므로 그 외에는 이 경로를 쓴다.
fn fold_strided_taps<F>(xs: &Tensor, kernel: usize, stride: usize, combine: F) -> Result<Tensor>
where
    F: Fn(Tensor, Tensor) -> Result<Tensor>,
{
    let (_, _, h, w) = xs.dims4()?;
    if kernel == 0 || stride == 0 || h < kernel || w < kernel {
        candle_core::bail!("pool {kernel}/{stride} does not fit a {h}x{w} map");
    }
    let (oh, ow) = ((h - kernel) / stride + 1, (w - kernel) / stride + 1);
    let device = xs.device();
    let taps = |offset: usize, len: usize| -> Result<Tensor> {
        let ids: Vec<u32> = (0..len).map(|i| (offset + i * stride) as u32).collect();
        Tensor::from_vec(ids, len, device)
    };
    let col_ids = (0..kernel).map(|dj| taps(dj, ow)).collect::<Result<Vec<_>>>()?;
    let mut acc: Option<Tensor> = None;
    for di in 0..kernel {
        let rows = xs.index_select(&taps(di, oh)?, 2)?;
        for cols in &col_ids {
            let tap = rows.index_select(cols, 3)?;
            acc = Some(match acc {
                Some(prev) => combine(prev, tap)?,
                None => tap,
            });
        }
    }
    match acc {
        Some(out) => Ok(out),
        None => candle_core::bail!("empty pooling window"),
    }
}

/// 평균 풀링. 0 패딩 영역도 분모에 포함한다 (count_include_pad).
pub fn avg_pool2d_padded(xs: &Tensor, kernel: usize, stride: usize, padding: usize) -> Result<Tensor> {
    let xs = pad_spatial(xs, padding)?;
    if kernel == stride {
        return xs.avg_pool2d_with_stride((kernel, kernel), (stride, stride));
    }
    let sum = fold_strided_taps(&xs, kernel, stride, |a, b| a + b)?;
    sum.affine(1.0 / (kernel * kernel) as f64, 0.0)
}

/// 최대 풀링. 0으로 패딩하므로 입력이 음수가 아닐 때(ReLU 이후)만 -inf 패딩과 같다.
pub fn max_pool2d_padded(xs: &Tensor, kernel: usize, stride: usize, padding: usize) -> Result<Tensor> {
    let xs = pad_spatial(xs, padding)?;
    if kernel == stride {
        return xs.max_pool2d_with_stride((kernel, kernel), (stride, stride));
    }
    fold_strided_taps(&xs, kernel, stride, |a, b| a.maximum(&b))
}

/// align_corners 방식의 보간 탭: (하단 인덱스, 상단 인덱스, 가중치)
fn align_corners_taps(in_len: usize, out_len: usize) -> (Vec<u32>, Vec<u32>, Vec<f32>) {
    let scale = if out_len > 1 {
        (in_len - 1) as f64 / (out_len - 1) as f64
    } else {
        0.0
    };
    let mut lo = Vec::with_capacity(out_len);
    let mut hi = Vec::with_capacity(out_len);
    let mut frac = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src = i as f64 * scale;
        let l = (src.floor() as usize).min(in_len - 1);
        let h = (l + 1).min(in_len - 1);
        lo.push(l as u32);
        hi.push(h as u32);
        frac.push((src - l as f64) as f32);
    }
    (lo, hi, frac)
}

fn interpolate_dim(xs: &Tensor, dim: usize, out_len: usize) -> Result<Tensor> {
    let in_len = xs.dim(dim)?;
    if in_len == out_len {
        return Ok(xs.clone());
    }
    let device = xs.device();
    let (lo, hi, frac) = align_corners_taps(in_len, out_len);
    let lo = xs.index_select(&Tensor::from_vec(lo, out_len, device)?, dim)?;
    let hi = xs.index_select(&Tensor::from_vec(hi, out_len, device)?, dim)?;
    let mut weight_dims = vec![1; xs.rank()];
    weight_dims[dim] = out_len;
    let frac = Tensor::from_vec(frac, weight_dims, device)?.to_dtype(xs.dtype())?;
    lo.add(&hi.sub(&lo)?.broadcast_mul(&frac)?)
}

/// (N, C, H, W) -> (N, C, out_h, out_w), 코너 정렬 쌍선형 보간 (`UpsamplingBilinear2d`와 동일)
pub fn upsample_bilinear2d(xs: &Tensor, out_h: usize, out_w: usize) -> Result<Tensor> {
    let _ = xs.dims4()?;
    let xs = interpolate_dim(xs, 2, out_h)?;
    interpolate_dim(&xs, 3, out_w)
}
