//! # 레이어 모듈
//!
//! candle 텐서 위에 얹은 최소한의 레이어 집합과, 레이어 트리를 순회하는
//! `Layers` 트레이트. 초기화기, 파라미터 그룹, 학습/평가 모드 전환이 모두
//! 이 순회 하나를 공유한다.

/// 리프 레이어용 `Layers` 구현
macro_rules! leaf_layer {
    ($ty:ty, $variant:ident) => {
        impl $crate::core::layers::Layers for $ty {
            fn layers(
                &self,
            ) -> Box<dyn Iterator<Item = $crate::core::layers::LayerRef<'_>> + '_> {
                Box::new(std::iter::once($crate::core::layers::LayerRef::$variant(self)))
            }

            fn visit_layers_mut(
                &mut self,
                f: &mut dyn FnMut($crate::core::layers::LayerMut<'_>),
            ) {
                f($crate::core::layers::LayerMut::$variant(self))
            }
        }
    };
}

pub mod conv;
pub mod dropout;
pub mod linear;
pub mod norm;
pub mod param;
pub mod resample;

#[cfg(test)]
mod __tests__;

pub use conv::{Conv2d, ConvSpec, ConvTranspose2d};
pub use dropout::Dropout2d;
pub use linear::Linear;
pub use norm::BatchNorm2d;
pub use param::Param;
pub use resample::{avg_pool2d_padded, max_pool2d_padded, upsample_bilinear2d};

/// 초기화 규칙을 고르는 레이어 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// 합성곱 / 전치 합성곱
    ConvLike { kernel: usize, out_channels: usize },
    NormLike,
    LinearLike,
}

/// 레이어 트리의 한 노드 (읽기 전용)
#[derive(Clone, Copy)]
pub enum LayerRef<'a> {
    Conv(&'a Conv2d),
    ConvTranspose(&'a ConvTranspose2d),
    Norm(&'a BatchNorm2d),
    Linear(&'a Linear),
    Dropout(&'a Dropout2d),
}

/// 레이어 트리의 한 노드 (가변)
pub enum LayerMut<'a> {
    Conv(&'a mut Conv2d),
    ConvTranspose(&'a mut ConvTranspose2d),
    Norm(&'a mut BatchNorm2d),
    Linear(&'a mut Linear),
    Dropout(&'a mut Dropout2d),
}

impl<'a> LayerRef<'a> {
    /// 파라미터가 없는 레이어(dropout)는 `None`
    pub fn kind(self) -> Option<LayerKind> {
        match self {
            LayerRef::Conv(conv) => Some(LayerKind::ConvLike {
                kernel: conv.spec().kernel,
                out_channels: conv.spec().out_channels,
            }),
            LayerRef::ConvTranspose(conv) => Some(LayerKind::ConvLike {
                kernel: conv.spec().kernel,
                out_channels: conv.spec().out_channels,
            }),
            LayerRef::Norm(_) => Some(LayerKind::NormLike),
            LayerRef::Linear(_) => Some(LayerKind::LinearLike),
            LayerRef::Dropout(_) => None,
        }
    }

    pub fn name(self) -> &'a str {
        match self {
            LayerRef::Conv(l) => l.name(),
            LayerRef::ConvTranspose(l) => l.name(),
            LayerRef::Norm(l) => l.name(),
            LayerRef::Linear(l) => l.name(),
            LayerRef::Dropout(l) => l.name(),
        }
    }

    pub fn weight(self) -> Option<&'a Param> {
        match self {
            LayerRef::Conv(l) => Some(l.weight()),
            LayerRef::ConvTranspose(l) => Some(l.weight()),
            LayerRef::Norm(l) => Some(l.weight()),
            LayerRef::Linear(l) => Some(l.weight()),
            LayerRef::Dropout(_) => None,
        }
    }

    pub fn bias(self) -> Option<&'a Param> {
        match self {
            LayerRef::Conv(l) => l.bias(),
            LayerRef::ConvTranspose(l) => l.bias(),
            LayerRef::Norm(l) => Some(l.bias()),
            LayerRef::Linear(l) => l.bias(),
            LayerRef::Dropout(_) => None,
        }
    }

    /// weight, bias 순서
    pub fn params(self) -> impl Iterator<Item = &'a Param> + 'a {
        self.weight().into_iter().chain(self.bias())
    }
}

impl<'a> LayerMut<'a> {
    fn params_mut(self) -> Vec<&'a mut Param> {
        match self {
            LayerMut::Conv(l) => l.params_mut(),
            LayerMut::ConvTranspose(l) => l.params_mut(),
            LayerMut::Norm(l) => l.params_mut(),
            LayerMut::Linear(l) => l.params_mut(),
            LayerMut::Dropout(_) => Vec::new(),
        }
    }
}

/// 단일 레이어와 레이어 컨테이너를 같은 방식으로 다루기 위한 순회 트레이트.
///
/// `layers()`는 호출할 때마다 새 순회를 시작하며, 순서는 선언 순서를 따른다.
pub trait Layers {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_>;

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>));

    /// 모든 파라미터 (requires_grad 여부 무관)
    fn parameters(&self) -> Box<dyn Iterator<Item = &Param> + '_> {
        Box::new(self.layers().flat_map(|layer| layer.params()))
    }

    /// 그래디언트 추적이 켜진 파라미터만
    fn trainable_parameters(&self) -> Box<dyn Iterator<Item = &Param> + '_> {
        Box::new(self.parameters().filter(|p| p.requires_grad()))
    }

    /// BatchNorm / Dropout 에 학습 모드를 전달. 고정된 norm 레이어는 무시한다.
    fn set_training(&mut self, training: bool) {
        self.visit_layers_mut(&mut |layer| match layer {
            LayerMut::Norm(norm) => norm.set_training(training),
            LayerMut::Dropout(dropout) => dropout.set_training(training),
            _ => {}
        });
    }

    fn set_requires_grad(&mut self, requires_grad: bool) {
        self.visit_layers_mut(&mut |layer| {
            for param in layer.params_mut() {
                param.set_requires_grad(requires_grad);
            }
        });
    }

    /// 모든 BatchNorm2d를 영구히 고정 통계(eval) 모드로 둔다
    fn freeze_norm(&mut self) {
        self.visit_layers_mut(&mut |layer| {
            if let LayerMut::Norm(norm) = layer {
                norm.freeze();
            }
        });
    }
}

impl<T: Layers> Layers for [T] {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        Box::new(self.iter().flat_map(|item| item.layers()))
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        for item in self.iter_mut() {
            item.visit_layers_mut(f);
        }
    }
}

impl<T: Layers> Layers for Vec<T> {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        self.as_slice().layers()
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        self.as_mut_slice().visit_layers_mut(f)
    }
}

impl<T: Layers> Layers for Option<T> {
    fn layers(&self) -> Box<dyn Iterator<Item = LayerRef<'_>> + '_> {
        match self {
            Some(inner) => inner.layers(),
            None => Box::new(std::iter::empty()),
        }
    }

    fn visit_layers_mut(&mut self, f: &mut dyn FnMut(LayerMut<'_>)) {
        if let Some(inner) = self {
            inner.visit_layers_mut(f);
        }
    }
}
