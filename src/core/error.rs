//! DORN 에러 타입
//!
//! 공개 API는 `anyhow::Result`를 반환하고, 호출자가 구분해야 하는 실패는
//! `DornError`로 감싸서 `downcast_ref`로 꺼낼 수 있게 한다.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DornError {
    /// 생성 시점에 고정된 형상과 실제 텐서 형상이 다름
    #[error("{what}: 형상 불일치 (expected {expected:?}, got {actual:?})")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// 서수 회귀 채널 수는 짝수여야 함
    #[error("ordinal channel count must be even, got {0}")]
    OddChannelCount(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 사전학습 가중치 파일에 필요한 텐서가 없음
    #[error("missing pretrained tensor '{0}'")]
    MissingWeight(String),
}

impl DornError {
    pub fn shape(what: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        DornError::ShapeMismatch {
            what: what.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
