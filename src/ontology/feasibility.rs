//! 可行性评估：目标 + 身份 -> [0, 1] 分数
//!
//! 必须是确定性的纯函数；Ontology 会再次截断到 [0, 1]。

use crate::ontology::{Goal, Identity};

/// 可行性评估策略
pub trait FeasibilityPolicy: Send + Sync {
    fn score(&self, goal: &Goal, identity: &Identity) -> f64;
}

/// 常量策略：不看目标内容，固定返回同一分数（默认 0.7）
#[derive(Debug, Clone, Copy)]
pub struct ConstantFeasibility(pub f64);

impl Default for ConstantFeasibility {
    fn default() -> Self {
        Self(0.7)
    }
}

impl FeasibilityPolicy for ConstantFeasibility {
    fn score(&self, _goal: &Goal, _identity: &Identity) -> f64 {
        self.0
    }
}
