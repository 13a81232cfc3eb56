//! IP 健康度评分
//!
//! 每个 IP 维护一个 [floor, ceiling] 区间内的分数，失败快速降权、成功缓慢恢复，
//! 仅用于候选排序，不会将任何 IP 彻底排除。分数只存在于进程内存中。

use std::{collections::HashMap, sync::Mutex};

use crate::core::config::model::HealthCfg;

/// 未出现过的 IP 视为满分。
pub const DEFAULT_SCORE: f64 = 1.0;

/// 分数下界不得低于该值
pub const MIN_SCORE: f64 = 0.1;

/// 评分步长与上下界
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthPolicy {
    pub boost: f64,
    pub penalty: f64,
    pub floor: f64,
    pub ceiling: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            boost: 0.05,
            penalty: 0.2,
            floor: 0.1,
            ceiling: DEFAULT_SCORE,
        }
    }
}

impl HealthPolicy {
    /// 将配置值收敛到 `MIN_SCORE <= floor <= ceiling <= DEFAULT_SCORE`，步长取绝对值；
    /// 非有限值回退默认。
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let finite_or = |v: f64, d: f64| if v.is_finite() { v } else { d };
        let floor = finite_or(self.floor, defaults.floor).clamp(MIN_SCORE, DEFAULT_SCORE);
        let ceiling = finite_or(self.ceiling, defaults.ceiling).clamp(floor, DEFAULT_SCORE);
        let fixed = Self {
            boost: finite_or(self.boost, defaults.boost).abs(),
            penalty: finite_or(self.penalty, defaults.penalty).abs(),
            floor,
            ceiling,
        };
        if fixed != self {
            tracing::warn!(
                target = "health",
                requested = ?self,
                effective = ?fixed,
                "health policy out of range, adjusted"
            );
        }
        fixed
    }
}

impl From<&HealthCfg> for HealthPolicy {
    fn from(cfg: &HealthCfg) -> Self {
        Self {
            boost: cfg.boost,
            penalty: cfg.penalty,
            floor: cfg.floor,
            ceiling: cfg.ceiling,
        }
        .sanitized()
    }
}

/// 健康度跟踪器；分数只能通过 `report_success` / `report_failure` 修改。
#[derive(Debug, Default)]
pub struct HealthTracker {
    policy: HealthPolicy,
    scores: Mutex<HashMap<String, f64>>,
}

impl HealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy: policy.sanitized(),
            scores: Mutex::new(HashMap::new()),
        }
    }

    pub fn report_success(&self, ip: &str) {
        let updated = self.update(ip, |current, p| (current + p.boost).min(p.ceiling));
        tracing::debug!(target = "health", ip, score = updated, "ip success reported");
    }

    pub fn report_failure(&self, ip: &str) {
        let updated = self.update(ip, |current, p| (current - p.penalty).max(p.floor));
        tracing::debug!(target = "health", ip, score = updated, "ip failure reported");
    }

    fn update(&self, ip: &str, step: impl FnOnce(f64, &HealthPolicy) -> f64) -> f64 {
        let mut guard = match self.scores.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = guard.entry(ip.to_string()).or_insert(self.policy.ceiling);
        *entry = step(*entry, &self.policy);
        *entry
    }

    /// 当前分数；未知 IP 返回上界。
    pub fn score(&self, ip: &str) -> f64 {
        self.scores
            .lock()
            .ok()
            .and_then(|guard| guard.get(ip).copied())
            .unwrap_or(self.policy.ceiling)
    }

    /// 按分数降序稳定排序，分数相同保持原有顺序。
    pub fn rank(&self, ips: &[String]) -> Vec<String> {
        let snapshot = self.snapshot();
        let mut ranked: Vec<String> = ips.to_vec();
        ranked.sort_by(|a, b| {
            let sa = snapshot.get(a).copied().unwrap_or(self.policy.ceiling);
            let sb = snapshot.get(b).copied().unwrap_or(self.policy.ceiling);
            sb.total_cmp(&sa)
        });
        ranked
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.scores
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}
