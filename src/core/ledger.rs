use crate::domain::model::ActionOutcome;
use serde::Serialize;
use std::fmt;

/// 依嘗試順序累積每個動作的結果；單一失敗不會中止整體執行
#[derive(Debug, Default)]
pub struct ResultLedger {
    outcomes: Vec<ActionOutcome>,
}

impl ResultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, service: &str, action: &str) {
        tracing::info!("✅ {}: {}", service, action);
        self.outcomes.push(ActionOutcome::success(service, action));
    }

    pub fn record_failure(&mut self, service: &str, action: &str, error: impl fmt::Display) {
        let outcome = ActionOutcome::failure(service, action, error);
        tracing::warn!(
            "❌ {}: {} failed: {}",
            service,
            action,
            outcome.error().unwrap_or_default()
        );
        self.outcomes.push(outcome);
    }

    /// 前置條件不足時記錄為失敗，讓略過的步驟也出現在報告中
    pub fn record_skip(&mut self, service: &str, action: &str, reason: impl fmt::Display) {
        self.record_failure(service, action, format!("skipped: {}", reason));
    }

    pub fn record<T, E: fmt::Display>(
        &mut self,
        service: &str,
        action: &str,
        result: &std::result::Result<T, E>,
    ) -> bool {
        match result {
            Ok(_) => {
                self.record_success(service, action);
                true
            }
            Err(e) => {
                self.record_failure(service, action, e);
                false
            }
        }
    }

    pub fn outcomes(&self) -> &[ActionOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn into_outcomes(self) -> Vec<ActionOutcome> {
        self.outcomes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl LedgerSummary {
    pub fn from_outcomes(outcomes: &[ActionOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.ok()).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
        }
    }
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} actions: {} succeeded, {} failed",
            self.total, self.succeeded, self.failed
        )
    }
}
