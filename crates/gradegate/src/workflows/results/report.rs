use serde::Serialize;

use super::domain::{ResultId, ResultStatus, Transition};
use super::error::WorkflowError;

/// Per-record outcome of a bulk transition.
#[derive(Debug)]
pub struct TransitionItem {
    pub result_id: ResultId,
    pub outcome: Result<ResultStatus, WorkflowError>,
}

impl TransitionItem {
    pub fn applied(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn view(&self) -> TransitionItemView {
        match &self.outcome {
            Ok(status) => TransitionItemView {
                result_id: self.result_id.clone(),
                applied: true,
                status: Some(status.label()),
                code: None,
                reason: None,
            },
            Err(err) => TransitionItemView {
                result_id: self.result_id.clone(),
                applied: false,
                status: None,
                code: Some(err.code()),
                reason: Some(err.to_string()),
            },
        }
    }
}

/// Bulk operations never short-circuit: every requested id gets an item.
#[derive(Debug)]
pub struct BulkTransitionReport {
    pub transition: Transition,
    pub items: Vec<TransitionItem>,
}

impl BulkTransitionReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.applied()).count()
    }

    pub fn skipped(&self) -> usize {
        self.items.len() - self.succeeded()
    }

    pub fn applied_ids(&self) -> Vec<ResultId> {
        self.items
            .iter()
            .filter(|item| item.applied())
            .map(|item| item.result_id.clone())
            .collect()
    }

    pub fn item(&self, id: &ResultId) -> Option<&TransitionItem> {
        self.items.iter().find(|item| &item.result_id == id)
    }

    pub fn summary(&self) -> BulkSummaryView {
        BulkSummaryView {
            transition: self.transition.label(),
            requested: self.items.len(),
            succeeded: self.succeeded(),
            skipped: self.skipped(),
            results: self.items.iter().map(TransitionItem::view).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionItemView {
    pub result_id: ResultId,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkSummaryView {
    pub transition: &'static str,
    pub requested: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub results: Vec<TransitionItemView>,
}
