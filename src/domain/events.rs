//! Parse run stages and progress notifications
//!
//! Progress events are relayed by the calling layer (bot, CLI) and are
//! best-effort only: a dropped receiver never affects the run.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Stage of a single parse request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParseStage {
    /// Category URL accepted and resolved
    Resolved,
    /// Walking the catalog listing pages
    Paginating,
    /// Looking up search frequency for every product
    Fetching,
    /// Ranking results into a report
    Aggregating,
    /// Handing the report to the exporter
    Exporting,
    /// Report exported
    Done,
    /// Terminal failure
    Failed(String),
}

impl ParseStage {
    /// `Failed` is reachable from every non-terminal stage; otherwise stages move strictly forward.
    pub fn can_transition_to(&self, next: &ParseStage) -> bool {
        match (self, next) {
            (Self::Done | Self::Failed(_), _) => false,
            (_, Self::Failed(_)) => true,
            (Self::Resolved, Self::Paginating)
            | (Self::Paginating, Self::Fetching)
            | (Self::Fetching, Self::Aggregating)
            | (Self::Aggregating, Self::Exporting)
            | (Self::Exporting, Self::Done) => true,
            _ => false,
        }
    }

    /// Short machine-friendly label used in logs and error context
    pub fn label(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Paginating => "paginating",
            Self::Fetching => "fetching",
            Self::Aggregating => "aggregating",
            Self::Exporting => "exporting",
            Self::Done => "done",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for ParseStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolved => write!(f, "Категория найдена"),
            Self::Paginating => write!(f, "Сбор товаров категории"),
            Self::Fetching => write!(f, "Запрос частотности"),
            Self::Aggregating => write!(f, "Формирование отчета"),
            Self::Exporting => write!(f, "Сохранение файла"),
            Self::Done => write!(f, "Готово"),
            Self::Failed(reason) => write!(f, "Ошибка: {reason}"),
        }
    }
}

/// Incremental status for the calling layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProgressEvent {
    StageChanged {
        stage: ParseStage,
    },
    PageFetched {
        page: u32,
        new_products: usize,
        total_products: usize,
    },
    FetchProgress {
        completed: usize,
        total: usize,
    },
    CooldownStarted {
        millis: u64,
    },
}

/// Optional sender side of the progress channel
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Non-blocking send; failures are ignored
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
