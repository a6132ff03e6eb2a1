use roast_vault_core::progress::interpolate;
use roast_vault_core::{Operation, Phase, ProgressCounts, ProgressEvent};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

pub type ProgressSender = UnboundedSender<ProgressEvent>;

/// Emits ordered progress events for one operation. Fractions never move
/// backwards; a dropped receiver only stops delivery.
pub struct ProgressReporter {
    operation: Operation,
    sender: Option<ProgressSender>,
    last_fraction: f64,
    phase: Phase,
    items_done: usize,
    items_total: usize,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(operation: Operation, sender: Option<ProgressSender>) -> Self {
        let phase = match operation {
            Operation::Export => Phase::Preparing,
            Operation::Import => Phase::Validating,
        };
        Self { operation, sender, last_fraction: 0.0, phase, items_done: 0, items_total: 0 }
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Most recent stage started.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Items processed and total in the current stage.
    #[must_use]
    pub fn items(&self) -> (usize, usize) {
        (self.items_done, self.items_total)
    }

    /// Report the start of `phase`.
    pub fn stage(&mut self, phase: Phase, message: impl Into<String>) {
        let message = message.into();
        info!(operation = self.operation.as_str(), phase = phase.as_str(), "{message}");
        self.phase = phase;
        self.items_done = 0;
        self.items_total = 0;
        self.emit(phase, phase.start_fraction(), message, None);
    }

    /// Report progress inside `phase`, between its start and `end`.
    pub fn advance(&mut self, phase: Phase, end: f64, done: usize, total: usize) {
        self.phase = phase;
        self.items_done = done;
        self.items_total = total;
        let fraction = interpolate(phase.start_fraction(), end, done, total);
        self.emit(phase, fraction, format!("{done}/{total}"), None);
    }

    pub fn completed(&mut self, message: impl Into<String>, counts: Option<ProgressCounts>) {
        let message = message.into();
        info!(operation = self.operation.as_str(), phase = "completed", "{message}");
        self.emit(Phase::Completed, 1.0, message, counts);
    }

    /// Terminal failure event. Keeps the last fraction reached.
    pub fn failed(&mut self, message: impl Into<String>) {
        let fraction = self.last_fraction;
        self.emit(Phase::Failed, fraction, message.into(), None);
    }

    #[must_use]
    pub fn last_fraction(&self) -> f64 {
        self.last_fraction
    }

    fn emit(&mut self, phase: Phase, fraction: f64, message: String, counts: Option<ProgressCounts>) {
        let fraction = fraction.clamp(self.last_fraction, 1.0);
        self.last_fraction = fraction;
        let Some(sender) = &self.sender else {
            return;
        };
        let event = ProgressEvent { operation: self.operation, phase, fraction, message, counts };
        if sender.send(event).is_err() {
            debug!(operation = self.operation.as_str(), "progress receiver dropped");
            self.sender = None;
        }
    }
}
