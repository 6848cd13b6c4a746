//! The per-frame access decision loop and the policy it applies.

pub mod decision_loop;
pub mod health;
pub mod policy;
pub mod stop;

pub use decision_loop::{DecisionLoop, Iteration, LoopSettings, LoopState, RunSummary};
pub use health::{ChannelHealth, LinkState};
pub use policy::{aggregate, decide, plan_commands, AccessDecision, Verdict};
pub use stop::StopSignal;

use crate::common::Result;
use crate::core::Frame;

/// Visual feedback for a processed frame. Presentation only: failures are
/// logged and never affect access decisions.
pub trait Presenter {
    fn present(&mut self, frame: &Frame, verdicts: &[Verdict], link: LinkState) -> Result<()>;

    /// Restores whatever the presenter changed (terminal mode, windows).
    fn finish(&mut self) {}
}

/// Presenter for headless deployments.
pub struct Headless;

impl Presenter for Headless {
    fn present(&mut self, _frame: &Frame, _verdicts: &[Verdict], _link: LinkState) -> Result<()> {
        Ok(())
    }
}

impl Presenter for Vec<Box<dyn Presenter>> {
    fn present(&mut self, frame: &Frame, verdicts: &[Verdict], link: LinkState) -> Result<()> {
        for presenter in self.iter_mut() {
            presenter.present(frame, verdicts, link)?;
        }
        Ok(())
    }

    fn finish(&mut self) {
        for presenter in self.iter_mut() {
            presenter.finish();
        }
    }
}
