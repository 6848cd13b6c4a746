use crate::channel::ActuatorCommand;
use crate::common::DispatchMode;
use crate::core::{Detection, Identity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessDecision {
    Grant,
    Deny,
}

impl AccessDecision {
    pub fn command(self) -> ActuatorCommand {
        match self {
            AccessDecision::Grant => ActuatorCommand::Open,
            AccessDecision::Deny => ActuatorCommand::Close,
        }
    }

    pub fn is_grant(self) -> bool {
        self == AccessDecision::Grant
    }
}

/// `Grant` iff `identity` is a known label byte-equal to `authorized_identity`.
pub fn decide(identity: &Identity, authorized_identity: &str) -> AccessDecision {
    match identity {
        Identity::Known(label) if label.as_bytes() == authorized_identity.as_bytes() => {
            AccessDecision::Grant
        }
        _ => AccessDecision::Deny,
    }
}

/// A detection together with the decision taken for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub detection: Detection,
    pub decision: AccessDecision,
}

impl Verdict {
    pub fn evaluate(detection: Detection, authorized_identity: &str) -> Self {
        let decision = decide(&detection.identity, authorized_identity);
        Self { detection, decision }
    }
}

/// Frame-level decision: `Grant` iff some face is authorized and no face is unknown.
///
/// `None` for a frame without faces.
pub fn aggregate(verdicts: &[Verdict]) -> Option<AccessDecision> {
    if verdicts.is_empty() {
        return None;
    }

    let any_granted = verdicts.iter().any(|v| v.decision.is_grant());
    let any_unknown = verdicts.iter().any(|v| v.detection.identity.is_unknown());

    Some(if any_granted && !any_unknown {
        AccessDecision::Grant
    } else {
        AccessDecision::Deny
    })
}

/// Commands to send for one frame, in sending order.
pub fn plan_commands(verdicts: &[Verdict], mode: DispatchMode) -> Vec<ActuatorCommand> {
    match mode {
        DispatchMode::PerDetection => verdicts.iter().map(|v| v.decision.command()).collect(),
        DispatchMode::PerFrame => aggregate(verdicts).map(AccessDecision::command).into_iter().collect(),
    }
}
