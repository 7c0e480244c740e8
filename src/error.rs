use thiserror::Error;

use crate::automation::ParamTarget;
use crate::graph::NodeId;

/// Result alias carrying [`EarconError`].
pub type Result<T> = std::result::Result<T, EarconError>;

/// Every failure the engine can report.
///
/// All of these surface at resolve, build, or schedule time. Nothing is ever
/// raised from inside the render path: by the time a plan reaches the sink it
/// has already passed every check below.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EarconError {
    /// A second clock context was opened for a device that already has one.
    #[error("a clock context is already open for device '{0}'")]
    DuplicateContext(String),

    /// Filter Q outside the stable range; high Q self-oscillates.
    #[error("filter {node} has Q {q}, outside the stable range [0.5, 15]")]
    UnstableFilterQ { node: NodeId, q: f64 },

    /// A gain level or gain automation point above the volume ceiling.
    #[error("gain on {node} reaches {level}, above the 0.8 ceiling")]
    VolumeCeilingExceeded { node: NodeId, level: f64 },

    /// A ramp that does not start from the value its parameter holds.
    #[error("ramp on {target} at {time:.4}s does not start from the value its parameter holds")]
    UnanchoredRamp { target: ParamTarget, time: f64 },

    /// A source stop that would cut its gain envelope short.
    #[error("{node} stops at {stop:.4}s but may not stop before {earliest:.4}s")]
    PrematureStop { node: NodeId, stop: f64, earliest: f64 },

    #[error("unknown sound category '{0}'")]
    UnknownCategory(String),

    #[error("'{name}' is not a parameter of the {category} recipe")]
    UnknownParameter { category: String, name: String },

    /// An override value that cannot be read as a number at all.
    #[error("override '{name}' is invalid: {reason}")]
    InvalidOverride { name: String, reason: String },

    /// An edge that breaks the DAG or FM routing rules.
    #[error("invalid graph topology: {0}")]
    InvalidTopology(String),

    /// A recipe whose structure breaks its category's timbre rule.
    #[error("{category} recipe violates structural rule: {rule}")]
    StructuralRule { category: String, rule: String },

    #[error("no playback instance with id {0}")]
    UnknownInstance(u64),

    #[error("instance limit of {0} reached")]
    InstanceLimit(usize),

    /// The shared context was closed or its lock poisoned.
    #[error("clock context is closed")]
    ContextClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let e = EarconError::UnknownParameter {
            category: "toggle".into(),
            name: "brightness".into(),
        };
        assert_eq!(
            e.to_string(),
            "'brightness' is not a parameter of the toggle recipe"
        );

        let e = EarconError::UnstableFilterQ { node: NodeId(2), q: 20.0 };
        assert!(e.to_string().contains("node#2"), "got: {e}");
    }
}
