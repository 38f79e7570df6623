use thiserror::Error;

/// Fatal failures of task construction and grounding.
///
/// Capacity and memory pressure are deliberately absent: hash-base overflow
/// and RAM exhaustion recover locally by disabling the affected cache and
/// never surface as errors.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Malformed task input.
    #[error("parse error: {0}")]
    Parse(String),

    /// A type, object, schema, or ground variable was referenced but never
    /// declared.
    #[error("undefined {kind} `{name}`")]
    UndefinedReference { kind: &'static str, name: String },

    /// An object was substituted for a parameter of an incompatible type.
    #[error("type mismatch: object `{object}` does not satisfy parameter type `{expected}` of `{variable}`")]
    TypeMismatch {
        variable: String,
        expected: String,
        object: String,
    },

    /// The task admits no legal behaviour: a static precondition reduced to
    /// false, the initial state violates an invariant, or the reward is not
    /// deterministic.
    #[error("infeasible task: {0}")]
    Infeasible(String),
}
