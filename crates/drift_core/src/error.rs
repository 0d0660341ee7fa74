//! Error types for the animated graph

use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised by graph, driver, and combinator operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    /// A spring was configured with both tension/friction and bounciness/speed
    #[error("spring config may define bounciness/speed or tension/friction, but not both")]
    InvalidSpringConfig,

    /// Decay deceleration outside `[0, 1)` never settles
    #[error("decay deceleration must be in [0, 1), got {0}")]
    InvalidDecayConfig(f64),

    /// Interpolation ranges are malformed
    #[error("invalid interpolation: {0}")]
    InvalidInterpolation(String),

    /// A value had a different shape than the operation required
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
        context: String,
    },

    /// The node handle no longer refers to a live node
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    /// The node variant does not support the requested operation
    #[error("node {node:?} does not support `{operation}`")]
    UnsupportedOperation {
        node: NodeId,
        operation: &'static str,
    },

    /// A combinator was started more than once
    #[error("animation has already been started")]
    AlreadyStarted,
}

impl AnimationError {
    pub(crate) fn unsupported(node: NodeId, operation: &'static str) -> Self {
        AnimationError::UnsupportedOperation { node, operation }
    }
}

/// Result type for animation operations
pub type Result<T> = std::result::Result<T, AnimationError>;
