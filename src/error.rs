//! Error types and the non-fatal notice channel.
//!
//! Refused edits are returned as [`DiagramError`]. Problems that do not stop
//! editing (unresolved catalog references, synthesized endpoints, rejected
//! connection attempts) are reported as [`Notice`]s which the caller drains
//! from the diagram.

use thiserror::Error;

use crate::editor::{ComponentId, ConnectionId, EndpointId, StackId};

#[derive(Debug, Error, PartialEq)]
pub enum DiagramError {
    #[error("component item {0} does not exist")]
    UnknownComponent(ComponentId),

    #[error("endpoint {0} does not exist")]
    UnknownEndpoint(EndpointId),

    #[error("connection {0} does not exist")]
    UnknownConnection(ConnectionId),

    #[error("stack {0} does not exist")]
    UnknownStack(StackId),

    #[error("stack '{stack}' still holds containers with nested items: {containers:?}")]
    StackHasNestedItems {
        stack: String,
        containers: Vec<String>,
    },

    #[error("stack '{stack}' does not accept {kind} items")]
    ItemNotAllowed { stack: String, kind: String },

    #[error("endpoints '{0}' and '{1}' cannot be connected")]
    Incompatible(String, String),

    #[error("endpoint '{0}' already has its only allowed connection")]
    Saturated(String),

    #[error("endpoint '{0}' is an off-page proxy and cannot be edited directly")]
    ProxyEndpoint(String),

    #[error("component '{0}' is not a container")]
    NotAContainer(String),

    #[error("the diagram is protected against edits")]
    Protected,

    #[error("nothing to paste")]
    EmptyClipboard,

    #[error("diagram bookkeeping is inconsistent: {0}")]
    Inconsistent(String),
}

/// Severity of a [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A caller-visible, non-fatal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub message: String,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}", tag, self.message)
    }
}
