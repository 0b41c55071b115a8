//! Error types for the service tree.
//!
//! Errors are grouped by the entity they concern (nodes, bindings, rules,
//! environments), plus input validation and backend failures. Every error
//! can be classified into an [`ErrorKind`] so that a transport layer can map
//! it to a status code without matching on individual variants.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::tenant::TenantId;

/// The primary error type for all service tree operations.
#[derive(Error, Debug)]
pub enum ServiceTreeError {
    /// Tree node errors
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Resource binding errors
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// Binding rule errors
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// Environment errors
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// Input validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Storage backend errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors related to tree nodes and tree structure.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("tree node not found: {id}")]
    NotFound { id: i64 },

    #[error("tree node not found: {tenant_id}/{uid}")]
    UidNotFound { tenant_id: TenantId, uid: String },

    #[error("node uid already exists in tenant {tenant_id}: {uid}")]
    UidExists { tenant_id: TenantId, uid: String },

    #[error("node {id} has {count} child node(s) and cannot be deleted")]
    HasChildren { id: i64, count: u64 },

    #[error("node {id} has {count} bound resource(s) and cannot be deleted")]
    HasBindings { id: i64, count: u64 },

    #[error("invalid parent node: {parent_id}")]
    InvalidParent { parent_id: i64 },

    #[error("cannot move node {id} under {new_parent_id}: target is the node itself or one of its descendants")]
    CyclicReference { id: i64, new_parent_id: i64 },
}

/// Errors related to resource bindings.
#[derive(Error, Debug)]
pub enum BindingError {
    #[error("binding not found: {id}")]
    NotFound { id: i64 },

    #[error("resource is not bound: {resource_type}/{resource_id}")]
    ResourceNotBound {
        resource_type: String,
        resource_id: i64,
    },

    #[error("resource {resource_type}/{resource_id} is already bound to node {node_id}")]
    AlreadyBound {
        resource_type: String,
        resource_id: i64,
        node_id: i64,
        env_id: i64,
    },
}

/// Errors related to binding rules.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("binding rule not found: {id}")]
    NotFound { id: i64 },

    #[error("invalid operator: {operator}")]
    InvalidOperator { operator: String },

    #[error("invalid pattern '{pattern}' on field {field}: {message}")]
    InvalidPattern {
        field: String,
        pattern: String,
        message: String,
    },
}

/// Errors related to environments.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("environment not found: {id}")]
    NotFound { id: i64 },

    #[error("environment not found: {tenant_id}/{code}")]
    CodeNotFound { tenant_id: TenantId, code: String },

    #[error("environment code already exists in tenant {tenant_id}: {code}")]
    CodeExists { tenant_id: TenantId, code: String },

    #[error("environment {id} has {count} bound resource(s) and cannot be deleted")]
    HasBindings { id: i64, count: u64 },
}

/// Errors related to malformed input.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },

    #[error("invalid resource type: {resource_type}")]
    InvalidResourceType { resource_type: String },

    #[error("invalid bind type: {bind_type}")]
    InvalidBindType { bind_type: String },

    #[error("invalid node path '{path}': {message}")]
    InvalidPath { path: String, message: String },
}

/// Errors originating from the storage backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// A uniqueness constraint was violated by the store itself.
    ///
    /// This is how concurrent creates racing past the service-level
    /// uniqueness checks surface.
    #[error("unique constraint violated in {backend_name}: {constraint}")]
    UniqueViolation {
        backend_name: String,
        constraint: String,
    },

    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("query execution failed: {message}")]
    QueryError { message: String },

    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Coarse classification of errors, independent of the entity involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The addressed entity does not exist.
    NotFound,
    /// A uniqueness rule would be broken.
    Conflict,
    /// The request itself is malformed.
    InvalidInput,
    /// The request would break the tree or binding structure.
    StructuralViolation,
    /// Unexpected storage failure.
    SystemError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not-found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::InvalidInput => write!(f, "invalid-input"),
            ErrorKind::StructuralViolation => write!(f, "structural-violation"),
            ErrorKind::SystemError => write!(f, "system-error"),
        }
    }
}

impl ServiceTreeError {
    /// Returns the error kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceTreeError::Node(err) => match err {
                NodeError::NotFound { .. } | NodeError::UidNotFound { .. } => ErrorKind::NotFound,
                NodeError::UidExists { .. } => ErrorKind::Conflict,
                NodeError::HasChildren { .. }
                | NodeError::HasBindings { .. }
                | NodeError::InvalidParent { .. }
                | NodeError::CyclicReference { .. } => ErrorKind::StructuralViolation,
            },
            ServiceTreeError::Binding(err) => match err {
                BindingError::NotFound { .. } | BindingError::ResourceNotBound { .. } => {
                    ErrorKind::NotFound
                }
                BindingError::AlreadyBound { .. } => ErrorKind::Conflict,
            },
            ServiceTreeError::Rule(err) => match err {
                RuleError::NotFound { .. } => ErrorKind::NotFound,
                RuleError::InvalidOperator { .. } | RuleError::InvalidPattern { .. } => {
                    ErrorKind::InvalidInput
                }
            },
            ServiceTreeError::Environment(err) => match err {
                EnvironmentError::NotFound { .. } | EnvironmentError::CodeNotFound { .. } => {
                    ErrorKind::NotFound
                }
                EnvironmentError::CodeExists { .. } => ErrorKind::Conflict,
                EnvironmentError::HasBindings { .. } => ErrorKind::StructuralViolation,
            },
            ServiceTreeError::Validation(_) => ErrorKind::InvalidInput,
            ServiceTreeError::Backend(BackendError::UniqueViolation { .. }) => ErrorKind::Conflict,
            ServiceTreeError::Backend(_) => ErrorKind::SystemError,
        }
    }

    /// Returns `true` if the addressed entity does not exist.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns `true` if the error is a uniqueness conflict.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// Result type alias for service tree operations.
pub type ServiceTreeResult<T> = Result<T, ServiceTreeError>;

pub(crate) fn missing_field(field: &str) -> ServiceTreeError {
    ServiceTreeError::Validation(ValidationError::MissingRequiredField {
        field: field.to_string(),
    })
}

// Implement conversions from common error types

impl From<serde_json::Error> for ServiceTreeError {
    fn from(err: serde_json::Error) -> Self {
        ServiceTreeError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for ServiceTreeError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, message) = &err {
            if code.code == rusqlite::ErrorCode::ConstraintViolation {
                return ServiceTreeError::Backend(BackendError::UniqueViolation {
                    backend_name: "sqlite".to_string(),
                    constraint: message.clone().unwrap_or_else(|| code.to_string()),
                });
            }
        }
        ServiceTreeError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for ServiceTreeError {
    fn from(err: r2d2::Error) -> Self {
        ServiceTreeError::Backend(BackendError::ConnectionFailed {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
        })
    }
}
