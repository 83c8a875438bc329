use thiserror::Error;

use crate::types::Guid;

/// Domain errors surfaced by the synchronization layer.
///
/// Every variant names the operation that raised it (`method`) together with
/// the offending ids or type names.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("{method}: invalid {parameter}: {reason}")]
    InvalidArgument {
        parameter: String,
        reason: String,
        method: &'static str,
    },

    #[error("{method}: {type_name} {guid} is not known to the metadata store")]
    UnknownEntity {
        guid: String,
        type_name: String,
        method: &'static str,
    },

    #[error("{method}: {type_name} {guid} is only held as a reference copy")]
    ProxyOnly {
        guid: String,
        type_name: String,
        method: &'static str,
    },

    #[error("{method}: name {name:?} matches {} {type_name} entities: {}", .matches.len(), join_guids(.matches))]
    AmbiguousName {
        name: String,
        type_name: String,
        matches: Vec<Guid>,
        method: &'static str,
    },

    #[error("{method}: {guid} has {} {relationship_type} relationships where at most one is allowed: {}", .matches.len(), join_guids(.matches))]
    AmbiguousRelationship {
        guid: String,
        relationship_type: String,
        matches: Vec<Guid>,
        method: &'static str,
    },

    #[error("{method}: {guid} has no {relationship_type} relationship")]
    NoRelationshipFound {
        guid: String,
        relationship_type: String,
        method: &'static str,
    },

    #[error("{method}: user {user_id} is not authorized: {detail}")]
    NotAuthorized {
        user_id: String,
        detail: String,
        method: &'static str,
    },

    #[error("{method}: metadata store {store} is not available")]
    StoreUnavailable {
        store: String,
        method: &'static str,
    },

    #[error("{method}: server invariant violated: {detail}")]
    ServerInvariantViolation {
        detail: String,
        method: &'static str,
    },

    #[error("{method}: metadata store error: {source}")]
    Store {
        method: &'static str,
        #[source]
        source: StoreError,
    },
}

/// The kind of a [`MetadataError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    UnknownEntity,
    ProxyOnly,
    AmbiguousName,
    AmbiguousRelationship,
    NoRelationshipFound,
    NotAuthorized,
    StoreUnavailable,
    ServerInvariantViolation,
    Store,
}

impl ErrorKind {
    /// Caller errors are the caller's to fix; everything else is a server fault.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::UnknownEntity
                | Self::ProxyOnly
                | Self::AmbiguousName
                | Self::AmbiguousRelationship
                | Self::NoRelationshipFound
                | Self::NotAuthorized
        )
    }
}

impl MetadataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::UnknownEntity { .. } => ErrorKind::UnknownEntity,
            Self::ProxyOnly { .. } => ErrorKind::ProxyOnly,
            Self::AmbiguousName { .. } => ErrorKind::AmbiguousName,
            Self::AmbiguousRelationship { .. } => ErrorKind::AmbiguousRelationship,
            Self::NoRelationshipFound { .. } => ErrorKind::NoRelationshipFound,
            Self::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::ServerInvariantViolation { .. } => ErrorKind::ServerInvariantViolation,
            Self::Store { .. } => ErrorKind::Store,
        }
    }

    pub fn invalid_argument(
        parameter: impl Into<String>,
        reason: impl Into<String>,
        method: &'static str,
    ) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            reason: reason.into(),
            method,
        }
    }

    pub fn invariant(detail: impl Into<String>, method: &'static str) -> Self {
        Self::ServerInvariantViolation {
            detail: detail.into(),
            method,
        }
    }
}

/// Failures raised by a store backend.
///
/// Backends never produce [`MetadataError`] directly; the repository facade
/// translates these into the domain taxonomy.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("user {user_id} is not authorized: {detail}")]
    UserNotAuthorized { user_id: String, detail: String },

    #[error("entity {guid} is not known")]
    EntityNotKnown { guid: String },

    #[error("entity {guid} is a proxy without detail")]
    EntityProxyOnly { guid: String },

    #[error("relationship {guid} is not known")]
    RelationshipNotKnown { guid: String },

    #[error("invalid parameter {parameter}: {detail}")]
    InvalidParameter { parameter: String, detail: String },

    #[error("repository is not active")]
    Inactive,

    #[error("backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}

impl StoreError {
    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        Self::Backend(err.into())
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;

fn join_guids(guids: &[Guid]) -> String {
    guids
        .iter()
        .map(Guid::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_name_lists_every_match() {
        let err = MetadataError::AmbiguousName {
            name: "dup".to_string(),
            type_name: "Connection".to_string(),
            matches: vec![Guid::from("g1"), Guid::from("g2")],
            method: "get_unique_node_by_name",
        };
        assert_eq!(
            err.to_string(),
            "get_unique_node_by_name: name \"dup\" matches 2 Connection entities: g1, g2"
        );
        assert_eq!(err.kind(), ErrorKind::AmbiguousName);
    }

    #[test]
    fn store_errors_keep_their_source() {
        let err = MetadataError::Store {
            method: "create_node",
            source: StoreError::backend(anyhow::anyhow!("socket closed")),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("socket closed"));
        assert!(!err.kind().is_caller_error());
    }

    #[test]
    fn caller_and_server_kinds() {
        assert!(ErrorKind::NotAuthorized.is_caller_error());
        assert!(ErrorKind::AmbiguousRelationship.is_caller_error());
        assert!(!ErrorKind::StoreUnavailable.is_caller_error());
        assert!(!ErrorKind::ServerInvariantViolation.is_caller_error());
    }
}
