use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::codec::QueryError;
use crate::model::{Operator, Pagination, PresetFilter, PresetPair, SortField};
use crate::store::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Create,
    Get,
    GetRelated,
    GetRelationship,
    List,
    Patch,
    Delete,
}

impl EndpointKind {
    pub const FULL_CRUD: &'static [EndpointKind] = &[
        EndpointKind::Create,
        EndpointKind::Get,
        EndpointKind::GetRelated,
        EndpointKind::GetRelationship,
        EndpointKind::List,
        EndpointKind::Patch,
        EndpointKind::Delete,
    ];
    pub const READ_ONLY: &'static [EndpointKind] = &[
        EndpointKind::Get,
        EndpointKind::GetRelated,
        EndpointKind::GetRelationship,
        EndpointKind::List,
    ];
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointKind::Create => "CREATE",
            EndpointKind::Get => "GET",
            EndpointKind::GetRelated => "GET_RELATED",
            EndpointKind::GetRelationship => "GET_RELATIONSHIP",
            EndpointKind::List => "LIST",
            EndpointKind::Patch => "PATCH",
            EndpointKind::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "precheck on '{field}' uses operator '{operator}', only eq, ne, in and notin can be checked"
    )]
    UnsupportedPrecheckOperator { field: String, operator: Operator },
    #[error("preset target '{0}' has no value slot to write into")]
    NoPresetSlot(String),
    #[error("model handler for '{0}' is already registered")]
    DuplicateHandler(String),
    #[error("no model registered for collection '{0}'")]
    UnknownCollection(String),
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Rules attached to one operation of one resource type.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub kind: EndpointKind,
    pub preset_pairs: Vec<PresetPair>,
    pub precheck_pairs: Vec<PresetPair>,
    pub preset_filters: Vec<PresetFilter>,
    pub precheck_filters: Vec<PresetFilter>,
    pub preset_sort: Vec<SortField>,
    pub preset_paginate: Option<Pagination>,
    pub get_modified_result: bool,
    pub count_list: bool,
}

impl Endpoint {
    pub fn new(kind: EndpointKind) -> Self {
        Self {
            kind,
            preset_pairs: Vec::new(),
            precheck_pairs: Vec::new(),
            preset_filters: Vec::new(),
            precheck_filters: Vec::new(),
            preset_sort: Vec::new(),
            preset_paginate: None,
            get_modified_result: false,
            count_list: false,
        }
    }

    pub fn with_preset_pair(mut self, mut pair: PresetPair) -> Result<Self, ConfigError> {
        if pair.filter.preset_slot().is_none() {
            return Err(ConfigError::NoPresetSlot(pair.filter.name().to_string()));
        }
        self.preset_pairs.push(pair);
        Ok(self)
    }

    /// Registers a precheck. Only equality operators can be compared against
    /// caller values, anything else is refused here rather than at request time.
    pub fn with_precheck_pair(mut self, mut pair: PresetPair) -> Result<Self, ConfigError> {
        if let Some(values) = pair.filter.precheck_values() {
            if !values.operator.is_equality() {
                return Err(ConfigError::UnsupportedPrecheckOperator {
                    field: pair.filter.name().to_string(),
                    operator: values.operator,
                });
            }
        }
        if pair.filter.preset_slot().is_none() {
            return Err(ConfigError::NoPresetSlot(pair.filter.name().to_string()));
        }
        self.precheck_pairs.push(pair);
        Ok(self)
    }

    pub fn with_preset_filter(mut self, filter: PresetFilter) -> Self {
        self.preset_filters.push(filter);
        self
    }

    pub fn with_precheck_filter(mut self, filter: PresetFilter) -> Self {
        self.precheck_filters.push(filter);
        self
    }

    pub fn with_sort(mut self, sort: SortField) -> Self {
        self.preset_sort.push(sort);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.preset_paginate = Some(pagination);
        self
    }

    pub fn with_modified_result(mut self) -> Self {
        self.get_modified_result = true;
        self
    }

    pub fn with_count_list(mut self) -> Self {
        self.count_list = true;
        self
    }

    pub fn has_prechecks(&self) -> bool {
        !self.precheck_pairs.is_empty() || !self.precheck_filters.is_empty()
    }
}

/// Endpoints and optional repository of one resource type.
#[derive(Clone)]
pub struct ModelHandler {
    pub collection: String,
    endpoints: HashMap<EndpointKind, Endpoint>,
    repository: Option<Arc<dyn Repository>>,
}

impl ModelHandler {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            endpoints: HashMap::new(),
            repository: None,
        }
    }

    /// Handler exposing the given operations with no rules attached.
    pub fn with_kinds(collection: &str, kinds: &[EndpointKind]) -> Self {
        kinds
            .iter()
            .fold(Self::new(collection), |handler, kind| {
                handler.with_endpoint(Endpoint::new(*kind))
            })
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.insert(endpoint.kind, endpoint);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn endpoint(&self, kind: EndpointKind) -> Option<&Endpoint> {
        self.endpoints.get(&kind)
    }

    pub fn endpoint_mut(&mut self, kind: EndpointKind) -> Option<&mut Endpoint> {
        self.endpoints.get_mut(&kind)
    }

    pub fn repository(&self) -> Option<Arc<dyn Repository>> {
        self.repository.clone()
    }
}

impl fmt::Debug for ModelHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandler")
            .field("collection", &self.collection)
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("custom_repository", &self.repository.is_some())
            .finish()
    }
}
