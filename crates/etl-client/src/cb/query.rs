//! Request targeting and entity query filters

use crate::auth::AuthManager;
use crate::error::{EtlError, Result};
use serde::{Deserialize, Serialize};

/// Tenant and sub-tenant a request is addressed to.
///
/// Unset values fall back to the authenticator's service and default
/// subservice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub service: Option<String>,
    pub subservice: Option<String>,
}

impl Target {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn subservice(mut self, subservice: impl Into<String>) -> Self {
        self.subservice = Some(subservice.into());
        self
    }

    /// Resolve `(service, subservice)`, explicit values first.
    pub(crate) fn resolve(&self, auth: Option<&AuthManager>) -> Result<(String, String)> {
        let subservice = match (&self.subservice, auth) {
            (Some(subservice), _) => subservice.clone(),
            (None, Some(auth)) => auth.default_subservice().map(str::to_string).ok_or_else(|| {
                EtlError::config("You must define <<subservice>> either here or in AuthManager")
            })?,
            (None, None) => return Err(EtlError::config("You must define <<subservice>>")),
        };

        let service = match (&self.service, auth) {
            (Some(service), _) => service.clone(),
            (None, Some(auth)) => auth.service().to_string(),
            (None, None) => return Err(EtlError::config("You must define <<service>>")),
        };

        Ok((service, subservice))
    }
}

/// Filter for entity listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityQuery {
    pub entity_type: Option<String>,
    pub id: Option<String>,
    pub q: Option<String>,
    pub mq: Option<String>,
    pub georel: Option<String>,
    pub geometry: Option<String>,
    pub coords: Option<String>,
    pub order_by: Option<String>,

    /// Flags sent as `?options=a,b` (`keyValues`, `count`, ...)
    #[serde(default)]
    pub options: Vec<String>,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn q(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    pub fn mq(mut self, mq: impl Into<String>) -> Self {
        self.mq = Some(mq.into());
        self
    }

    /// Set the whole geographical filter at once
    pub fn geo(
        mut self,
        georel: impl Into<String>,
        geometry: impl Into<String>,
        coords: impl Into<String>,
    ) -> Self {
        self.georel = Some(georel.into());
        self.geometry = Some(geometry.into());
        self.coords = Some(coords.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Geographical fields must be all set and non-empty, or all unset.
    pub fn validate(&self) -> Result<()> {
        let geo = [&self.georel, &self.geometry, &self.coords];
        let any_set = geo.iter().any(|field| field.is_some());
        let all_filled = geo
            .iter()
            .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()));

        if any_set && !all_filled {
            return Err(EtlError::validation(
                "If use geographical queries, you must define georel, geometry and coords in params",
            ));
        }
        Ok(())
    }

    /// Query string parameters for one page, unset values omitted.
    pub(crate) fn params(&self, offset: Option<usize>, limit: Option<usize>) -> Vec<(String, String)> {
        let fields = [
            ("offset", offset.map(|v| v.to_string())),
            ("limit", limit.map(|v| v.to_string())),
            ("type", self.entity_type.clone()),
            ("orderBy", self.order_by.clone()),
            ("q", self.q.clone()),
            ("mq", self.mq.clone()),
            ("georel", self.georel.clone()),
            ("geometry", self.geometry.clone()),
            ("coords", self.coords.clone()),
            ("id", self.id.clone()),
        ];

        fields
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
            .collect()
    }
}
