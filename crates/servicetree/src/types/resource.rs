//! Inventory resources evaluated by binding rules.
//!
//! Instances come from the asset inventory. Their attributes are a free-form
//! bag of JSON-like values; rule conditions only ever compare strings, so the
//! accessors here return `None` on any type mismatch instead of failing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// Attribute key holding the nested tag map.
pub const TAGS_ATTRIBUTE: &str = "tags";

/// A dynamically typed attribute value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// Explicit null.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// String value.
    String(String),
    /// Ordered list of values.
    List(Vec<AttrValue>),
    /// Nested map of values.
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested map, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self {
            AttrValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns `true` for [`AttrValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Number(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Number(value as f64)
    }
}

impl From<BTreeMap<String, AttrValue>> for AttrValue {
    fn from(value: BTreeMap<String, AttrValue>) -> Self {
        AttrValue::Map(value)
    }
}

/// A field a rule condition can read from an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPath {
    /// The instance's asset name.
    Name,
    /// The instance's cloud asset id.
    AssetId,
    /// The instance's model uid.
    ModelUid,
    /// `attributes.<key>`.
    Attribute(String),
    /// `tag.<key>`, looked up in the nested `tags` attribute map.
    Tag(String),
    /// Anything else. Always reads as empty.
    Unknown(String),
}

impl FieldPath {
    /// Parses a condition field name.
    pub fn parse(field: &str) -> Self {
        match field {
            "name" => FieldPath::Name,
            "asset_id" => FieldPath::AssetId,
            "model_uid" => FieldPath::ModelUid,
            other => {
                if let Some(key) = other.strip_prefix("attributes.") {
                    FieldPath::Attribute(key.to_string())
                } else if let Some(key) = other.strip_prefix("tag.") {
                    FieldPath::Tag(key.to_string())
                } else {
                    FieldPath::Unknown(other.to_string())
                }
            }
        }
    }
}

/// A resource instance from the asset inventory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instance {
    /// Inventory identity, used as the binding's resource id.
    pub id: i64,
    /// Cloud-side asset id (e.g. `i-0abc...`).
    #[serde(default)]
    pub asset_id: String,
    /// Asset display name.
    #[serde(default)]
    pub asset_name: String,
    /// Model the instance belongs to (e.g. `cloud_vm`).
    #[serde(default)]
    pub model_uid: String,
    /// Owning tenant.
    #[serde(default)]
    pub tenant_id: TenantId,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Instance {
    /// Creates an instance with no attributes.
    pub fn new(id: i64, tenant_id: impl Into<TenantId>, asset_name: impl Into<String>) -> Self {
        Self {
            id,
            tenant_id: tenant_id.into(),
            asset_name: asset_name.into(),
            ..Default::default()
        }
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets a tag in the nested `tags` attribute map, creating it if needed.
    ///
    /// A non-map `tags` attribute is replaced.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let tags = self
            .attributes
            .entry(TAGS_ATTRIBUTE.to_string())
            .or_insert_with(|| AttrValue::Map(BTreeMap::new()));
        if !matches!(tags, AttrValue::Map(_)) {
            *tags = AttrValue::Map(BTreeMap::new());
        }
        if let AttrValue::Map(map) = tags {
            map.insert(key.into(), AttrValue::String(value.into()));
        }
        self
    }

    /// Returns a string attribute.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttrValue::as_str)
    }

    /// Returns a string tag from the nested `tags` map.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(TAGS_ATTRIBUTE)
            .and_then(AttrValue::as_map)
            .and_then(|tags| tags.get(key))
            .and_then(AttrValue::as_str)
    }

    /// Reads a field for condition matching.
    ///
    /// Missing fields, unknown fields and non-string values all read as `""`.
    pub fn field_value(&self, field: &FieldPath) -> &str {
        match field {
            FieldPath::Name => &self.asset_name,
            FieldPath::AssetId => &self.asset_id,
            FieldPath::ModelUid => &self.model_uid,
            FieldPath::Attribute(key) => self.attribute_str(key).unwrap_or(""),
            FieldPath::Tag(key) => self.tag(key).unwrap_or(""),
            FieldPath::Unknown(_) => "",
        }
    }
}

/// Page request against the resource inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFilter {
    /// Tenant to list.
    pub tenant_id: TenantId,
    /// Only instances of this model.
    pub model_uid: Option<String>,
    /// Number of instances to skip.
    #[serde(default)]
    pub offset: u64,
    /// Maximum number of instances to return.
    pub limit: Option<u64>,
}

impl InstanceFilter {
    /// Requests one page of a tenant's instances.
    pub fn page(tenant_id: impl Into<TenantId>, offset: u64, limit: u64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            model_uid: None,
            offset,
            limit: Some(limit),
        }
    }

    /// Returns `true` if the instance belongs to the filtered tenant and model.
    pub fn matches(&self, instance: &Instance) -> bool {
        instance.tenant_id == self.tenant_id
            && self
                .model_uid
                .as_deref()
                .filter(|m| !m.is_empty())
                .is_none_or(|m| instance.model_uid == m)
    }
}
