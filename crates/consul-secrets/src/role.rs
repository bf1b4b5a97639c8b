//! Role definitions.
//!
//! A role is the template for the tokens issued under its name. It is stored
//! under `role/<name>` and rewritten in full on every write.

use crate::capability::{Capability, CapabilitySet};
use crate::error::{EngineError, EngineResult};
use crate::storage::{get_json, put_json, Storage};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

const ROLE_PREFIX: &str = "role/";

fn role_key(name: &str) -> String {
    format!("{ROLE_PREFIX}{name}")
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\w(([\w\-.]+)?\w)?$").expect("role name pattern"))
}

/// Reject names that cannot be used as a path segment.
pub fn validate_name(name: &str) -> EngineResult<()> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "invalid role name '{name}': use letters, digits, '_', '-' or '.', \
             starting and ending with a letter, digit or '_'"
        )))
    }
}

/// Stored role entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default, alias = "policies")]
    pub consul_policies: Vec<String>,

    #[serde(default)]
    pub consul_roles: Vec<String>,

    /// Entries of the form `name[:dc1,dc2]`.
    #[serde(default)]
    pub service_identities: Vec<String>,

    /// Entries of the form `name:dc`.
    #[serde(default)]
    pub node_identities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consul_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    #[serde(default)]
    pub local: bool,

    #[serde(
        default,
        alias = "lease",
        serialize_with = "humantime_serde::serialize",
        deserialize_with = "flexible_duration"
    )]
    pub ttl: Duration,

    #[serde(
        default,
        serialize_with = "humantime_serde::serialize",
        deserialize_with = "flexible_duration"
    )]
    pub max_ttl: Duration,
}

impl Role {
    /// Parse the stored lists into the capability set for a new token.
    ///
    /// Entries are parsed again here because stored data may predate the
    /// current write validation.
    pub fn capabilities(&self) -> EngineResult<CapabilitySet> {
        let mut set = CapabilitySet::new()
            .with_policies(self.consul_policies.iter().cloned())
            .with_roles(self.consul_roles.iter().cloned());
        for entry in &self.service_identities {
            set.push(parse_service_identity(entry)?);
        }
        for entry in &self.node_identities {
            set.push(parse_node_identity(entry)?);
        }
        Ok(set)
    }

    /// Reader-facing view with durations in whole seconds.
    pub fn view(&self) -> RoleView {
        RoleView {
            consul_policies: self.consul_policies.clone(),
            consul_roles: self.consul_roles.clone(),
            service_identities: self.service_identities.clone(),
            node_identities: self.node_identities.clone(),
            consul_namespace: self.consul_namespace.clone().unwrap_or_default(),
            partition: self.partition.clone().unwrap_or_default(),
            local: self.local,
            ttl: self.ttl.as_secs(),
            max_ttl: self.max_ttl.as_secs(),
        }
    }
}

/// What a role read returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleView {
    pub consul_policies: Vec<String>,
    pub consul_roles: Vec<String>,
    pub service_identities: Vec<String>,
    pub node_identities: Vec<String>,
    pub consul_namespace: String,
    pub partition: String,
    pub local: bool,
    pub ttl: u64,
    pub max_ttl: u64,
}

/// A list given either as an array or as one delimited string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StringList {
    List(Vec<String>),
    Joined(String),
}

impl StringList {
    fn into_vec(self, separator: char) -> Vec<String> {
        let items = match self {
            StringList::List(items) => items,
            StringList::Joined(joined) => joined.split(separator).map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// A duration given as integer seconds or as a string like `"10m"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
    Seconds(u64),
    Text(String),
}

impl DurationInput {
    pub fn parse(&self, field: &str) -> EngineResult<Duration> {
        match self {
            DurationInput::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            DurationInput::Text(text) => parse_duration_text(text).ok_or_else(|| {
                EngineError::validation(format!("invalid duration for '{field}': '{text}'"))
            }),
        }
    }
}

fn parse_duration_text(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return Some(Duration::ZERO);
    }
    if let Ok(secs) = text.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(text).ok()
}

fn flexible_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let input = DurationInput::deserialize(deserializer)?;
    match &input {
        DurationInput::Seconds(secs) => Ok(Duration::from_secs(*secs)),
        DurationInput::Text(text) => parse_duration_text(text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{text}'"))),
    }
}

/// Fields accepted by a role write.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleWrite {
    #[serde(default)]
    pub consul_policies: Option<StringList>,
    /// Legacy name for `consul_policies`.
    #[serde(default)]
    pub policies: Option<StringList>,
    #[serde(default)]
    pub consul_roles: Option<StringList>,
    #[serde(default)]
    pub service_identities: Option<StringList>,
    #[serde(default)]
    pub node_identities: Option<StringList>,
    #[serde(default)]
    pub consul_namespace: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub local: Option<bool>,
    #[serde(default)]
    pub ttl: Option<DurationInput>,
    /// Legacy name for `ttl`.
    #[serde(default)]
    pub lease: Option<DurationInput>,
    #[serde(default)]
    pub max_ttl: Option<DurationInput>,
}

/// A validated role plus any warnings for the caller.
#[derive(Debug, Clone)]
pub struct ValidatedRole {
    pub role: Role,
    pub warnings: Vec<String>,
}

/// Pick between a field and its legacy name. The new field wins.
fn prefer<T>(
    current: Option<T>,
    legacy: Option<T>,
    current_name: &str,
    legacy_name: &str,
    warnings: &mut Vec<String>,
) -> Option<T> {
    match (current, legacy) {
        (Some(value), Some(_)) => {
            warnings.push(format!(
                "both '{current_name}' and legacy '{legacy_name}' were supplied; \
                 '{legacy_name}' was ignored"
            ));
            Some(value)
        }
        (Some(value), None) => Some(value),
        (None, legacy) => legacy,
    }
}

impl RoleWrite {
    pub fn validate(self) -> EngineResult<ValidatedRole> {
        let mut warnings = Vec::new();

        let policies = prefer(
            self.consul_policies,
            self.policies,
            "consul_policies",
            "policies",
            &mut warnings,
        );
        let ttl = prefer(self.ttl, self.lease, "ttl", "lease", &mut warnings);

        let role = Role {
            consul_policies: policies.map(|p| p.into_vec(',')).unwrap_or_default(),
            consul_roles: self
                .consul_roles
                .map(|r| r.into_vec(','))
                .unwrap_or_default(),
            service_identities: self
                .service_identities
                .map(|s| s.into_vec(';'))
                .unwrap_or_default(),
            node_identities: self
                .node_identities
                .map(|n| n.into_vec(','))
                .unwrap_or_default(),
            consul_namespace: self.consul_namespace.filter(|s| !s.trim().is_empty()),
            partition: self.partition.filter(|s| !s.trim().is_empty()),
            local: self.local.unwrap_or(false),
            ttl: ttl.map(|t| t.parse("ttl")).transpose()?.unwrap_or_default(),
            max_ttl: self
                .max_ttl
                .map(|t| t.parse("max_ttl"))
                .transpose()?
                .unwrap_or_default(),
        };

        // Parses every identity, so malformed entries are rejected here.
        if role.capabilities()?.is_empty() {
            return Err(EngineError::validation(
                "at least one of consul_policies, consul_roles, service_identities \
                 or node_identities must be set",
            ));
        }

        if !role.max_ttl.is_zero() && !role.ttl.is_zero() && role.max_ttl < role.ttl {
            return Err(EngineError::validation(format!(
                "ttl ({}s) must not exceed max_ttl ({}s)",
                role.ttl.as_secs(),
                role.max_ttl.as_secs()
            )));
        }

        Ok(ValidatedRole { role, warnings })
    }
}

fn parse_service_identity(entry: &str) -> EngineResult<Capability> {
    let (name, datacenters) = match entry.split_once(':') {
        Some((name, dcs)) => (
            name.trim(),
            dcs.split(',')
                .map(|dc| dc.trim().to_string())
                .filter(|dc| !dc.is_empty())
                .collect(),
        ),
        None => (entry.trim(), Vec::new()),
    };
    if name.is_empty() {
        return Err(EngineError::validation(format!(
            "invalid service identity '{entry}': service name is empty"
        )));
    }
    Ok(Capability::ServiceIdentity {
        name: name.to_string(),
        datacenters,
    })
}

fn parse_node_identity(entry: &str) -> EngineResult<Capability> {
    match entry.split_once(':') {
        Some((name, dc)) if !name.trim().is_empty() && !dc.trim().is_empty() => {
            Ok(Capability::NodeIdentity {
                name: name.trim().to_string(),
                datacenter: dc.trim().to_string(),
            })
        }
        _ => Err(EngineError::validation(format!(
            "invalid node identity '{entry}': expected 'name:datacenter'"
        ))),
    }
}

/// Validate and store a role. Returns warnings for the caller.
pub async fn write_role(
    storage: &dyn Storage,
    name: &str,
    input: RoleWrite,
) -> EngineResult<Vec<String>> {
    validate_name(name)?;
    let ValidatedRole { role, warnings } = input.validate()?;
    for warning in &warnings {
        warn!(role = %name, "{warning}");
    }
    put_json(storage, &role_key(name), &role).await?;
    info!(role = %name, "role written");
    Ok(warnings)
}

pub async fn read_role(storage: &dyn Storage, name: &str) -> EngineResult<Option<Role>> {
    validate_name(name)?;
    get_json(storage, &role_key(name)).await
}

/// Role names in lexical order.
pub async fn list_roles(storage: &dyn Storage) -> EngineResult<Vec<String>> {
    Ok(storage.list(ROLE_PREFIX).await?)
}

/// Delete a role. Deleting a missing role succeeds.
pub async fn delete_role(storage: &dyn Storage, name: &str) -> EngineResult<()> {
    validate_name(name)?;
    storage.delete(&role_key(name)).await?;
    debug!(role = %name, "role deleted");
    Ok(())
}
