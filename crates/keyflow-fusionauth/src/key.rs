//! Signing key resource
//!
//! Declared attributes of a FusionAuth signing key, the algorithm table, and
//! the update-vs-replace policy for key changes.

use crate::error::{FusionAuthError, Result};
use keyflow_cloud::{CloudError, Declared, FieldChange, PlanPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Resource type name in state keys and diagnostics
pub const RESOURCE_TYPE: &str = "fusionauth_key";

const RSA_LENGTHS: &[u32] = &[2048, 3072, 4096];

/// Signing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "ES256")]
    Es256,
    #[serde(rename = "ES384")]
    Es384,
    #[serde(rename = "ES512")]
    Es512,
    #[serde(rename = "HS256")]
    Hs256,
    #[serde(rename = "HS384")]
    Hs384,
    #[serde(rename = "HS512")]
    Hs512,
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "RS384")]
    Rs384,
    #[serde(rename = "RS512")]
    Rs512,
}

impl Algorithm {
    pub const ALL: [Algorithm; 9] = [
        Algorithm::Es256,
        Algorithm::Es384,
        Algorithm::Es512,
        Algorithm::Hs256,
        Algorithm::Hs384,
        Algorithm::Hs512,
        Algorithm::Rs256,
        Algorithm::Rs384,
        Algorithm::Rs512,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Es256 => "ES256",
            Algorithm::Es384 => "ES384",
            Algorithm::Es512 => "ES512",
            Algorithm::Hs256 => "HS256",
            Algorithm::Hs384 => "HS384",
            Algorithm::Hs512 => "HS512",
            Algorithm::Rs256 => "RS256",
            Algorithm::Rs384 => "RS384",
            Algorithm::Rs512 => "RS512",
        }
    }

    /// Whether the algorithm has a configurable key size
    pub fn takes_length(&self) -> bool {
        matches!(self, Algorithm::Rs256 | Algorithm::Rs384 | Algorithm::Rs512)
    }

    /// Accepted key sizes in bits; empty for fixed-size algorithms
    pub fn allowed_lengths(&self) -> &'static [u32] {
        if self.takes_length() { RSA_LENGTHS } else { &[] }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = FusionAuthError;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Algorithm::ALL
            .into_iter()
            .find(|a| a.as_str() == upper)
            .ok_or_else(|| FusionAuthError::UnknownAlgorithm(s.to_string()))
    }
}

/// Declared state of a signing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    /// Caller-supplied or server-generated UUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    pub name: String,

    pub algorithm: Algorithm,

    /// Key size in bits; only meaningful for RSA algorithms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl SigningKey {
    pub fn new(name: impl Into<String>, algorithm: Algorithm) -> Self {
        Self {
            key_id: None,
            name: name.into(),
            algorithm,
            length: None,
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Length as sent to and compared against the remote side
    pub fn effective_length(&self) -> Option<u32> {
        if self.algorithm.takes_length() {
            self.length
        } else {
            None
        }
    }
}

/// Whether `id` is a UUID in hyphenated form
pub fn is_valid_key_id(id: &str) -> bool {
    id.len() == 36 && uuid::Uuid::parse_str(id).is_ok()
}

impl Declared for SigningKey {
    const RESOURCE_TYPE: &'static str = RESOURCE_TYPE;

    fn validate(&self) -> keyflow_cloud::Result<()> {
        if self.name.trim().is_empty() {
            return Err(CloudError::validation(RESOURCE_TYPE, "name is required"));
        }

        if let Some(key_id) = &self.key_id {
            if !is_valid_key_id(key_id) {
                return Err(CloudError::validation(
                    RESOURCE_TYPE,
                    format!("key_id {:?} is not a valid UUID", key_id),
                ));
            }
        }

        if self.algorithm.takes_length() {
            match self.length {
                None => {
                    return Err(CloudError::validation(
                        RESOURCE_TYPE,
                        format!("length is required for {}", self.algorithm),
                    ));
                }
                Some(length) if !self.algorithm.allowed_lengths().contains(&length) => {
                    return Err(CloudError::validation(
                        RESOURCE_TYPE,
                        format!(
                            "length {} is not valid for {} (expected one of {:?})",
                            length,
                            self.algorithm,
                            self.algorithm.allowed_lengths()
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    fn requested_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    fn set_id(&mut self, id: &str) {
        self.key_id = Some(id.to_string());
    }

    fn inherit_computed(&mut self, prior: &Self) {
        if self.key_id.is_none() {
            self.key_id = prior.key_id.clone();
        }
    }
}

/// How a key length change on an RSA key is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LengthUpdate {
    InPlace,
    Replace,
}

impl FromStr for LengthUpdate {
    type Err = FusionAuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in-place" => Ok(LengthUpdate::InPlace),
            "replace" => Ok(LengthUpdate::Replace),
            other => Err(FusionAuthError::InvalidConfig(format!(
                "unknown length update {:?} (expected \"in-place\" or \"replace\")",
                other
            ))),
        }
    }
}

/// Per-algorithm handling of key length changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthPolicy {
    rules: BTreeMap<Algorithm, LengthUpdate>,
}

impl Default for LengthPolicy {
    fn default() -> Self {
        // Generated keys cannot be resized remotely
        let rules = Algorithm::ALL
            .into_iter()
            .filter(Algorithm::takes_length)
            .map(|a| (a, LengthUpdate::Replace))
            .collect();
        Self { rules }
    }
}

impl LengthPolicy {
    pub fn set(&mut self, algorithm: Algorithm, update: LengthUpdate) -> Result<()> {
        if !algorithm.takes_length() {
            return Err(FusionAuthError::InvalidConfig(format!(
                "{} has a fixed key size",
                algorithm
            )));
        }
        self.rules.insert(algorithm, update);
        Ok(())
    }

    pub fn get(&self, algorithm: Algorithm) -> LengthUpdate {
        self.rules
            .get(&algorithm)
            .copied()
            .unwrap_or(LengthUpdate::Replace)
    }
}

/// Update-vs-replace table for signing keys
pub fn key_plan_policy(lengths: &LengthPolicy) -> PlanPolicy<SigningKey> {
    let lengths = lengths.clone();
    PlanPolicy::<SigningKey>::new()
        .replace_on("key_id", |old, new| old.key_id != new.key_id)
        .replace_on("algorithm", |old, new| old.algorithm != new.algorithm)
        .rule(
            "length",
            |old, new| old.effective_length() != new.effective_length(),
            move |old, new| {
                if old.algorithm != new.algorithm || !new.algorithm.takes_length() {
                    return FieldChange::Ignore;
                }
                match lengths.get(new.algorithm) {
                    LengthUpdate::InPlace => FieldChange::Update,
                    LengthUpdate::Replace => FieldChange::Replace,
                }
            },
        )
        .update_on("name", |old, new| old.name != new.name)
}

/// Request body for create
#[derive(Debug, Serialize)]
pub(crate) struct KeyRequest<'a> {
    pub key: WireKeyRequest<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireKeyRequest<'a> {
    pub algorithm: Algorithm,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl<'a> KeyRequest<'a> {
    pub fn from_key(key: &'a SigningKey) -> Self {
        Self {
            key: WireKeyRequest {
                algorithm: key.algorithm,
                name: &key.name,
                length: key.effective_length(),
            },
        }
    }
}

/// Request body for update, carrying only the changed fields
#[derive(Debug, Serialize)]
pub(crate) struct KeyUpdateRequest<'a> {
    pub key: WireKeyUpdate<'a>,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct WireKeyUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<Algorithm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
}

impl<'a> KeyUpdateRequest<'a> {
    pub fn from_changes(key: &'a SigningKey, changed: &[&str]) -> Self {
        let mut wire = WireKeyUpdate::default();
        for field in changed {
            match *field {
                "name" => wire.name = Some(&key.name),
                "length" => wire.length = key.effective_length(),
                "algorithm" => wire.algorithm = Some(key.algorithm),
                other => tracing::debug!(field = other, "Field is not updatable, skipped"),
            }
        }
        Self { key: wire }
    }
}

/// Response body for create, retrieve and update
#[derive(Debug, Deserialize)]
pub(crate) struct KeyResponse {
    pub key: WireKey,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireKey {
    pub id: String,
    pub name: String,
    pub algorithm: Algorithm,
    #[serde(default)]
    pub length: Option<u32>,
}

impl From<WireKey> for SigningKey {
    fn from(wire: WireKey) -> Self {
        let length = if wire.algorithm.takes_length() {
            wire.length
        } else {
            None
        };
        SigningKey {
            key_id: Some(wire.id),
            name: wire.name,
            algorithm: wire.algorithm,
            length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyflow_cloud::PlanDecision;

    const KEY_ID: &str = "6f1c2e4a-8b0d-4c3e-9f7a-1b2c3d4e5f60";

    fn rsa(name: &str, algorithm: Algorithm, length: u32) -> SigningKey {
        SigningKey::new(name, algorithm)
            .with_key_id(KEY_ID)
            .with_length(length)
    }

    #[test]
    fn test_algorithm_parse_and_display() {
        assert_eq!("RS256".parse::<Algorithm>().unwrap(), Algorithm::Rs256);
        assert_eq!("es384".parse::<Algorithm>().unwrap(), Algorithm::Es384);
        assert_eq!(Algorithm::Hs512.to_string(), "HS512");
        assert!("RS1024".parse::<Algorithm>().is_err());

        let json = serde_json::to_string(&Algorithm::Rs512).unwrap();
        assert_eq!(json, "\"RS512\"");
    }

    #[test]
    fn test_update_request_carries_changed_fields_only() {
        let key = rsa("Renamed", Algorithm::Rs256, 4096);

        let body = serde_json::to_value(KeyUpdateRequest::from_changes(&key, &["name"])).unwrap();
        assert_eq!(body, serde_json::json!({"key": {"name": "Renamed"}}));

        let body =
            serde_json::to_value(KeyUpdateRequest::from_changes(&key, &["length", "name"])).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"key": {"name": "Renamed", "length": 4096}})
        );

        let body = serde_json::to_value(KeyUpdateRequest::from_changes(&key, &[])).unwrap();
        assert_eq!(body, serde_json::json!({"key": {}}));
    }

    #[test]
    fn test_length_table() {
        assert_eq!(Algorithm::Rs384.allowed_lengths(), &[2048, 3072, 4096]);
        assert!(Algorithm::Es256.allowed_lengths().is_empty());
        assert!(!Algorithm::Hs256.takes_length());
    }

    #[test]
    fn test_validation() {
        assert!(rsa("access", Algorithm::Rs256, 2048).validate().is_ok());
        assert!(SigningKey::new("hmac", Algorithm::Hs256).validate().is_ok());

        // Length is ignored for fixed-size algorithms
        let ec = SigningKey::new("ec", Algorithm::Es256).with_length(1);
        assert!(ec.validate().is_ok());

        let missing_length = SigningKey::new("rsa", Algorithm::Rs256);
        assert!(missing_length.validate().is_err());

        let bad_length = rsa("rsa", Algorithm::Rs256, 1024);
        assert!(bad_length.validate().is_err());

        let blank = rsa("  ", Algorithm::Rs256, 2048);
        assert!(blank.validate().is_err());

        let bad_id = SigningKey::new("ec", Algorithm::Es256).with_key_id("not-a-uuid");
        let err = bad_id.validate().unwrap_err();
        assert!(err.to_string().contains("not-a-uuid"));

        let simple_form = SigningKey::new("ec", Algorithm::Es256)
            .with_key_id("6f1c2e4a8b0d4c3e9f7a1b2c3d4e5f60");
        assert!(simple_form.validate().is_err());
    }

    #[test]
    fn test_key_id_change_forces_replace() {
        let policy = key_plan_policy(&LengthPolicy::default());
        let old = rsa("access", Algorithm::Rs256, 2048);
        let new = old
            .clone()
            .with_key_id("0b9e7c52-3c41-4d5e-a1f2-93b6c8d7e0aa");

        assert_eq!(policy.plan(&old, &new), PlanDecision::Replace(vec!["key_id"]));
    }

    #[test]
    fn test_algorithm_change_forces_replace() {
        let policy = key_plan_policy(&LengthPolicy::default());
        let old = rsa("access", Algorithm::Rs256, 2048);
        let new = rsa("access", Algorithm::Rs512, 4096);

        // The length rule defers to the algorithm rule
        assert_eq!(policy.plan(&old, &new), PlanDecision::Replace(vec!["algorithm"]));
    }

    #[test]
    fn test_length_change_follows_policy() {
        let old = rsa("access", Algorithm::Rs256, 2048);
        let new = rsa("access", Algorithm::Rs256, 4096);

        let default = key_plan_policy(&LengthPolicy::default());
        assert_eq!(default.plan(&old, &new), PlanDecision::Replace(vec!["length"]));

        let mut lengths = LengthPolicy::default();
        lengths.set(Algorithm::Rs256, LengthUpdate::InPlace).unwrap();
        let in_place = key_plan_policy(&lengths);
        assert_eq!(in_place.plan(&old, &new), PlanDecision::Update(vec!["length"]));
    }

    #[test]
    fn test_length_ignored_for_fixed_size() {
        let policy = key_plan_policy(&LengthPolicy::default());
        let old = SigningKey::new("ec", Algorithm::Es256).with_key_id(KEY_ID);
        let new = old.clone().with_length(4096);

        assert_eq!(policy.plan(&old, &new), PlanDecision::NoOp);
    }

    #[test]
    fn test_name_change_updates_in_place() {
        let policy = key_plan_policy(&LengthPolicy::default());
        let old = rsa("access", Algorithm::Rs256, 2048);
        let new = rsa("access v2", Algorithm::Rs256, 2048);

        assert_eq!(policy.plan(&old, &new), PlanDecision::Update(vec!["name"]));
    }

    #[test]
    fn test_omitted_key_id_is_inherited() {
        let policy = key_plan_policy(&LengthPolicy::default());
        let prior = rsa("access", Algorithm::Rs256, 2048);
        let mut declared = SigningKey::new("access", Algorithm::Rs256).with_length(2048);
        declared.inherit_computed(&prior);

        assert_eq!(declared.key_id.as_deref(), Some(KEY_ID));
        assert_eq!(policy.plan(&prior, &declared), PlanDecision::NoOp);
    }

    #[test]
    fn test_length_policy_rejects_fixed_size() {
        let mut lengths = LengthPolicy::default();
        assert_eq!(lengths.get(Algorithm::Rs384), LengthUpdate::Replace);
        assert!(lengths.set(Algorithm::Es512, LengthUpdate::InPlace).is_err());
        assert_eq!("in-place".parse::<LengthUpdate>().unwrap(), LengthUpdate::InPlace);
        assert!("sometimes".parse::<LengthUpdate>().is_err());
    }

    #[test]
    fn test_wire_mapping_drops_fixed_length() {
        let wire: KeyResponse = serde_json::from_value(serde_json::json!({
            "key": {
                "id": KEY_ID,
                "name": "ec",
                "algorithm": "ES256",
                "length": 256,
                "type": "EC",
                "insertInstant": 1700000000000u64
            }
        }))
        .unwrap();

        let key = SigningKey::from(wire.key);
        assert_eq!(key.key_id.as_deref(), Some(KEY_ID));
        assert_eq!(key.length, None);
    }

    #[test]
    fn test_request_omits_length_for_fixed_size() {
        let ec = SigningKey::new("ec", Algorithm::Es256).with_length(256);
        let body = serde_json::to_value(KeyRequest::from_key(&ec)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"key": {"algorithm": "ES256", "name": "ec"}})
        );

        let rsa = rsa("rsa", Algorithm::Rs256, 2048);
        let body = serde_json::to_value(KeyRequest::from_key(&rsa)).unwrap();
        assert_eq!(body["key"]["length"], 2048);
    }
}
