//! FusionAuth provider for keyflow
//!
//! This crate implements the `ResourceClient` trait for FusionAuth signing
//! keys, enabling keyflow to generate, rename, rotate and delete keys
//! through the FusionAuth key API.
//!
//! # Requirements
//!
//! - `FUSIONAUTH_HOST` and `FUSIONAUTH_API_KEY` env vars (the API key needs
//!   access to `/api/key`)
//! - `FUSIONAUTH_TENANT_ID` when the API key is not scoped to one tenant
//!
//! # Example
//!
//! ```ignore
//! use keyflow_cloud::ResourceManager;
//! use keyflow_fusionauth::{Algorithm, FusionAuthClient, FusionAuthConfig, SigningKey};
//! use keyflow_fusionauth::key::{LengthPolicy, key_plan_policy};
//! use std::sync::Arc;
//!
//! let client = FusionAuthClient::new(FusionAuthConfig::from_env()?)?;
//! let manager = ResourceManager::new(Arc::new(client), key_plan_policy(&LengthPolicy::default()));
//!
//! let key = SigningKey::new("Access token signing key", Algorithm::Rs256).with_length(2048);
//! let tracked = manager.create(&key).await?;
//! manager.delete(&tracked.id).await?;
//! ```

pub mod api;
pub mod error;
pub mod key;
pub mod provider;

pub use api::{FusionAuthClient, FusionAuthConfig};
pub use error::{FusionAuthError, Result};
pub use key::{Algorithm, LengthPolicy, LengthUpdate, SigningKey, key_plan_policy};
