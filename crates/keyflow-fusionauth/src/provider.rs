//! Signing key CRUD against the FusionAuth key API

use crate::api::FusionAuthClient;
use crate::key::{KeyRequest, KeyResponse, KeyUpdateRequest, SigningKey};
use async_trait::async_trait;
use keyflow_cloud::{OperationResult, RemoteResource, ResourceClient};
use reqwest::Method;

fn into_remote(response: KeyResponse) -> RemoteResource<SigningKey> {
    let key = SigningKey::from(response.key);
    let id = key.key_id.clone().unwrap_or_default();
    RemoteResource::new(id, key)
}

#[async_trait]
impl ResourceClient for FusionAuthClient {
    type Attributes = SigningKey;

    async fn create(
        &self,
        id: Option<&str>,
        attributes: &SigningKey,
    ) -> OperationResult<RemoteResource<SigningKey>> {
        let path = match id {
            Some(id) => format!("/api/key/generate/{}", id),
            None => "/api/key/generate".to_string(),
        };
        let request = self
            .request(Method::POST, &path)
            .json(&KeyRequest::from_key(attributes));

        self.send_json::<KeyResponse>(request).await.map(into_remote)
    }

    async fn retrieve(&self, id: &str) -> OperationResult<RemoteResource<SigningKey>> {
        let request = self.request(Method::GET, &format!("/api/key/{}", id));
        self.send_json::<KeyResponse>(request).await.map(into_remote)
    }

    async fn update(
        &self,
        id: &str,
        attributes: &SigningKey,
        changed: &[&'static str],
    ) -> OperationResult<RemoteResource<SigningKey>> {
        tracing::debug!(%id, ?changed, "Updating signing key");
        let request = self
            .request(Method::PUT, &format!("/api/key/{}", id))
            .json(&KeyUpdateRequest::from_changes(attributes, changed));

        self.send_json::<KeyResponse>(request).await.map(into_remote)
    }

    async fn delete(&self, id: &str) -> OperationResult<()> {
        let request = self.request(Method::DELETE, &format!("/api/key/{}", id));
        self.send_empty(request).await
    }
}
