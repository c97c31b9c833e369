//! Inventory HTTP client

use crate::error::{InventoryError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use nimbus_cloud::{CloudError, InventoryApi, InventorySystem};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

/// Configuration for the inventory client
#[derive(Debug, Clone)]
pub struct InventoryClientConfig {
    pub base_uri: String,
    pub user: String,
    pub password: String,
}

/// Inventory API client
pub struct InventoryClient {
    client: reqwest::Client,
    base_uri: String,
    authorization: String,
}

/// `Basic base64(user:password)`
pub fn basic_auth_encode(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, password)))
}

impl InventoryClient {
    pub fn new(config: InventoryClientConfig) -> Result<Self> {
        if config.base_uri.trim().is_empty() {
            return Err(InventoryError::InvalidConfig(
                "inventory base_uri is required".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_uri: config.base_uri.trim_end_matches('/').to_string(),
            authorization: basic_auth_encode(&config.user, &config.password),
        })
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Inventory name assigned to a provider instance id
    pub async fn pcm_system_name(&self, instance_id: &str) -> Result<Option<String>> {
        let url = format!("{}/pcmsystemname/{}", self.base_uri, instance_id);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.authorization)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = expect_success(response).await?;
        let body: SystemNameResponse = response.json().await?;
        Ok(body.fqdn.filter(|fqdn| !fqdn.is_empty()))
    }

    /// System record stored under `name`; `None` on 204 or an empty body
    pub async fn system(&self, name: &str) -> Result<Option<InventorySystem>> {
        let url = format!("{}/system/{}", self.base_uri, name);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, &self.authorization)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let response = expect_success(response).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }

    /// Replace the record stored under the system's fqdn
    pub async fn put(&self, system: &InventorySystem) -> Result<()> {
        let url = format!("{}/system/{}", self.base_uri, system.fqdn);
        tracing::info!("Writing inventory record {}", system.fqdn);

        let response = self
            .client
            .put(&url)
            .header(AUTHORIZATION, &self.authorization)
            .json(system)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(InventoryError::RequestFailed {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(InventoryError::RequestFailed {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl InventoryApi for InventoryClient {
    async fn system_name(&self, instance_id: &str) -> nimbus_cloud::Result<Option<String>> {
        self.pcm_system_name(instance_id)
            .await
            .map_err(|e| CloudError::upstream("resolve inventory name", instance_id, e))
    }

    async fn get_system(&self, name: &str) -> nimbus_cloud::Result<Option<InventorySystem>> {
        self.system(name)
            .await
            .map_err(|e| CloudError::upstream("read inventory record", name, e))
    }

    async fn put_system(&self, system: &InventorySystem) -> nimbus_cloud::Result<()> {
        self.put(system)
            .await
            .map_err(|e| CloudError::upstream("write inventory record", &system.fqdn, e))
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct SystemNameResponse {
    #[serde(default)]
    fqdn: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AUTH: &str = "Basic dXNlcjpwYXNz";

    fn client(server: &MockServer) -> InventoryClient {
        InventoryClient::new(InventoryClientConfig {
            base_uri: format!("{}/", server.uri()),
            user: "user".to_string(),
            password: "pass".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_basic_auth_encode() {
        assert_eq!(basic_auth_encode("user", "pass"), AUTH);
    }

    #[test]
    fn test_blank_base_uri_rejected() {
        let result = InventoryClient::new(InventoryClientConfig {
            base_uri: " ".to_string(),
            user: "user".to_string(),
            password: "pass".to_string(),
        });
        assert!(matches!(result, Err(InventoryError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_system_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pcmsystemname/i-42"))
            .and(header("Authorization", AUTH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"fqdn": "web-1.example.com"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pcmsystemname/i-404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(
            client.system_name("i-42").await.unwrap().as_deref(),
            Some("web-1.example.com")
        );
        assert!(client.system_name("i-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_system_absent_forms() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system/empty.example.com"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/system/none.example.com"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/system/broken.example.com"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(client.get_system("empty.example.com").await.unwrap().is_none());
        assert!(client.get_system("none.example.com").await.unwrap().is_none());
        match client.get_system("broken.example.com").await {
            Err(CloudError::Upstream { target, message, .. }) => {
                assert_eq!(target, "broken.example.com");
                assert!(message.contains("503"));
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_system_parses_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system/web-1.example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fqdn": "web-1.example.com",
                "serial_number": "SN-1",
                "pic_instance": "i-42",
                "roles": "web,db",
                "tags": "blue"
            })))
            .mount(&server)
            .await;

        let system = client(&server)
            .get_system("web-1.example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(system.pic_instance.as_deref(), Some("i-42"));
        assert_eq!(system.roles.len(), 2);
        assert!(system.tags.contains("blue"));
    }

    #[tokio::test]
    async fn test_put_system_status_handling() {
        let server = MockServer::start().await;
        let system = InventorySystem::new("web-1.example.com")
            .with_pic_instance("i-42")
            .with_roles(["web"]);

        Mock::given(method("PUT"))
            .and(path("/system/web-1.example.com"))
            .and(header("Authorization", AUTH))
            .and(body_json(json!({
                "fqdn": "web-1.example.com",
                "pic_instance": "i-42",
                "roles": "web",
                "tags": ""
            })))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/system/db-1.example.com"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let client = client(&server);
        client.put_system(&system).await.unwrap();

        let rejected = client
            .put_system(&InventorySystem::new("db-1.example.com"))
            .await;
        assert!(matches!(rejected, Err(CloudError::Upstream { .. })));
    }
}
