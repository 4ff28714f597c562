//! Resource Manager REST clients.

use crate::auth::Capability;
use crate::client::{
    BackupPoliciesClient, ClientFactory, PageCursor, ProtectedItemsClient, VaultsClient,
};
use crate::filter::ProtectedItemFilter;
use crate::{
    Config, ProtectedItemResource, ProtectionPolicyResource, RecoveryError, Result, Vault,
};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

/// API version of the vaults resource.
pub const VAULTS_API_VERSION: &str = "2016-06-01";

/// API version of the backup policy and protected item resources.
pub const BACKUP_API_VERSION: &str = "2020-02-02";

const REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Builds clients that talk to the Resource Manager endpoint.
///
/// One HTTP connection pool is shared by every client this factory builds.
///
/// # Example
///
/// ```
/// use recoveryvault::backends::arm::ArmClientFactory;
/// use recoveryvault::{Config, ProviderType};
///
/// let config = Config::new(ProviderType::ResourceManager)
///     .with_option("endpoint", "http://127.0.0.1:8080/");
/// let factory = ArmClientFactory::new(&config).unwrap();
/// assert_eq!(factory.endpoint(), "http://127.0.0.1:8080");
/// ```
#[derive(Debug, Clone)]
pub struct ArmClientFactory {
    http: reqwest::Client,
    endpoint: String,
}

impl ArmClientFactory {
    /// Creates a factory for the configured cloud or `endpoint` override.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint is not an absolute URL or the HTTP client cannot
    /// be built.
    pub fn new(config: &Config) -> Result<Self> {
        let endpoint = config.management_endpoint();
        Url::parse(&endpoint)
            .map_err(|e| RecoveryError::Transport(format!("invalid endpoint {}: {}", endpoint, e)))?;

        let user_agent = config.get_option("user_agent").cloned().unwrap_or_else(|| {
            format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        });

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| RecoveryError::Transport(format!("building HTTP client: {}", e)))?;

        Ok(Self { http, endpoint })
    }

    /// The management endpoint requests go to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport(&self, subscription_id: &str, capability: Capability) -> Transport {
        Transport {
            http: self.http.clone(),
            endpoint: self.endpoint.clone(),
            subscription_id: subscription_id.to_string(),
            capability,
        }
    }
}

impl ClientFactory for ArmClientFactory {
    fn name(&self) -> &str {
        "arm"
    }

    fn vaults(&self, subscription_id: &str, capability: Capability) -> Box<dyn VaultsClient> {
        Box::new(self.transport(subscription_id, capability))
    }

    fn backup_policies(
        &self,
        subscription_id: &str,
        capability: Capability,
    ) -> Box<dyn BackupPoliciesClient> {
        Box::new(self.transport(subscription_id, capability))
    }

    fn protected_items(
        &self,
        subscription_id: &str,
        capability: Capability,
    ) -> Box<dyn ProtectedItemsClient> {
        Box::new(self.transport(subscription_id, capability))
    }
}

#[derive(Debug, Deserialize)]
struct ArmErrorEnvelope {
    error: Option<ArmErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// One page of an ARM list response.
#[derive(Debug, Deserialize)]
struct ArmPage<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

/// Subscription-scoped request builder carrying one capability.
#[derive(Clone)]
struct Transport {
    http: reqwest::Client,
    endpoint: String,
    subscription_id: String,
    capability: Capability,
}

impl Transport {
    /// URL of `vault_name`, or of a collection beneath it.
    fn vault_url(
        &self,
        resource_group: &str,
        vault_name: &str,
        collection: Option<&str>,
        api_version: &str,
    ) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| RecoveryError::Transport(format!("invalid endpoint: {}", e)))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                RecoveryError::Transport(format!("endpoint {} cannot carry a path", self.endpoint))
            })?;
            segments.pop_if_empty().extend([
                "subscriptions",
                self.subscription_id.as_str(),
                "resourceGroups",
                resource_group,
                "providers",
                "Microsoft.RecoveryServices",
                "vaults",
                vault_name,
            ]);
            if let Some(collection) = collection {
                segments.push(collection);
            }
        }
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    /// Checks that a server-provided link stays on the management endpoint.
    fn next_page_url(&self, link: &str) -> Result<Url> {
        let url = Url::parse(link)
            .map_err(|e| RecoveryError::Transport(format!("invalid nextLink {}: {}", link, e)))?;
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| RecoveryError::Transport(format!("invalid endpoint: {}", e)))?;
        if url.origin() != endpoint.origin() {
            return Err(RecoveryError::Transport(format!(
                "nextLink {} leaves the management endpoint",
                link
            )));
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(url = %url, request_id = %request_id, "ARM GET");

        let resp = self
            .http
            .get(url.clone())
            .bearer_auth(self.capability.token())
            .header(REQUEST_ID_HEADER, &request_id)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| RecoveryError::Transport(format!("GET {}: {}", url.path(), e)))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| RecoveryError::Transport(format!("GET {}: {}", url.path(), e)))?;

        if status == StatusCode::NOT_FOUND {
            return Err(RecoveryError::NotFound(url.path().to_string()));
        }

        if !status.is_success() {
            return Err(parse_arm_error(status, &body));
        }

        Ok(serde_json::from_slice(&body)?)
    }

    async fn first_page<T>(&self, url: Url) -> Result<Box<dyn PageCursor<T>>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let first = url.to_string();
        let page: ArmPage<T> = self.get_json(url).await?;
        Ok(Box::new(ArmCursor {
            transport: self.clone(),
            page: page.value,
            next_link: page.next_link.filter(|l| !l.is_empty()),
            visited: HashSet::from([first]),
            exhausted: false,
        }))
    }
}

/// Builds an [`RecoveryError::Http`] from a failed response.
fn parse_arm_error(status: StatusCode, body: &[u8]) -> RecoveryError {
    let parsed = serde_json::from_slice::<ArmErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error);

    let (code, message) = match parsed {
        Some(err) => (err.code, err.message),
        None => (None, None),
    };

    RecoveryError::Http {
        status: status.as_u16(),
        code: code.unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string()),
        message: message.unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string()),
    }
}

#[async_trait]
impl VaultsClient for Transport {
    async fn get(&self, resource_group: &str, vault_name: &str) -> Result<Vault> {
        let url = self.vault_url(resource_group, vault_name, None, VAULTS_API_VERSION)?;
        self.get_json(url).await
    }
}

#[async_trait]
impl BackupPoliciesClient for Transport {
    async fn list(
        &self,
        vault_name: &str,
        resource_group: &str,
    ) -> Result<Box<dyn PageCursor<ProtectionPolicyResource>>> {
        let url = self.vault_url(
            resource_group,
            vault_name,
            Some("backupPolicies"),
            BACKUP_API_VERSION,
        )?;
        self.first_page(url).await
    }
}

#[async_trait]
impl ProtectedItemsClient for Transport {
    async fn list(
        &self,
        vault_name: &str,
        resource_group: &str,
        filter: &ProtectedItemFilter,
    ) -> Result<Box<dyn PageCursor<ProtectedItemResource>>> {
        let mut url = self.vault_url(
            resource_group,
            vault_name,
            Some("backupProtectedItems"),
            BACKUP_API_VERSION,
        )?;
        url.query_pairs_mut().append_pair("$filter", &filter.to_odata());
        self.first_page(url).await
    }
}

/// Cursor following `nextLink` until the service stops returning one.
///
/// A link that points back at a page already fetched ends the listing
/// with an error.
struct ArmCursor<T> {
    transport: Transport,
    page: Vec<T>,
    next_link: Option<String>,
    visited: HashSet<String>,
    exhausted: bool,
}

#[async_trait]
impl<T> PageCursor<T> for ArmCursor<T>
where
    T: DeserializeOwned + Send + Sync,
{
    fn has_more(&self) -> bool {
        !self.exhausted
    }

    fn current(&self) -> &[T] {
        if self.exhausted {
            &[]
        } else {
            &self.page
        }
    }

    async fn advance(&mut self) -> Result<()> {
        let Some(link) = self.next_link.take() else {
            self.exhausted = true;
            self.page.clear();
            return Ok(());
        };

        let url = self.transport.next_page_url(&link)?;
        if !self.visited.insert(url.to_string()) {
            return Err(RecoveryError::Transport(format!(
                "nextLink {} repeats a page already fetched",
                link
            )));
        }
        let page: ArmPage<T> = self.transport.get_json(url).await?;
        self.page = page.value;
        self.next_link = page.next_link.filter(|l| !l.is_empty());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderType;
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    const VAULT_PATH: &str = "/subscriptions/sub-1/resourceGroups/rg-1/providers/Microsoft.RecoveryServices/vaults/vault-A";

    fn factory(server: &MockServer) -> ArmClientFactory {
        let config =
            Config::new(ProviderType::ResourceManager).with_option("endpoint", server.uri());
        ArmClientFactory::new(&config).unwrap()
    }

    fn capability() -> Capability {
        Capability::new("fake-token")
    }

    async fn drain<T: Clone>(mut cursor: Box<dyn PageCursor<T>>) -> Result<Vec<Vec<T>>> {
        let mut pages = Vec::new();
        while cursor.has_more() {
            pages.push(cursor.current().to_vec());
            cursor.advance().await?;
        }
        Ok(pages)
    }

    #[tokio::test]
    async fn test_get_vault_sends_auth_and_api_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VAULT_PATH))
            .and(query_param("api-version", VAULTS_API_VERSION))
            .and(header("authorization", "Bearer fake-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": VAULT_PATH,
                "name": "vault-A",
                "type": "Microsoft.RecoveryServices/vaults",
                "location": "westeurope",
                "sku": { "name": "Standard" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let vault = factory(&server)
            .vaults("sub-1", capability())
            .get("rg-1", "vault-A")
            .await
            .unwrap();

        assert_eq!(vault.name.as_deref(), Some("vault-A"));
        assert_eq!(vault.location.as_deref(), Some("westeurope"));
    }

    #[tokio::test]
    async fn test_request_id_header_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VAULT_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "vault-A" })))
            .mount(&server)
            .await;

        factory(&server)
            .vaults("sub-1", capability())
            .get("rg-1", "vault-A")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let request_id = requests[0].headers.get(REQUEST_ID_HEADER).unwrap();
        assert!(uuid::Uuid::parse_str(request_id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_get_vault_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VAULT_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": "ResourceNotFound", "message": "vault not found" }
            })))
            .mount(&server)
            .await;

        let result = factory(&server)
            .vaults("sub-1", capability())
            .get("rg-1", "vault-A")
            .await;

        assert!(matches!(result, Err(RecoveryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_arm_error_envelope_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VAULT_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": "AuthorizationFailed",
                    "message": "The client does not have authorization"
                }
            })))
            .mount(&server)
            .await;

        let err = factory(&server)
            .vaults("sub-1", capability())
            .get("rg-1", "vault-A")
            .await
            .unwrap_err();

        match err {
            RecoveryError::Http {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(code, "AuthorizationFailed");
                assert!(message.contains("does not have authorization"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(VAULT_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = factory(&server)
            .vaults("sub-1", capability())
            .get("rg-1", "vault-A")
            .await
            .unwrap_err();

        match err {
            RecoveryError::Http { status, code, message } => {
                assert_eq!(status, 502);
                assert_eq!(code, "Bad Gateway");
                assert_eq!(message, "bad gateway");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_policies_follow_next_link() {
        let server = MockServer::start().await;
        let list_path = format!("{}/backupPolicies", VAULT_PATH);

        Mock::given(method("GET"))
            .and(path(list_path.as_str()))
            .and(query_param("skipToken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [ { "name": "p3" } ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(list_path.as_str()))
            .and(query_param("api-version", BACKUP_API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [ { "name": "p1" }, { "name": "p2" } ],
                "nextLink": format!(
                    "{}{}?api-version={}&skipToken=page2",
                    server.uri(),
                    list_path,
                    BACKUP_API_VERSION
                )
            })))
            .mount(&server)
            .await;

        let cursor = BackupPoliciesClient::list(
            &*factory(&server).backup_policies("sub-1", capability()),
            "vault-A",
            "rg-1",
        )
        .await
        .unwrap();

        let pages = drain(cursor).await.unwrap();
        let names: Vec<Vec<String>> = pages
            .iter()
            .map(|page| page.iter().filter_map(|p| p.name.clone()).collect())
            .collect();
        assert_eq!(names, vec![vec!["p1", "p2"], vec!["p3"]]);
    }

    #[tokio::test]
    async fn test_protected_items_send_filter() {
        let server = MockServer::start().await;
        let filter = ProtectedItemFilter::vms_for_policy("policyA").unwrap();

        Mock::given(method("GET"))
            .and(path(format!("{}/backupProtectedItems", VAULT_PATH)))
            .and(query_param("$filter", filter.to_odata()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "name": "VM;iaasvmcontainerv2;rg-1;vm-1",
                    "properties": {
                        "protectedItemType": "Microsoft.Compute/virtualMachines",
                        "friendlyName": "vm-1",
                        "policyName": "policyA",
                        "backupManagementType": "AzureIaasVM",
                        "workloadType": "VM"
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cursor = ProtectedItemsClient::list(
            &*factory(&server).protected_items("sub-1", capability()),
            "vault-A",
            "rg-1",
            &filter,
        )
        .await
        .unwrap();

        let pages = drain(cursor).await.unwrap();
        assert_eq!(pages.len(), 1);
        let vm = pages[0][0].properties.as_compute_vm().unwrap();
        assert_eq!(vm.friendly_name.as_deref(), Some("vm-1"));
    }

    #[tokio::test]
    async fn test_second_page_failure_surfaces() {
        let server = MockServer::start().await;
        let list_path = format!("{}/backupPolicies", VAULT_PATH);

        Mock::given(method("GET"))
            .and(path(list_path.as_str()))
            .and(query_param("skipToken", "page2"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": { "code": "InternalError", "message": "try again later" }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(list_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [ { "name": "p1" } ],
                "nextLink": format!("{}{}?skipToken=page2", server.uri(), list_path)
            })))
            .mount(&server)
            .await;

        let cursor = BackupPoliciesClient::list(
            &*factory(&server).backup_policies("sub-1", capability()),
            "vault-A",
            "rg-1",
        )
        .await
        .unwrap();

        let result = drain(cursor).await;
        assert!(matches!(result, Err(RecoveryError::Http { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_foreign_next_link_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/backupPolicies", VAULT_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [],
                "nextLink": "https://attacker.example.com/steal"
            })))
            .mount(&server)
            .await;

        let cursor = BackupPoliciesClient::list(
            &*factory(&server).backup_policies("sub-1", capability()),
            "vault-A",
            "rg-1",
        )
        .await
        .unwrap();

        let result = drain(cursor).await;
        assert!(matches!(result, Err(RecoveryError::Transport(_))));
    }

    #[tokio::test]
    async fn test_repeated_next_link_stops_listing() {
        let server = MockServer::start().await;
        let list_path = format!("{}/backupPolicies", VAULT_PATH);
        let looping = format!("{}{}?skipToken=again", server.uri(), list_path);

        // Every page, the linked one included, points at the same link
        Mock::given(method("GET"))
            .and(path(list_path.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [ { "name": "p1" } ],
                "nextLink": looping
            })))
            .expect(2)
            .mount(&server)
            .await;

        let cursor = BackupPoliciesClient::list(
            &*factory(&server).backup_policies("sub-1", capability()),
            "vault-A",
            "rg-1",
        )
        .await
        .unwrap();

        match drain(cursor).await {
            Err(RecoveryError::Transport(msg)) => assert!(msg.contains("repeats")),
            other => panic!("unexpected result: {:?}", other.map(|pages| pages.len())),
        }
    }

    #[tokio::test]
    async fn test_malformed_vm_does_not_fail_the_page() {
        let server = MockServer::start().await;
        let filter = ProtectedItemFilter::vms_for_policy("policyA").unwrap();

        Mock::given(method("GET"))
            .and(path(format!("{}/backupProtectedItems", VAULT_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {
                        "name": "VM;iaasvmcontainerv2;rg-1;vm-good",
                        "properties": {
                            "protectedItemType": "Microsoft.Compute/virtualMachines",
                            "friendlyName": "vm-good",
                            "policyName": "policyA"
                        }
                    },
                    {
                        "name": "VM;iaasvmcontainerv2;rg-1;vm-bad",
                        "properties": {
                            "protectedItemType": "Microsoft.Compute/virtualMachines",
                            "friendlyName": "vm-bad",
                            "policyName": "policyA",
                            "lastBackupTime": ""
                        }
                    }
                ]
            })))
            .mount(&server)
            .await;

        let cursor = ProtectedItemsClient::list(
            &*factory(&server).protected_items("sub-1", capability()),
            "vault-A",
            "rg-1",
            &filter,
        )
        .await
        .unwrap();

        let pages = drain(cursor).await.unwrap();
        assert_eq!(pages[0].len(), 2);
        assert!(pages[0][0].properties.as_compute_vm().is_some());
        assert!(matches!(
            pages[0][1].properties,
            crate::ProtectedItem::Malformed { .. }
        ));
    }

    #[test]
    fn test_invalid_endpoint() {
        let config =
            Config::new(ProviderType::ResourceManager).with_option("endpoint", "not a url");
        assert!(ArmClientFactory::new(&config).is_err());
    }
}
