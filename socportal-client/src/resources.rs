//! Portal resource collections

use crate::client::PortalClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use socportal_core::PortalResult;

/// Collections served by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Agents,
    Alerts,
    Cases,
    Vulnerabilities,
    Indices,
    Pipelines,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Agents,
        ResourceKind::Alerts,
        ResourceKind::Cases,
        ResourceKind::Vulnerabilities,
        ResourceKind::Indices,
        ResourceKind::Pipelines,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            ResourceKind::Agents => "/agents",
            ResourceKind::Alerts => "/alerts",
            ResourceKind::Cases => "/cases",
            ResourceKind::Vulnerabilities => "/vulnerabilities",
            ResourceKind::Indices => "/indices",
            ResourceKind::Pipelines => "/pipelines",
        }
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("{}/{}", self.path(), urlencoding::encode(id))
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path().trim_start_matches('/'))
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('/').to_lowercase();
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.to_string() == name)
            .ok_or_else(|| {
                format!(
                    "Unknown resource: {} (expected one of agents, alerts, cases, vulnerabilities, indices, pipelines)",
                    s
                )
            })
    }
}

/// Typed access to one collection
pub struct Resources<'a> {
    client: &'a PortalClient,
    kind: ResourceKind,
}

impl PortalClient {
    pub fn resource(&self, kind: ResourceKind) -> Resources<'_> {
        Resources { client: self, kind }
    }
}

impl Resources<'_> {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// All items of the collection
    pub async fn list(&self) -> PortalResult<Vec<Value>> {
        let body: Value = self.client.get(self.kind.path()).await?;
        Ok(into_items(body))
    }

    /// Items matching `query` (filters, paging)
    pub async fn list_with<Q: Serialize + ?Sized>(&self, query: &Q) -> PortalResult<Vec<Value>> {
        let body: Value = self.client.get_with_query(self.kind.path(), query).await?;
        Ok(into_items(body))
    }

    pub async fn get(&self, id: &str) -> PortalResult<Value> {
        self.client.get(&self.kind.item_path(id)).await
    }

    pub async fn delete(&self, id: &str) -> PortalResult<()> {
        self.client.delete(&self.kind.item_path(id)).await
    }
}

/// Lists arrive either bare or wrapped in `items`, `data` or `results`
fn into_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for field in ["items", "data", "results"] {
                if map.get(field).is_some_and(Value::is_array) {
                    if let Some(Value::Array(items)) = map.remove(field) {
                        return items;
                    }
                }
            }
            vec![Value::Object(map)]
        }
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
