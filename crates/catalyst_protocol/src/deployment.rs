//! Deployment records exchanged between peers.

use crate::audit::AuditInfo;
use crate::entity::{ContentHash, Entity, EntityId, Timestamp};
use crate::error::{ProtocolError, ProtocolResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Base URL of a peer node, e.g. `https://peer.example.com/content`.
pub type ServerAddress = String;

/// Files uploaded together with a deployment, keyed by content hash.
pub type DeploymentFiles = BTreeMap<ContentHash, Bytes>;

/// An entity together with its provenance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentWithAuditInfo {
    /// The deployed entity.
    pub entity: Entity,
    /// Provenance of the deployment.
    pub audit_info: AuditInfo,
}

impl DeploymentWithAuditInfo {
    /// Creates a deployment record.
    pub fn new(entity: Entity, audit_info: AuditInfo) -> Self {
        Self { entity, audit_info }
    }

    /// Id of the deployed entity.
    pub fn entity_id(&self) -> &EntityId {
        &self.entity.id
    }

    /// Time the reporting peer accepted the deployment. Used as watermark.
    pub fn deployed_timestamp(&self) -> Timestamp {
        self.audit_info.deployed_timestamp
    }
}

/// Pagination block of a deployments page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Opaque, url-safe cursor for the next page. `None` on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// One page of a peer's `deployments` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentsPage {
    /// Deployments ordered by ascending deployed timestamp.
    pub deployments: Vec<DeploymentWithAuditInfo>,
    /// Pagination information.
    #[serde(default)]
    pub pagination: Pagination,
}

impl DeploymentsPage {
    /// Creates a page.
    pub fn new(deployments: Vec<DeploymentWithAuditInfo>, next: Option<String>) -> Self {
        Self {
            deployments,
            pagination: Pagination { next },
        }
    }

    /// Returns true if another page follows this one.
    pub fn has_more(&self) -> bool {
        self.pagination.next.is_some()
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Request for deployments newer than a watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentsRequest {
    /// Only deployments with a deployed timestamp strictly greater are returned.
    pub from_local_timestamp: Timestamp,
    /// Maximum page size.
    pub limit: u32,
    /// Cursor returned by the previous page.
    pub next: Option<String>,
}

impl DeploymentsRequest {
    /// Creates a request for the first page.
    pub fn new(from_local_timestamp: Timestamp, limit: u32) -> Self {
        Self {
            from_local_timestamp,
            limit,
            next: None,
        }
    }

    /// Continues from a pagination cursor.
    pub fn with_next(mut self, next: Option<String>) -> Self {
        self.next = next;
        self
    }

    /// Renders the request as a URL query string (without the leading `?`).
    pub fn to_query_string(&self) -> String {
        let mut query = format!(
            "fromLocalTimestamp={}&limit={}",
            self.from_local_timestamp, self.limit
        );
        if let Some(next) = &self.next {
            query.push_str("&next=");
            query.push_str(next);
        }
        query
    }

    /// Parses a query string rendered by [`to_query_string`](Self::to_query_string).
    ///
    /// Unknown parameters are ignored.
    pub fn from_query_string(query: &str) -> ProtocolResult<Self> {
        let invalid = || ProtocolError::InvalidRequest(query.to_string());
        let mut from = None;
        let mut limit = None;
        let mut next = None;

        for pair in query.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(invalid)?;
            match key {
                "fromLocalTimestamp" => from = Some(value.parse().map_err(|_| invalid())?),
                "limit" => limit = Some(value.parse().map_err(|_| invalid())?),
                "next" => next = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            from_local_timestamp: from.unwrap_or(0),
            limit: limit.ok_or_else(invalid)?,
            next,
        })
    }

    /// Serves this request from a peer's deployments, as a node answering
    /// the `deployments` endpoint would.
    ///
    /// `deployments` need not be sorted. The cursor is the offset of the next
    /// page within the filtered, sorted list.
    pub fn paginate(&self, deployments: &[DeploymentWithAuditInfo]) -> ProtocolResult<DeploymentsPage> {
        let offset = match &self.next {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| ProtocolError::InvalidRequest(format!("bad cursor: {cursor}")))?,
            None => 0,
        };

        let mut newer: Vec<&DeploymentWithAuditInfo> = deployments
            .iter()
            .filter(|d| d.deployed_timestamp() > self.from_local_timestamp)
            .collect();
        newer.sort_by_key(|d| d.deployed_timestamp());

        let limit = self.limit.max(1) as usize;
        let end = offset.saturating_add(limit).min(newer.len());
        let page = newer
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|d| (*d).clone())
            .collect();
        let next = (end < newer.len()).then(|| end.to_string());
        Ok(DeploymentsPage::new(page, next))
    }
}
