//! Domain types for the Corral inventory.
//!
//! These types mirror the documents kept by the replication substrate:
//! workload descriptions, placed instances, hosts, and the network and
//! storage topology hosts are attached to. All types serialize to JSON,
//! which is also the shape query criteria are evaluated against.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, InventoryResult};

/// Unique identifier for a host in a resource pool.
pub type HostId = String;

/// Unique identifier for a workload description.
pub type DescriptionId = String;

// ── Records ───────────────────────────────────────────────────────

/// The kinds of documents the inventory can answer queries about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Description,
    Instance,
    Host,
    Subnet,
    Network,
    Datastore,
    ResourceGroup,
    Endpoint,
    Disk,
    Volume,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Description => "description",
            RecordKind::Instance => "instance",
            RecordKind::Host => "host",
            RecordKind::Subnet => "subnet",
            RecordKind::Network => "network",
            RecordKind::Datastore => "datastore",
            RecordKind::ResourceGroup => "resource_group",
            RecordKind::Endpoint => "endpoint",
            RecordKind::Disk => "disk",
            RecordKind::Volume => "volume",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw inventory document.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: RecordKind,
    pub id: String,
    pub body: serde_json::Value,
}

impl Record {
    /// Build a record from any serializable domain type.
    pub fn from_typed<T: Serialize>(kind: RecordKind, id: &str, value: &T) -> InventoryResult<Self> {
        let body = serde_json::to_value(value).map_err(InventoryError::encode(kind.as_str()))?;
        Ok(Self {
            kind,
            id: id.to_string(),
            body,
        })
    }

    /// Decode the document body into a typed domain value.
    pub fn decode<T: DeserializeOwned>(&self) -> InventoryResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(InventoryError::decode(format!("{} {}", self.kind, self.id)))
    }
}

/// Associates a domain type with its record kind and document id.
pub trait Document: Serialize + DeserializeOwned {
    const KIND: RecordKind;

    fn document_id(&self) -> &str;
}

// ── Workload description ──────────────────────────────────────────

/// Specification of a workload to be placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkloadDescription {
    pub id: DescriptionId,
    pub name: String,
    /// Affinity entries, `[!]name[:hard|:soft]`.
    #[serde(default)]
    pub affinity: Vec<String>,
    /// Declared cluster size (number of identical members).
    #[serde(default)]
    pub cluster_size: Option<u32>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterfaceSpec>,
    /// Links to the disks attached to this workload.
    #[serde(default)]
    pub disk_links: Vec<String>,
    #[serde(default)]
    pub load_balancer: Option<LoadBalancerSpec>,
    /// Volume mounts, `source:/mount/point`. A source that is not a path
    /// names a volume.
    #[serde(default)]
    pub volumes: Vec<String>,
}

/// A network attachment requested by a workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkInterfaceSpec {
    pub network_name: String,
    pub network_type: NetworkType,
}

/// How a requested network is provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    Public,
    Private,
    /// Created on demand for the placement; needs no existing connectivity.
    Isolated,
}

/// Load balancer settings when the workload fronts other workloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoadBalancerSpec {
    /// Names of the workload descriptions this balancer routes to.
    #[serde(default)]
    pub backend_names: Vec<String>,
    /// Names of the networks the balancer must be reachable on.
    #[serde(default)]
    pub network_names: Vec<String>,
}

// ── Placed instances ──────────────────────────────────────────────

/// A resource already provisioned from some description on some host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlacedInstance {
    pub id: String,
    pub name: String,
    pub description_link: DescriptionId,
    pub host_id: HostId,
    pub placement_group_id: String,
}

// ── Hosts and topology ────────────────────────────────────────────

/// A compute host that can receive workloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HostState {
    pub id: HostId,
    pub name: String,
    /// Endpoint (cloud account / vCenter) the host belongs to.
    pub endpoint_id: String,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
    /// Precomputed membership links (`/resources/groups/network-*`, `.../datastore-*`).
    #[serde(default)]
    pub group_links: Vec<String>,
    #[serde(default)]
    pub resource_pool_ids: Vec<String>,
    /// Physical memory in bytes.
    #[serde(default)]
    pub total_memory_bytes: u64,
    /// Volume drivers the host can mount.
    #[serde(default)]
    pub volume_drivers: Vec<String>,
}

/// A subnet reachable from hosts in a region/zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubnetState {
    pub id: String,
    pub name: String,
    /// The network this subnet belongs to; absent for standalone subnets.
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
}

/// A named network made of one or more subnets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkState {
    pub id: String,
    pub name: String,
}

/// A datastore hosts can allocate disks on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatastoreState {
    pub id: String,
    pub name: String,
    pub endpoint_id: String,
    #[serde(default)]
    pub region_id: Option<String>,
}

/// A precomputed grouping; its target is the grouped resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceGroupState {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub target_link: Option<String>,
}

/// The owning endpoint of a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointState {
    pub id: String,
    /// Whether the endpoint models datastores at all.
    #[serde(default)]
    pub supports_datastores: bool,
}

/// A disk requested by a workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskState {
    pub id: String,
    pub name: String,
    pub capacity_mb: u64,
}

impl DiskState {
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_mb.saturating_mul(1024 * 1024)
    }
}

/// A provisioned volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VolumeState {
    pub id: String,
    pub name: String,
    pub driver: String,
    /// Created outside any placement and shared by name.
    #[serde(default)]
    pub external: bool,
    /// Hosts the volume is reachable from.
    #[serde(default)]
    pub host_ids: Vec<HostId>,
    /// Placement group the volume was provisioned for, if any.
    #[serde(default)]
    pub placement_group_id: Option<String>,
}

impl VolumeState {
    pub fn is_local(&self) -> bool {
        self.driver == LOCAL_VOLUME_DRIVER
    }
}

/// Driver of volumes that live on a single host.
pub const LOCAL_VOLUME_DRIVER: &str = "local";

// ── Metrics and policy ────────────────────────────────────────────

/// Most recent value of a metric for a resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub value: f64,
    pub timestamp_micros: u64,
}

/// Load policy configured for a resource pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    #[default]
    None,
    Binpack,
    Spread,
}

macro_rules! document {
    ($ty:ty, $kind:expr) => {
        impl Document for $ty {
            const KIND: RecordKind = $kind;

            fn document_id(&self) -> &str {
                &self.id
            }
        }
    };
}

document!(WorkloadDescription, RecordKind::Description);
document!(PlacedInstance, RecordKind::Instance);
document!(HostState, RecordKind::Host);
document!(SubnetState, RecordKind::Subnet);
document!(NetworkState, RecordKind::Network);
document!(DatastoreState, RecordKind::Datastore);
document!(ResourceGroupState, RecordKind::ResourceGroup);
document!(EndpointState, RecordKind::Endpoint);
document!(DiskState, RecordKind::Disk);
document!(VolumeState, RecordKind::Volume);
