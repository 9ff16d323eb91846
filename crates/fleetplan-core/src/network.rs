use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationKind {
    Static,
    Dynamic,
}

/// Network assignment as stored for an instance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAssociation {
    pub instance_id: u64,
    pub network_name: String,
    pub address: IpAddr,
    #[serde(rename = "static", default)]
    pub is_static: bool,
}

impl NetworkAssociation {
    pub fn kind(&self) -> ReservationKind {
        if self.is_static {
            ReservationKind::Static
        } else {
            ReservationKind::Dynamic
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkReservation {
    pub network_name: String,
    pub kind: ReservationKind,
    pub address: Option<IpAddr>,
    pub existing: bool,
    /// Record the reservation was rehydrated from, if any.
    pub instance_record_id: Option<u64>,
}

impl NetworkReservation {
    /// Reservation that still needs an address from the allocator.
    pub fn new_dynamic(network_name: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            kind: ReservationKind::Dynamic,
            address: None,
            existing: false,
            instance_record_id: None,
        }
    }

    pub fn new_static(network_name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            network_name: network_name.into(),
            kind: ReservationKind::Static,
            address: Some(address),
            existing: false,
            instance_record_id: None,
        }
    }

    /// Static reservation whose address the allocator still has to pick.
    pub fn new_static_unassigned(network_name: impl Into<String>) -> Self {
        Self {
            network_name: network_name.into(),
            kind: ReservationKind::Static,
            address: None,
            existing: false,
            instance_record_id: None,
        }
    }

    /// Already-consumed capacity; the address must not be reassigned.
    pub fn existing(association: &NetworkAssociation) -> Self {
        Self {
            network_name: association.network_name.clone(),
            kind: association.kind(),
            address: Some(association.address),
            existing: true,
            instance_record_id: Some(association.instance_id),
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        self.address.is_some()
    }

    pub fn matches(&self, association: &NetworkAssociation) -> bool {
        self.network_name == association.network_name
            && self.kind == association.kind()
            && self.address == Some(association.address)
    }
}

/// Ordered reservations owned by one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceNetworkReservations {
    record_id: Option<u64>,
    reservations: Vec<NetworkReservation>,
}

impl InstanceNetworkReservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_record(record_id: u64, reservations: Vec<NetworkReservation>) -> Self {
        Self {
            record_id: Some(record_id),
            reservations,
        }
    }

    pub fn record_id(&self) -> Option<u64> {
        self.record_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkReservation> {
        self.reservations.iter()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn find_network(&self, network_name: &str) -> Option<&NetworkReservation> {
        self.reservations
            .iter()
            .find(|r| r.network_name == network_name)
    }

    /// First fulfilled address, used as the instance's link address.
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.reservations.iter().find_map(|r| r.address)
    }
}
