use fleetplan_core::{
    Instance, InstanceGroup, InstanceModel, InstanceNetworkReservations, NetworkAssociation,
    NetworkReservation,
};
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::{debug, warn};

/// Turns stored network associations into reservations, and works out which
/// networks an instance still needs addresses on
pub struct NetworkReservationMaterializer;

impl NetworkReservationMaterializer {
    /// Reservations for every association stored on `record`, in stored
    /// order. Each one is marked existing so the allocator treats it as
    /// consumed capacity.
    pub fn create_from_persisted(
        record: &InstanceModel,
        associations: &[NetworkAssociation],
        deployment: &str,
    ) -> InstanceNetworkReservations {
        let reservations = associations
            .iter()
            .filter(|association| {
                let owned = association.instance_id == record.id;
                if !owned {
                    warn!(
                        deployment = %deployment,
                        record_id = record.id,
                        other_record = association.instance_id,
                        network = %association.network_name,
                        "Skipping network association stored for another record"
                    );
                }
                owned
            })
            .map(|association| {
                debug!(
                    deployment = %deployment,
                    instance_group = %record.instance_group,
                    index = record.index,
                    network = %association.network_name,
                    address = %association.address,
                    "Rehydrated existing reservation"
                );
                NetworkReservation::existing(association)
            })
            .collect();

        InstanceNetworkReservations::for_record(record.id, reservations)
    }

    /// Reservations for networks the group declares that the instance holds
    /// no reservation on yet.
    ///
    /// Static networks prefer the address at the instance's index and
    /// otherwise take the first one nobody holds. Every address handed out is
    /// added to `held`. When the pool is exhausted the reservation is left for
    /// the allocator to fill.
    pub fn network_demand(
        instance_group: &InstanceGroup,
        instance: &Instance,
        held: &mut HashSet<IpAddr>,
    ) -> Vec<NetworkReservation> {
        instance_group
            .networks
            .iter()
            .filter(|network| instance.reservations().find_network(&network.name).is_none())
            .map(|network| {
                if network.static_ips.is_empty() {
                    return NetworkReservation::new_dynamic(&network.name);
                }

                let free = network
                    .static_ips
                    .get(instance.index() as usize)
                    .filter(|address| !held.contains(*address))
                    .or_else(|| {
                        network
                            .static_ips
                            .iter()
                            .find(|address| !held.contains(*address))
                    })
                    .copied();

                match free {
                    Some(address) => {
                        held.insert(address);
                        NetworkReservation::new_static(&network.name, address)
                    }
                    None => {
                        debug!(
                            instance_group = %instance_group.name,
                            index = instance.index(),
                            network = %network.name,
                            "Static pool exhausted, leaving address to the allocator"
                        );
                        NetworkReservation::new_static_unassigned(&network.name)
                    }
                }
            })
            .collect()
    }
}
