pub mod instance_reconciler;
pub mod link_resolution;
pub mod network_reservations;
pub mod planning;
pub mod rendering;
pub mod state_store;
