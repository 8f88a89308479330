pub mod accountant;
pub mod pending;
pub mod reconcile;
pub mod selection;
pub mod sharding;
pub mod state;
pub mod stats;
pub mod store;
