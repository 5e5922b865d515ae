mod on_demand;
mod provisioning;

pub use on_demand::{AssignedUsers, OnDemandProvisioner, MAX_CONCURRENCY};
pub use provisioning::{ProvisioningService, RunOptions};
