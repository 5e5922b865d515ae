mod app_role_assignment;
mod directory_object;
mod odata;
mod service_principal;
mod synchronization;

pub use app_role_assignment::*;
pub use directory_object::DirectoryObject;
pub use odata::*;
pub use service_principal::ServicePrincipal;
pub use synchronization::*;
