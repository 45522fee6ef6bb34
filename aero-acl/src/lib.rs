// WebDAV access control for calendar resources
// A resource ACL is an owner plus explicit grants and denials per principal,
// persisted in the record file of the directory holding the resource.

pub mod error;
pub mod config;
pub mod principal;
pub mod privilege;
pub mod collection;
pub mod locate;
pub mod resource;

pub use collection::PrivilegeCollection;
pub use config::{AclConfig, MissingOwner};
pub use error::AclError;
pub use principal::{Principal, Transaction};
pub use privilege::{supported_privileges, Privilege, PrivilegeName};
pub use resource::{AclRoot, AclState, ResourceAcl};
