//! Organisation scoping for every scheduling read and write.
//!
//! A mismatch is reported as "not found" so a caller cannot learn whether an
//! entity exists in another organisation.

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{resource} not found")]
pub struct TenantMismatch {
    pub resource: &'static str,
}

pub struct TenantGuard;

impl TenantGuard {
    /// Passes only when the caller and the resource belong to the same organisation.
    pub fn check(
        caller_organisation: Uuid,
        resource_organisation: Uuid,
        resource: &'static str,
    ) -> Result<(), TenantMismatch> {
        if caller_organisation == resource_organisation {
            return Ok(());
        }

        warn!(
            "Tenant guard rejected access to {} owned by {} from organisation {}",
            resource, resource_organisation, caller_organisation
        );
        Err(TenantMismatch { resource })
    }

    /// Same check for a resource that may not have been found at all, so both
    /// outcomes are indistinguishable to the caller.
    pub fn scope<T>(
        caller_organisation: Uuid,
        resource: Option<T>,
        organisation_of: impl Fn(&T) -> Uuid,
        resource_name: &'static str,
    ) -> Result<T, TenantMismatch> {
        match resource {
            Some(item) => {
                Self::check(caller_organisation, organisation_of(&item), resource_name)?;
                Ok(item)
            }
            None => Err(TenantMismatch { resource: resource_name }),
        }
    }
}
