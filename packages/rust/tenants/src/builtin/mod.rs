//! Tenants compiled into the binary.

pub mod boss;
pub mod pools;
pub mod roofs;
pub mod windows;

use crate::Tenant;

/// Every built-in tenant, in registration order.
pub fn all() -> Vec<Tenant> {
    vec![boss::tenant(), pools::tenant(), roofs::tenant(), windows::tenant()]
}
