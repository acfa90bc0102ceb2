//! Tenant reference data: regions and shipping points, crops with their
//! processing variants, packaging options, and certifications. Everything
//! here is scoped to the owning tenant on every query.

pub mod crops;
pub mod packaging;
pub mod regions;
