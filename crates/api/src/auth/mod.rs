//! Staff authentication

pub mod jwt;
pub mod middleware;

pub use jwt::{JwtError, JwtManager, StaffClaims};
pub use middleware::{require_admin, require_staff, StaffIdentity};
