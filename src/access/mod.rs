//! Collaborators consulted by the cache gate: route policies and callers.

mod identity;
mod policy;

pub use identity::{DenyAll, IdentityProvider, Subject, SubjectKind, TokenCheck, TokenIdentity};
pub use policy::{RouteEntry, RoutePolicy, RouteResolver, RouteTable};
