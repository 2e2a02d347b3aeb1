mod caller;
mod token;

pub use caller::{Administration, Caller, Capability, Voting};
pub use token::{IdentityClaims, Principal, AUTH_TOKEN_COOKIE};
