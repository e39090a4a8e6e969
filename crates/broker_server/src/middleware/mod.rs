//! Request gates applied to every `/v2` route, outermost first: protocol
//! version, basic auth, caller context.

pub mod auth;
pub mod identity;
pub mod version;
