//! Address helpers
//!
//! Addresses are slash-delimited event names:
//! ```text
//! /mouse/xy
//! /user/3/mouse/xy
//! /zone/2/press
//! ```
//!
//! Routing only ever prepends segments, so the helpers here cover
//! validation, well-known names and prefixing.

use crate::{Error, Result, SessionId};

/// Combined position sample, args `[x, y]`
pub const MOUSE_XY: &str = "/mouse/xy";
/// Horizontal position sample, args `[x]`
pub const MOUSE_X: &str = "/mouse/x";
/// Vertical position sample, args `[y]`
pub const MOUSE_Y: &str = "/mouse/y";
/// Press/release signal, args `[1]` or `[0]`
pub const PRESS: &str = "/press";
/// Number of contributing clients
pub const USERS_COUNT: &str = "/users/count";
/// Id of the client currently forwarded in single mode
pub const ACTIVE_USER: &str = "/active/user";

/// Validate an inbound address. Only emptiness is rejected.
pub fn validate(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(Error::InvalidAddress("empty address".to_string()));
    }
    Ok(())
}

/// Prepend `prefix` to `address`, inserting a separator if `address` lacks one
pub fn join(prefix: &str, address: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if address.starts_with('/') {
        format!("{}{}", prefix, address)
    } else {
        format!("{}/{}", prefix, address)
    }
}

/// `/user/{id}`
pub fn user_prefix(id: SessionId) -> String {
    format!("/user/{}", id)
}

/// `/zone/{zone}`
pub fn zone_prefix(zone: u32) -> String {
    format!("/zone/{}", zone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("/user/5", "/mouse/x"), "/user/5/mouse/x");
        assert_eq!(join("/user/5", "mouse/x"), "/user/5/mouse/x");
        assert_eq!(join("/zone/1/", "/press"), "/zone/1/press");
    }

    #[test]
    fn test_validate() {
        assert!(validate("").is_err());
        assert!(validate("x").is_ok());
        assert!(validate(MOUSE_XY).is_ok());
    }
}
