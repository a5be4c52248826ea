//! Version information for the floor-plan client.

/// Client version from Cargo.toml
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent sent with every back-end request.
pub fn user_agent() -> String {
    format!("floorplan-client/{}", CLIENT_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_version() {
        assert_eq!(user_agent(), format!("floorplan-client/{CLIENT_VERSION}"));
        assert!(!CLIENT_VERSION.is_empty());
    }
}
