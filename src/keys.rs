//! Cache keys used by the trading client
//!
//! Durable keys and ambient cookie names live in separate namespaces; the
//! ambient one uses underscores so the two are never confused.

/// Top coins by market cap on the market page
pub const TOP_COINS: &str = "top-coins";

/// Logged-in user's profile
pub const USER_PROFILE: &str = "user-profile";

/// Ambient cookie holding the sidebar portfolio summary
pub const PORTFOLIO_COOKIE: &str = "portfolio_data";

/// Portfolio holdings for a user
pub fn portfolio(user_id: &str) -> String {
    format!("portfolio-{}", user_id)
}

/// Recent trades for a user
pub fn trades(user_id: &str) -> String {
    format!("trades-{}", user_id)
}

/// Keys worth warming right after login
pub fn login_keys(user_id: &str) -> Vec<String> {
    vec![
        USER_PROFILE.to_string(),
        TOP_COINS.to_string(),
        portfolio(user_id),
        trades(user_id),
    ]
}
