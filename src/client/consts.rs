pub const URL_VAR: &str = "LIVE_SESSION_URL";
pub const TOKEN_VAR: &str = "LIVE_SESSION_TOKEN";
pub const RECONNECT_MS_VAR: &str = "LIVE_SESSION_RECONNECT_MS";
pub const MAX_RECONNECTS_VAR: &str = "LIVE_SESSION_MAX_RECONNECTS";
pub const OUTBOUND_CAPACITY_VAR: &str = "LIVE_SESSION_OUTBOUND_CAPACITY";

pub const BASE_URL: &str = "ws://localhost:8000";
pub const SESSION_PATH: &str = "ws";
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;
pub const DEFAULT_RECONNECT_MS: u64 = 2000;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
