//! Protocol constants for the GitHub login flow
//!
//! Endpoint URLs are defaults; the server config may point them elsewhere
//! (a GitHub Enterprise host, or a local mock in tests).

use std::time::Duration;

/// Provider name stored on every ProviderIdentity row.
pub const PROVIDER_GITHUB: &str = "github";

pub const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";

/// Code exchange endpoint (POST, form-encoded).
pub const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

/// Profile endpoint (GET, bearer-authenticated).
pub const GITHUB_PROFILE_URL: &str = "https://api.github.com/user";

/// GitHub's API rejects requests without a User-Agent.
pub const USER_AGENT: &str = concat!("hextok-auth/", env!("CARGO_PKG_VERSION"));

/// Upper bound for a single provider round trip.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

pub const STATE_COOKIE_NAME: &str = "hextok_oauth_state";

/// Lifetime of a signed state token.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

pub const SESSION_COOKIE_NAME: &str = "hextok_session";

/// Session cookie max-age (30 days). Sessions themselves have no server-side expiry.
pub const SESSION_COOKIE_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Random bytes in a session secret.
pub const SESSION_SECRET_LEN: usize = 32;

/// Marker prepended to a mobile client's state before it goes to the provider.
pub const MOBILE_STATE_PREFIX: &str = "mobile_";

pub const MOBILE_SCHEME: &str = "hextok";

/// Deep link the mobile flow returns to.
pub const MOBILE_REDIRECT_URI: &str = "hextok://oauth/callback";

/// Lifetime of a mobile handoff token.
pub const HANDOFF_TTL: Duration = Duration::from_secs(5 * 60);
