//! OAuth token refresh for stored broadcaster credentials.
//!
//! Refresh flow:
//! 1. A platform call is rejected with 401
//! 2. [`RefreshFlights`] makes sure only one refresh per account runs
//! 3. [`TokenRefresher`] exchanges the stored refresh token at the token endpoint
//! 4. Both new tokens are encrypted and persisted in one store update
//! 5. Concurrent callers for the same account share that result

mod flight;
mod refresh;

pub use flight::{FlightOutcome, FlightTicket, RefreshFlights};
pub use refresh::{TokenRefresh, TokenRefresher};
