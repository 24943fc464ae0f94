//! Provider adapters.
//!
//! | Adapter | Role | Endpoints |
//! |---------|------|-----------|
//! | [`YahooAdapter`] | primary | metrics, price history |
//! | [`AlphaVantageAdapter`] | secondary (gap filler) | metrics |

mod alphavantage;
mod yahoo;

pub use alphavantage::AlphaVantageAdapter;
pub use yahoo::{YahooAdapter, YahooSession};
