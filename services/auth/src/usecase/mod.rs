pub mod account;
pub mod challenge;
pub mod lockout;
pub mod otc;
pub mod rate_limit;
pub mod risk;
pub mod session;
