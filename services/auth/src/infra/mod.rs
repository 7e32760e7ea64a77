pub mod accounts;
pub mod audit;
pub mod cache;
pub mod delivery;
pub mod session_audit;
