pub mod admin;
pub mod email;
pub mod extract;
pub mod health;
pub mod otc;
pub mod session;
pub mod token;
