pub mod admin;
pub mod customers;
pub mod health;
pub mod messages;
pub mod orders;
pub mod shops;
