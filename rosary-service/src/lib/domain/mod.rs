pub mod help;
pub mod publication;
pub mod user;
