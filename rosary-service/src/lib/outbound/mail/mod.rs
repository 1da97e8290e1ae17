pub mod outbox;
pub mod smtp;

pub use outbox::OutboxMailDispatcher;
pub use smtp::SmtpMailDispatcher;
