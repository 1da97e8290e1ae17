pub mod help;
pub mod memory;
pub mod publication;
pub mod user;

pub use help::PostgresHelpRepository;
pub use memory::InMemoryHelpRepository;
pub use memory::InMemoryPublicationRepository;
pub use memory::InMemoryUserRepository;
pub use publication::PostgresPublicationRepository;
pub use user::PostgresUserRepository;
