pub mod cancel_deletion;
pub mod change_email;
pub mod change_password;
pub mod delete_account;
pub mod get_me;

pub use cancel_deletion::cancel_deletion;
pub use change_email::change_email;
pub use change_password::change_password;
pub use delete_account::delete_account;
pub use get_me::get_me;
