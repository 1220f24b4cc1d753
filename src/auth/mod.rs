pub mod password;
pub mod slug;

pub use password::{PasswordRequest, PasswordSuccess};
