//! Password hashing and bearer tokens.

mod password;
mod token;

pub use password::{hash_password, verify_password, MIN_PASSWORD_LEN};
pub use token::{Claims, TokenSigner};
