//! Authentication and authorization.

mod gate;
mod identity;
mod password;
mod resolver;
mod token;

pub use gate::{AccessError, Gate, GateChain};
pub use identity::{Identity, Permissions, User};
pub use password::{hash_password, validate_password, verify_password, PasswordError};
pub use resolver::{resolve, AuthError};
pub use token::{is_expired, is_well_formed, Scope, Token, TokenHash, TOKEN_PLAINTEXT_LEN};
