pub mod password;
pub mod token;
pub mod validation;

pub use password::{hash_password, verify_password, waste_password_check, Password, PasswordHashString};
pub use token::{generate_random_token, hash_token};
pub use validation::ValidatedJson;
