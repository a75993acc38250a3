pub mod password;
pub mod registration;
pub mod session;

pub use password::{change_password, request_password_reset};
pub use registration::{activate, signup};
pub use session::{info, refresh, signin};
