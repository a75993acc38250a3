mod auth;
mod credentials;
mod email;
pub mod error;
mod one_time_token;
mod refresh_registry;
mod token_codec;

pub use auth::AuthService;
pub use credentials::{CredentialStore, SignupProfile};
pub use email::{EmailKind, EmailProvider, EmailService, MockEmailService, SentEmail};
pub use error::ServiceError;
pub use one_time_token::OneTimeTokenManager;
pub use refresh_registry::RefreshTokenRegistry;
pub use token_codec::{BearerClaims, TokenClaims, TokenCodec, TokenPair};
