pub mod account;
pub mod one_time_token;
pub mod refresh_token;

pub use account::{Account, AccountId, AccountProfile, AccountState, NewAccount, ProfilePatch};
pub use one_time_token::{OneTimeToken, PendingToken, Redeemed, TokenPurpose, TokenRedemption};
pub use refresh_token::RefreshTokenRecord;
