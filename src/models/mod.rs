pub mod email_verification_token;
pub mod password_reset_token;
pub mod token;
pub mod user;

pub use email_verification_token::{EmailVerificationToken, NewEmailVerificationToken};
pub use password_reset_token::{NewPasswordResetToken, PasswordResetToken};
pub use token::{is_expired, AccountToken, TokenKind, TokenSettings};
pub use user::{NewUser, User};
