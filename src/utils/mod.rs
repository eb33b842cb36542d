pub mod clock;
pub mod email;
pub mod password;
