pub mod secret;

pub use secret::{bearer_token, secrets_match};
