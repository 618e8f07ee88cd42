use std::fmt;

use crate::mods::error::Error;

/// Mod portal service credentials, required to download mods.
///
/// The token is a secret: it is redacted from `Debug` output and must never be
/// logged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.username.is_empty() {
            return Err(Error::InvalidArgument(
                "username required for download".to_string(),
            ));
        }
        if self.token.is_empty() {
            return Err(Error::InvalidArgument(
                "token required for download".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}
