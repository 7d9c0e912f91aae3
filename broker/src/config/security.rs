use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Security {
    /// Default true, matching the teacher's default; production configs
    /// should disable this and rely on `password_file`.
    #[serde(default = "Security::default_allow_anonymous")]
    allow_anonymous: bool,

    #[serde(default = "Security::default_password_file")]
    password_file: Option<PathBuf>,
}

impl Security {
    #[must_use]
    pub const fn default_allow_anonymous() -> bool {
        true
    }

    #[must_use]
    pub const fn default_password_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    #[must_use]
    pub fn password_file(&self) -> Option<&PathBuf> {
        self.password_file.as_ref()
    }
}

impl Default for Security {
    fn default() -> Self {
        Self {
            allow_anonymous: Self::default_allow_anonymous(),
            password_file: Self::default_password_file(),
        }
    }
}
