use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::passwd::Passwd;
use super::{AuthBackend, AuthRequest, Decision};
use crate::error::Error;

/// Consults a `username:salt:hash` password file, generated/updated by
/// the `mossmq-passwd` utility. Falls back to `allow_anonymous` when the
/// request carries no username.
#[derive(Debug)]
pub struct FileAuthBackend {
    users: HashMap<String, Passwd>,
    allow_anonymous: bool,
}

impl FileAuthBackend {
    /// # Errors
    /// Returns an error if the password file can't be read or a line
    /// fails to parse.
    pub fn load(path: &Path, allow_anonymous: bool) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut users = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if let Some((username, passwd)) = Passwd::parse_line(&line)? {
                users.insert(username, passwd);
            }
        }
        Ok(FileAuthBackend {
            users,
            allow_anonymous,
        })
    }
}

impl AuthBackend for FileAuthBackend {
    fn authenticate(&self, request: &AuthRequest<'_>) -> Decision {
        let Some(username) = request.username else {
            return if self.allow_anonymous {
                Decision::Accept
            } else {
                Decision::Deny
            };
        };
        match (self.users.get(username), request.password) {
            (Some(passwd), Some(password)) if passwd.matches(password) => Decision::Accept,
            _ => Decision::Deny,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn accepts_matching_credentials_and_rejects_others() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let passwd = Passwd::generate(b"hunter2");
        writeln!(file, "{}", passwd.dump("alice")).unwrap();
        let backend = FileAuthBackend::load(file.path(), false).unwrap();

        let good = AuthRequest {
            client_id: "c1",
            username: Some("alice"),
            password: Some(b"hunter2"),
            auth_method: None,
            auth_data: None,
        };
        assert_eq!(backend.authenticate(&good), Decision::Accept);

        let bad = AuthRequest {
            client_id: "c1",
            username: Some("alice"),
            password: Some(b"wrong"),
            auth_method: None,
            auth_data: None,
        };
        assert_eq!(backend.authenticate(&bad), Decision::Deny);
    }
}
