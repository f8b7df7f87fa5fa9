use zeroize::Zeroizing;

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Clone, PartialEq, Eq)]
pub struct KeyFile {
    pub path: std::path::PathBuf,
    pub passphrase: Option<Zeroizing<String>>,
}

/// Remote host plus the credentials used to log into it.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<Zeroizing<String>>,
    pub key: Option<KeyFile>,
}

impl ServerEndpoint {
    pub fn new(host: impl Into<String>, port: Option<u16>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.unwrap_or(DEFAULT_SSH_PORT),
            username: username.into(),
            password: None,
            key: None,
        }
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    #[must_use]
    pub fn with_key_file(
        mut self,
        path: impl Into<std::path::PathBuf>,
        passphrase: Option<String>,
    ) -> Self {
        self.key = Some(KeyFile {
            path: path.into(),
            passphrase: passphrase.map(Zeroizing::new),
        });
        self
    }

    /// `user@host:port`, used in reports and error messages
    pub fn id(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.host.trim().is_empty() {
            return Err(crate::Error::InvalidEndpoint("host must not be empty".into()));
        }
        if self.username.trim().is_empty() {
            return Err(crate::Error::InvalidEndpoint(format!(
                "user for {} must not be empty",
                self.host
            )));
        }
        if self.password.is_none() && self.key.is_none() {
            return Err(crate::Error::InvalidEndpoint(format!(
                "no password or private key configured for {}",
                self.id()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ServerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("key", &self.key.as_ref().map(|key| &key.path))
            .finish()
    }
}
