use alloc::string::String;

/// Transport scheme of a broker address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Scheme {
    /// Plain TCP, default port 1883.
    #[default]
    Mqtt,
    /// TLS, default port 8883.
    Mqtts,
}

impl Scheme {
    /// The IANA registered port for this scheme.
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Mqtt => 1883,
            Self::Mqtts => 8883,
        }
    }

    /// Parses `mqtt` or `mqtts`, case insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("mqtt") {
            Some(Self::Mqtt)
        } else if name.eq_ignore_ascii_case("mqtts") {
            Some(Self::Mqtts)
        } else {
            None
        }
    }
}

/// Reasons a broker address is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InvalidUrl {
    /// The scheme is neither `mqtt` nor `mqtts`.
    UnsupportedScheme,
    /// The host is empty or contains whitespace or control characters.
    InvalidHost,
    /// A password was given without a user name, which MQTT 3.1.1 forbids.
    PasswordWithoutUser,
    /// User name or password exceed the length of a length-prefixed field.
    CredentialsTooLong,
}

impl core::fmt::Display for InvalidUrl {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedScheme => f.write_str("unsupported url scheme"),
            Self::InvalidHost => f.write_str("invalid broker host"),
            Self::PasswordWithoutUser => f.write_str("password given without user name"),
            Self::CredentialsTooLong => f.write_str("credentials too long"),
        }
    }
}

impl core::error::Error for InvalidUrl {}

/// An already parsed broker address.
///
/// ```
/// use rust_mqtt_session::types::BrokerUrl;
///
/// let url = BrokerUrl::mqtts("broker.example.com").with_credentials("user", Some("secret"));
/// assert_eq!(url.port(), 8883);
/// assert!(url.is_tls());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerUrl {
    /// Transport scheme.
    pub scheme: Scheme,
    /// Host name or address literal.
    pub host: String,
    /// Explicit port. The scheme's default port is used if absent.
    pub port: Option<u16>,
    /// User name sent in CONNECT.
    pub user: Option<String>,
    /// Password sent in CONNECT.
    pub password: Option<String>,
}

impl BrokerUrl {
    /// An address with the given scheme and host, no port and no credentials.
    pub fn new(scheme: Scheme, host: &str) -> Self {
        Self {
            scheme,
            host: host.into(),
            port: None,
            user: None,
            password: None,
        }
    }

    /// Shorthand for `BrokerUrl::new(Scheme::Mqtt, host)`.
    pub fn mqtt(host: &str) -> Self {
        Self::new(Scheme::Mqtt, host)
    }

    /// Shorthand for `BrokerUrl::new(Scheme::Mqtts, host)`.
    pub fn mqtts(host: &str) -> Self {
        Self::new(Scheme::Mqtts, host)
    }

    /// Sets an explicit port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the user name and optionally a password.
    pub fn with_credentials(mut self, user: &str, password: Option<&str>) -> Self {
        self.user = Some(user.into());
        self.password = password.map(Into::into);
        self
    }

    /// The explicit port or the scheme's default port.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(self.scheme.default_port())
    }

    /// Whether the transport must be secured with TLS.
    pub fn is_tls(&self) -> bool {
        self.scheme == Scheme::Mqtts
    }

    /// Checks the address can be used to open a connection and fill a CONNECT packet.
    pub fn validate(&self) -> Result<(), InvalidUrl> {
        if self.host.is_empty()
            || self
                .host
                .chars()
                .any(|c| c.is_whitespace() || c.is_control() || c == '/')
        {
            return Err(InvalidUrl::InvalidHost);
        }

        if self.password.is_some() && self.user.is_none() {
            return Err(InvalidUrl::PasswordWithoutUser);
        }

        let too_long = |s: &Option<String>| {
            s.as_ref()
                .is_some_and(|s| s.len() > crate::types::MAX_STRING_LEN)
        };
        if too_long(&self.user) || too_long(&self.password) {
            return Err(InvalidUrl::CredentialsTooLong);
        }

        Ok(())
    }
}

#[cfg(feature = "url")]
impl TryFrom<&url::Url> for BrokerUrl {
    type Error = InvalidUrl;

    fn try_from(url: &url::Url) -> Result<Self, Self::Error> {
        let scheme = Scheme::from_name(url.scheme()).ok_or(InvalidUrl::UnsupportedScheme)?;
        let host = url.host_str().ok_or(InvalidUrl::InvalidHost)?;

        let user = match url.username() {
            "" => None,
            u => Some(u.into()),
        };

        let broker = Self {
            scheme,
            host: host.into(),
            port: url.port(),
            user,
            password: url.password().map(Into::into),
        };
        broker.validate()?;

        Ok(broker)
    }
}
