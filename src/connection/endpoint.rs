use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::utils::{Error, Result};

/// Transport security selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Amqp,
    Amqps,
}

impl Scheme {
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Amqp => 5672,
            Scheme::Amqps => 5671,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Amqp => "amqp",
            Scheme::Amqps => "amqps",
        }
    }
}

/// A parsed broker endpoint: `amqp[s]://[user[:password]@]host[:port][/vhost]`.
///
/// Missing credentials default to `guest`/`guest`, a missing port to the
/// scheme's default, and a missing vhost to `/`. The vhost segment is
/// percent-decoded, so `%2f` names the `/` vhost.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerUrl {
    raw: String,
    pub scheme: Scheme,
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub vhost: String,
}

impl BrokerUrl {
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| Error::Connection(format!("malformed broker URL: {e}")))?;

        let scheme = match url.scheme() {
            "amqp" => Scheme::Amqp,
            "amqps" => Scheme::Amqps,
            other => {
                return Err(Error::Connection(format!(
                    "unsupported broker URL scheme '{other}', expected amqp or amqps"
                )));
            }
        };

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => {
                return Err(Error::Connection(
                    "malformed broker URL: missing host".to_string(),
                ));
            }
        };

        let username = match url.username() {
            "" => "guest".to_string(),
            user => percent_decode(user)?,
        };
        let password = match url.password() {
            Some(pass) => percent_decode(pass)?,
            None => "guest".to_string(),
        };

        let path = url.path().strip_prefix('/').unwrap_or(url.path());
        let vhost = if path.is_empty() {
            "/".to_string()
        } else if path.contains('/') {
            return Err(Error::Connection(format!(
                "malformed broker URL: vhost '{path}' must be a single path segment"
            )));
        } else {
            percent_decode(path)?
        };

        Ok(Self {
            raw: input.to_string(),
            scheme,
            port: url.port().unwrap_or(scheme.default_port()),
            username,
            password,
            host,
            vhost,
        })
    }

    /// The URL exactly as given, credentials included.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `host:port`, for matching endpoints.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Shows the endpoint with the password masked.
impl fmt::Display for BrokerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:***@{}:{}/{}",
            self.scheme.as_str(),
            self.username,
            self.host,
            self.port,
            self.vhost.replace('/', "%2f")
        )
    }
}

impl fmt::Debug for BrokerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BrokerUrl").field(&self.to_string()).finish()
    }
}

fn percent_decode(input: &str) -> Result<String> {
    // `percent_decode_str` passes malformed escapes through untouched.
    let well_formed = input.split('%').skip(1).all(|rest| {
        rest.as_bytes()
            .get(..2)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if !well_formed {
        return Err(Error::Connection(
            "malformed broker URL: bad percent escape".to_string(),
        ));
    }
    percent_decode_str(input)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Error::Connection("malformed broker URL: escape is not UTF-8".to_string()))
}
