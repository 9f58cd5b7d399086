use std::{
    fmt,
    net::{SocketAddr, ToSocketAddrs as _},
    path::PathBuf,
    str::FromStr,
};

use crate::builder::BuildError;

/// Environment variable that overrides the configured output location.
pub const ENV_OUTPUT_LOCATION: &str = "SPECTATOR_OUTPUT_LOCATION";

const DEFAULT_UDP_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 1234);

/// Where published lines are written to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// Lines are discarded.
    None,
    /// Lines are kept in memory, for tests.
    Memory,
    /// Lines are written to standard output.
    Stdout,
    /// Lines are written to standard error.
    Stderr,
    /// Lines are appended to a file.
    File(PathBuf),
    /// Lines are sent as UDP datagrams.
    Udp(SocketAddr),
}

impl Location {
    /// Returns the location named by [`ENV_OUTPUT_LOCATION`] if set, or `self` otherwise.
    ///
    /// # Errors
    ///
    /// If the environment variable is set to an invalid location, an error is returned.
    pub fn or_env_override(self) -> Result<Self, BuildError> {
        self.or_override_from(|key| std::env::var(key).ok())
    }

    /// Like [`or_env_override`](Location::or_env_override), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// If the override is set to an invalid location, an error is returned.
    pub fn or_override_from<F>(self, lookup: F) -> Result<Self, BuildError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(ENV_OUTPUT_LOCATION) {
            Some(value) => value.parse(),
            None => Ok(self),
        }
    }

    /// Short name of the location's transport, for logging.
    pub const fn transport_id(&self) -> &'static str {
        match self {
            Location::None => "none",
            Location::Memory => "memory",
            Location::Stdout => "stdout",
            Location::Stderr => "stderr",
            Location::File(_) => "file",
            Location::Udp(_) => "udp",
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::Udp(SocketAddr::from(DEFAULT_UDP_ADDR))
    }
}

impl FromStr for Location {
    type Err = BuildError;

    fn from_str(location: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| BuildError::InvalidLocation { location: location.to_string(), reason };

        match location {
            "none" => return Ok(Location::None),
            "memory" => return Ok(Location::Memory),
            "stdout" => return Ok(Location::Stdout),
            "stderr" => return Ok(Location::Stderr),
            "udp" => return Ok(Location::default()),
            _ => {}
        }

        if let Some((scheme, rest)) = location.split_once("://") {
            return match scheme {
                "file" if !rest.is_empty() => Ok(Location::File(PathBuf::from(rest))),
                "file" => Err(invalid("missing file path".to_string())),
                "udp" => {
                    // `[::1]:1234` resolves as is, so bracketed IPv6 hosts need no special handling.
                    let mut addrs = rest.to_socket_addrs().map_err(|e| invalid(e.to_string()))?;
                    addrs.next().map(Location::Udp).ok_or_else(|| invalid("no address resolved".to_string()))
                }
                _ => Err(invalid(format!("unsupported scheme '{}'", scheme))),
            };
        }

        Err(invalid("expected one of none, memory, stdout, stderr, udp, file://<path> or udp://<host>:<port>".to_string()))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::File(path) => write!(f, "file://{}", path.display()),
            Location::Udp(addr) => write!(f, "udp://{}", addr),
            other => f.write_str(other.transport_id()),
        }
    }
}
