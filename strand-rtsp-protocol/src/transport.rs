use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use super::{Error, Method};

/// One candidate of a `Transport` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    lower: Option<Lower>,
    parameters: Vec<Parameter>,
}

impl Transport {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lower: None,
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_lower_protocol(mut self, lower: Lower) -> Self {
        self.lower = Some(lower);
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub const fn lower_protocol(&self) -> Option<&Lower> {
        self.lower.as_ref()
    }

    pub fn parameters_iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    #[must_use]
    pub fn interleaved_channel(&self) -> Option<&Channel> {
        self.parameters_iter().find_map(|parameter| match parameter {
            Parameter::Interleaved(channel) => Some(channel),
            _ => None,
        })
    }

    #[must_use]
    pub fn client_port(&self) -> Option<&Port> {
        self.parameters_iter().find_map(|parameter| match parameter {
            Parameter::ClientPort(port) => Some(port),
            _ => None,
        })
    }

    #[must_use]
    pub fn mode(&self) -> Option<&Method> {
        self.parameters_iter().find_map(|parameter| match parameter {
            Parameter::Mode(method) => Some(method),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.parameters_iter()
            .any(|parameter| *parameter == Parameter::Multicast)
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RTP/AVP")?;
        if let Some(lower) = self.lower.as_ref() {
            write!(f, "/{lower}")?;
        }
        for parameter in &self.parameters {
            write!(f, ";{parameter}")?;
        }
        Ok(())
    }
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(';');
        let spec = parts.next().unwrap_or_default();

        if !spec.starts_with("RTP/AVP") {
            return Err(Error::TransportProtocolProfileMissing {
                value: s.to_string(),
            });
        }

        let lower = spec.split('/').nth(2).map(str::parse).transpose()?;
        let parameters = parts
            .filter(|param| !param.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { lower, parameters })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lower {
    Tcp,
    Udp,
}

impl fmt::Display for Lower {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "TCP"),
            Self::Udp => write!(f, "UDP"),
        }
    }
}

impl FromStr for Lower {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            _ => Err(Error::TransportLowerUnknown {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    Unicast,
    Multicast,
    Destination(IpAddr),
    Interleaved(Channel),
    Append,
    Ttl(usize),
    ClientPort(Port),
    ServerPort(Port),
    Ssrc(String),
    Mode(Method),
    /// Parameters this server does not interpret are carried verbatim.
    Other(String, Option<String>),
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unicast => write!(f, "unicast"),
            Self::Multicast => write!(f, "multicast"),
            Self::Destination(host) => write!(f, "destination={host}"),
            Self::Interleaved(channel) => write!(f, "interleaved={channel}"),
            Self::Append => write!(f, "append"),
            Self::Ttl(ttl) => write!(f, "ttl={ttl}"),
            Self::ClientPort(port) => write!(f, "client_port={port}"),
            Self::ServerPort(port) => write!(f, "server_port={port}"),
            Self::Ssrc(ssrc) => write!(f, "ssrc={ssrc}"),
            Self::Mode(method) => write!(f, "mode={method}"),
            Self::Other(var, Some(val)) => write!(f, "{var}={val}"),
            Self::Other(var, None) => write!(f, "{var}"),
        }
    }
}

fn parse_or_err<T: FromStr>(var: &str, value: &str) -> Result<T, Error> {
    value
        .parse::<T>()
        .map_err(|_| Error::TransportParameterValueInvalid {
            var: var.to_string(),
            val: value.to_string(),
        })
}

impl FromStr for Parameter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (var, val) = s
            .trim()
            .split_once('=')
            .map_or((s.trim(), None), |(var, val)| (var, Some(val)));

        let val_or_err = || {
            val.ok_or_else(|| Error::TransportParameterValueMissing {
                var: var.to_string(),
            })
        };

        Ok(match var {
            "unicast" => Self::Unicast,
            "multicast" => Self::Multicast,
            "append" => Self::Append,
            "destination" => Self::Destination(parse_or_err(var, val_or_err()?)?),
            "interleaved" => Self::Interleaved(val_or_err()?.parse()?),
            "ttl" => Self::Ttl(parse_or_err(var, val_or_err()?)?),
            "client_port" => Self::ClientPort(val_or_err()?.parse()?),
            "server_port" => Self::ServerPort(val_or_err()?.parse()?),
            "ssrc" => Self::Ssrc(val_or_err()?.to_string()),
            "mode" => {
                let value = val_or_err()?.trim_matches('"').to_ascii_uppercase();
                Self::Mode(parse_or_err(var, &value)?)
            }
            _ => Self::Other(var.to_string(), val.map(str::to_string)),
        })
    }
}

/// A single number or an inclusive `a-b` pair, as used by the
/// `interleaved`, `client_port` and `server_port` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Range<T> {
    Single(T),
    Range(T, T),
}

pub type Channel = Range<u8>;
pub type Port = Range<u16>;

impl<T: Copy> Range<T> {
    pub fn first(&self) -> T {
        match self {
            Self::Single(first) | Self::Range(first, _) => *first,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Range<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Single(first) => write!(f, "{first}"),
            Self::Range(first, second) => write!(f, "{first}-{second}"),
        }
    }
}

impl<T: FromStr> FromStr for Range<T> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::TransportRangeInvalid {
            value: s.to_string(),
        };
        match s.split_once('-') {
            Some((first, second)) => Ok(Self::Range(
                first.parse().map_err(|_| invalid())?,
                second.parse().map_err(|_| invalid())?,
            )),
            None => Ok(Self::Single(s.parse().map_err(|_| invalid())?)),
        }
    }
}
