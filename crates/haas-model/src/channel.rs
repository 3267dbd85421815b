//! Channel identifiers for network attachments.
//!
//! A channel encodes how a network reaches a switchport: `vlan/native` for
//! untagged traffic, `vlan/<tag>` for 802.1Q tagged traffic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TopologyError;

/// Prefix shared by every VLAN channel.
pub const VLAN_CHANNEL_PREFIX: &str = "vlan/";

/// Name of the untagged channel.
pub const NATIVE_CHANNEL: &str = "vlan/native";

/// Lowest usable 802.1Q tag.
pub const MIN_VLAN_TAG: u16 = 1;

/// Highest usable 802.1Q tag.
pub const MAX_VLAN_TAG: u16 = 4094;

/// How a network is attached to a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Channel {
    /// Untagged (access / PVID) attachment
    Native,
    /// Tagged attachment carrying the given VLAN tag
    Tagged(u16),
}

impl Channel {
    /// Returns true for the untagged channel.
    pub fn is_native(&self) -> bool {
        matches!(self, Channel::Native)
    }

    /// Returns the VLAN tag for tagged channels.
    pub fn tag(&self) -> Option<u16> {
        match self {
            Channel::Native => None,
            Channel::Tagged(tag) => Some(*tag),
        }
    }

    /// Returns true if this channel can carry the network with the given
    /// provider-assigned id.
    ///
    /// The native channel carries any network; a tagged channel only carries
    /// the network whose id matches its tag.
    pub fn carries(&self, network_id: &str) -> bool {
        match self {
            Channel::Native => true,
            Channel::Tagged(tag) => network_id.parse::<u16>().ok() == Some(*tag),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Native => f.write_str(NATIVE_CHANNEL),
            Channel::Tagged(tag) => write!(f, "{}{}", VLAN_CHANNEL_PREFIX, tag),
        }
    }
}

impl FromStr for Channel {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(VLAN_CHANNEL_PREFIX)
            .ok_or_else(|| TopologyError::bad_channel(s, "expected a 'vlan/' channel"))?;

        if rest == "native" {
            return Ok(Channel::Native);
        }

        let tag: u16 = rest
            .parse()
            .map_err(|_| TopologyError::bad_channel(s, "tag is not a number"))?;
        if !(MIN_VLAN_TAG..=MAX_VLAN_TAG).contains(&tag) {
            return Err(TopologyError::bad_channel(
                s,
                format!("tag must be in {}..={}", MIN_VLAN_TAG, MAX_VLAN_TAG),
            ));
        }
        Ok(Channel::Tagged(tag))
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.to_string()
    }
}

impl TryFrom<String> for Channel {
    type Error = TopologyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_from_str() {
        assert_eq!("vlan/native".parse::<Channel>().unwrap(), Channel::Native);
        assert_eq!("vlan/102".parse::<Channel>().unwrap(), Channel::Tagged(102));
        assert!("vlan/0".parse::<Channel>().is_err());
        assert!("vlan/4095".parse::<Channel>().is_err());
        assert!("vlan/trunk".parse::<Channel>().is_err());
        assert!("native".parse::<Channel>().is_err());
    }

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::Native.to_string(), "vlan/native");
        assert_eq!(Channel::Tagged(102).to_string(), "vlan/102");
    }

    #[test]
    fn test_channel_carries() {
        assert!(Channel::Native.carries("102"));
        assert!(Channel::Tagged(102).carries("102"));
        assert!(!Channel::Tagged(102).carries("103"));
        assert!(!Channel::Tagged(102).carries("hammernet"));
    }

    #[test]
    fn test_channel_serde_as_string() {
        let json = serde_json::to_string(&Channel::Tagged(7)).unwrap();
        assert_eq!(json, "\"vlan/7\"");
        let parsed: Channel = serde_json::from_str("\"vlan/native\"").unwrap();
        assert_eq!(parsed, Channel::Native);
        assert!(serde_json::from_str::<Channel>("\"trunk\"").is_err());
    }
}
