//! Admin API listen configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_admin_host")]
    pub host: IpAddr,
    #[serde(default = "default_admin_port")]
    pub port: u16,
}

fn default_enabled() -> bool {
    true
}

fn default_admin_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_admin_port() -> u16 {
    8000
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            host: default_admin_host(),
            port: default_admin_port(),
        }
    }
}
