use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 直连证书身份白名单（Subject 子串）
pub const DEFAULT_IDENTITIES: &[&str] = &["pixiv.net", "pximg.net"];

const API_FAMILY_IPS: &[&str] = &[
    "210.140.139.154",
    "210.140.139.155",
    "210.140.139.156",
    "210.140.139.157",
    "210.140.139.158",
    "210.140.139.159",
    "210.140.139.160",
    "210.140.139.161",
    "210.140.139.162",
];

const IMAGE_IPS: &[&str] = &[
    "210.140.139.131",
    "210.140.139.132",
    "210.140.139.133",
    "210.140.139.134",
    "210.140.139.135",
    "210.140.139.136",
    "210.140.92.141",
    "210.140.92.142",
    "210.140.92.143",
    "210.140.92.144",
    "210.140.92.145",
    "210.140.92.146",
    "210.140.92.148",
    "210.140.92.149",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndpointKind {
    OAuth,
    Api,
    Accounts,
    Image,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::OAuth => "oauth",
            EndpointKind::Api => "api",
            EndpointKind::Accounts => "accounts",
            EndpointKind::Image => "image",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oauth" => Ok(EndpointKind::OAuth),
            "api" => Ok(EndpointKind::Api),
            "accounts" => Ok(EndpointKind::Accounts),
            "image" => Ok(EndpointKind::Image),
            other => Err(format!("unknown endpoint '{other}'")),
        }
    }
}

/// 逻辑目标：域名、端口、内置备用 IP 以及证书身份。启动后不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub kind: EndpointKind,
    pub host: String,
    pub port: u16,
    pub fallback_ips: Vec<String>,
    pub identities: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Endpoint {
    pub fn new<S: Into<String>>(kind: EndpointKind, host: S, port: u16, fallback_ips: Vec<String>) -> Self {
        Self {
            kind,
            host: host.into(),
            port,
            fallback_ips,
            identities: owned(DEFAULT_IDENTITIES),
        }
    }

    pub fn builtin(kind: EndpointKind) -> Self {
        match kind {
            EndpointKind::OAuth => Self::new(kind, "oauth.secure.pixiv.net", 443, owned(API_FAMILY_IPS)),
            EndpointKind::Api => Self::new(kind, "app-api.pixiv.net", 443, owned(API_FAMILY_IPS)),
            EndpointKind::Accounts => Self::new(kind, "accounts.pixiv.net", 443, owned(API_FAMILY_IPS)),
            EndpointKind::Image => Self::new(kind, "i.pximg.net", 443, owned(IMAGE_IPS)),
        }
    }

    pub fn oauth() -> Self {
        Self::builtin(EndpointKind::OAuth)
    }

    pub fn api() -> Self {
        Self::builtin(EndpointKind::Api)
    }

    pub fn accounts() -> Self {
        Self::builtin(EndpointKind::Accounts)
    }

    pub fn image() -> Self {
        Self::builtin(EndpointKind::Image)
    }

    pub fn with_identities(mut self, identities: Vec<String>) -> Self {
        self.identities = identities;
        self
    }

    pub fn is_image(&self) -> bool {
        self.kind == EndpointKind::Image
    }
}
