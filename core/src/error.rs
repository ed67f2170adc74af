use thiserror::Error;

/// Rejections raised while turning a wire record into a storable host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host name must not be empty")]
    EmptyName,
    #[error("host name {0:?} must not contain '/'")]
    InvalidName(String),
    #[error("host name {0:?} is reserved")]
    ReservedName(String),
    #[error("host {name} has no ip address")]
    MissingIp { name: String },
    #[error("invalid ip address {ip:?} for host {name}")]
    InvalidIp { name: String, ip: String },
}
