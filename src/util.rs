use std::net::IpAddr;

/// Bytes per megabyte as used for transfer rates
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Bytes per gigabyte as used for partition sizes
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

const HOSTWATCH_PORT: &str = "HOSTWATCH_PORT";

pub fn get_port(default: u16) -> u16 {
    let port_from_env = std::env::var(HOSTWATCH_PORT);
    port_from_env.map_or(default, |res| res.parse().unwrap_or(default))
}

const HOSTWATCH_HOST: &str = "HOSTWATCH_HOST";

pub fn get_host(default: IpAddr) -> IpAddr {
    let host_from_env = std::env::var(HOSTWATCH_HOST);
    host_from_env.map_or(default, |res| res.parse().unwrap_or(default))
}

/// Round to two decimal places, the precision every published value uses
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
