use std::net::IpAddr;

/// Resolves `.local` candidate hostnames before they are added to the agent.
///
/// mDNS is a process-wide resource owned by the embedding host; the agent
/// only consumes the resolution result. Without an installed resolver,
/// `.local` candidates are rejected.
pub trait MdnsResolver {
    /// Resolves `hostname` (ending in `.local`) to an IP address, or None if
    /// the query failed or timed out.
    fn resolve(&self, hostname: &str) -> Option<IpAddr>;
}

/// Returns true for RFC 6762 multicast hostnames.
pub fn is_mdns_hostname(host: &str) -> bool {
    host.ends_with(".local")
}
