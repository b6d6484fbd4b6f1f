//! Target resolution
//!
//! Literal addresses are used as-is and given a display name through a
//! reverse (PTR) lookup; anything else goes through forward DNS and keeps
//! the caller's spelling as its display name.

use super::ScanTarget;
use crate::ScanError;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::lookup_host;

/// Longest a PTR lookup may hold up the start of a scan
const REVERSE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolve a target string into an address and a display hostname
pub async fn resolve(target: &str) -> crate::Result<ScanTarget> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(ScanError::Resolution("empty target".to_string()));
    }

    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        let hostname = reverse_lookup(ip, REVERSE_LOOKUP_TIMEOUT, name_info)
            .await
            .unwrap_or_else(|| ip.to_string());
        return Ok(ScanTarget {
            raw: target.to_string(),
            ip,
            hostname,
        });
    }

    // lookup_host wants a port; it is discarded
    let mut addrs = lookup_host((trimmed, 0))
        .await
        .map_err(|e| ScanError::Resolution(format!("lookup {}: {}", trimmed, e)))?;

    let ip = addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| ScanError::Resolution(format!("no addresses found for {}", trimmed)))?;

    log::debug!("Resolved {} to {}", trimmed, ip);

    Ok(ScanTarget {
        raw: target.to_string(),
        ip,
        hostname: trimmed.to_string(),
    })
}

/// Reverse lookup on the blocking pool; `None` when the address has no
/// name or the lookup outlives `deadline`
async fn reverse_lookup(
    ip: IpAddr,
    deadline: Duration,
    lookup: fn(IpAddr) -> Option<String>,
) -> Option<String> {
    let task = tokio::task::spawn_blocking(move || lookup(ip));
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(name)) => name.filter(|n| !n.is_empty()),
        Ok(Err(e)) => {
            log::debug!("Reverse lookup task for {} failed: {}", ip, e);
            None
        }
        Err(_) => {
            log::debug!("Reverse lookup for {} timed out after {:?}", ip, deadline);
            None
        }
    }
}

#[cfg(unix)]
fn name_info(ip: IpAddr) -> Option<String> {
    use socket2::SockAddr;
    use std::ffi::CStr;
    use std::net::SocketAddr;

    const NI_MAXHOST: usize = 1025;

    let addr = SockAddr::from(SocketAddr::new(ip, 0));
    let mut host = [0 as libc::c_char; NI_MAXHOST];

    // NI_NAMEREQD makes a missing PTR record an error instead of echoing the address
    let rc = unsafe {
        libc::getnameinfo(
            addr.as_ptr(),
            addr.len(),
            host.as_mut_ptr(),
            host.len() as libc::socklen_t,
            std::ptr::null_mut(),
            0,
            libc::NI_NAMEREQD,
        )
    };
    if rc != 0 {
        return None;
    }

    let name = unsafe { CStr::from_ptr(host.as_ptr()) }.to_string_lossy();
    Some(name.trim_end_matches('.').to_string())
}

#[cfg(not(unix))]
fn name_info(_ip: IpAddr) -> Option<String> {
    None
}
