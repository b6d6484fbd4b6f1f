//! Result aggregation
//!
//! Workers report findings in completion order; the report is always
//! ordered by port with at most one entry per port.

use crate::network::PortFinding;

/// Order findings by port and drop repeated ports, keeping the first report
pub fn normalize(mut findings: Vec<PortFinding>) -> Vec<PortFinding> {
    // stable, so "first report" means first received
    findings.sort_by_key(|f| f.port);
    findings.dedup_by_key(|f| f.port);
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ServiceTag;
    use proptest::prelude::*;

    #[test]
    fn test_sorts_by_port() {
        let findings = vec![
            PortFinding::new(443, ServiceTag::Tls),
            PortFinding::new(22, ServiceTag::Banner("SSH-2.0-x".to_string())),
            PortFinding::new(80, ServiceTag::Open),
        ];
        let ports: Vec<u16> = normalize(findings).iter().map(|f| f.port).collect();
        assert_eq!(ports, vec![22, 80, 443]);
    }

    #[test]
    fn test_duplicate_keeps_first_report() {
        let findings = vec![
            PortFinding::new(8443, ServiceTag::Tls),
            PortFinding::new(8443, ServiceTag::Open),
        ];
        assert_eq!(normalize(findings), vec![PortFinding::new(8443, ServiceTag::Tls)]);
    }

    #[test]
    fn test_empty() {
        assert!(normalize(Vec::new()).is_empty());
    }

    proptest! {
        #[test]
        fn prop_output_strictly_ascending(ports in proptest::collection::vec(1u16.., 0..200)) {
            let findings = ports.iter().map(|&p| PortFinding::new(p, ServiceTag::Open)).collect();
            let out = normalize(findings);
            prop_assert!(out.windows(2).all(|w| w[0].port < w[1].port));
        }

        #[test]
        fn prop_idempotent(ports in proptest::collection::vec(1u16.., 0..200)) {
            let findings: Vec<PortFinding> =
                ports.iter().map(|&p| PortFinding::new(p, ServiceTag::Open)).collect();
            let once = normalize(findings);
            prop_assert_eq!(normalize(once.clone()), once);
        }

        #[test]
        fn prop_same_port_set(ports in proptest::collection::vec(1u16.., 0..200)) {
            let findings = ports.iter().map(|&p| PortFinding::new(p, ServiceTag::Open)).collect();
            let mut expected = ports.clone();
            expected.sort_unstable();
            expected.dedup();
            let got: Vec<u16> = normalize(findings).iter().map(|f| f.port).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
