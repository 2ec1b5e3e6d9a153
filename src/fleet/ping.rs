//! Inline TCP reachability probes.
//!
//! `ping` commands are served by the orchestrator itself instead of being
//! forwarded to the agent: each port of the expression is dialed with a
//! short timeout and the aggregated result is rendered as the probe reply.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::trace;

const MAX_TCP_PORT: u32 = 65535;

/// How long one dial may take before the port counts as closed.
const DIAL_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause separating consecutive dial attempts; an intentional throttle so a
/// wide range does not read as a port scan.
const DIAL_PAUSE: Duration = Duration::from_secs(1);

/// Outcome for one dialed port. Field names are wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResult {
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Result")]
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PingError {
    #[error("the value: {0} can't be converted to an integer")]
    NotAnInteger(String),

    #[error("the value: {0} is smaller or larger then the maximum TCP port range")]
    OutOfRange(String),

    #[error("min value \"{min}\" is larger then the max value \"{max}\"")]
    InvertedRange { min: u16, max: u16 },

    #[error("one or more servers failed")]
    Unreachable,
}

/// Parse a port expression `P(,P)*` where `P` is `N` or `N-M`.
pub fn parse_port_expr(expr: &str) -> Result<Vec<(u16, u16)>, PingError> {
    let mut ranges = Vec::new();

    for part in expr.replace(' ', "").split(',') {
        let bounds: Vec<&str> = part.split('-').collect();
        match bounds.as_slice() {
            [port] => {
                let port = parse_port(port)?;
                ranges.push((port, port));
            }
            [min, max] => {
                let min = parse_port(min)?;
                let max = parse_port(max)?;
                if min > max {
                    return Err(PingError::InvertedRange { min, max });
                }
                ranges.push((min, max));
            }
            _ => return Err(PingError::NotAnInteger(part.to_string())),
        }
    }

    Ok(ranges)
}

fn parse_port(s: &str) -> Result<u16, PingError> {
    let port: u32 = s
        .parse()
        .map_err(|_| PingError::NotAnInteger(s.to_string()))?;
    if port > MAX_TCP_PORT {
        return Err(PingError::OutOfRange(s.to_string()));
    }
    Ok(port as u16)
}

/// Dial every port of the expression against `address`.
///
/// The result list is always fully populated; the error is the parse
/// failure, or [`PingError::Unreachable`] when at least one port did not
/// answer.
pub async fn ping(address: &str, expr: &str) -> (Vec<PingResult>, Option<PingError>) {
    let ranges = match parse_port_expr(expr) {
        Ok(ranges) => ranges,
        Err(err) => return (Vec::new(), Some(err)),
    };

    let mut results = Vec::new();
    let mut failed = false;
    let mut first = true;

    for (min, max) in ranges {
        for port in min..=max {
            if !first {
                tokio::time::sleep(DIAL_PAUSE).await;
            }
            first = false;

            let open = dial(address, port).await;
            trace!("pinged {address}:{port} -> open={open}");
            if !open {
                failed = true;
            }
            results.push(PingResult { port, open });
        }
    }

    (results, failed.then_some(PingError::Unreachable))
}

async fn dial(address: &str, port: u16) -> bool {
    let target = format!("{address}:{port}");
    matches!(
        tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(&target)).await,
        Ok(Ok(_))
    )
}
