//! Parses the three redirect error shapes a cluster node can send back
//! (spec §6, "Redirect error formats (strict)").

use crate::hash::Slot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// `MOVED <slot> <host>:<port>` — update the routing table, then retry.
    Moved { slot: Slot, host: String, port: u16 },
    /// `ASK <slot> <host>:<port>` — one-shot retry prefixed with `ASKING`;
    /// never updates the routing table.
    Ask { slot: Slot, host: String, port: u16 },
    /// `REDIRECT <host>:<port>` — one-shot retry against the primary, no
    /// slot carried on the wire.
    Redirect { host: String, port: u16 },
}

/// Recognizes a `CommandError` prefix/message pair as a redirect, if it is
/// one. Returns `None` for ordinary command errors.
pub fn parse(prefix: &str, message: &str) -> Option<Redirect> {
    match prefix {
        "MOVED" => {
            let (slot, addr) = message.split_once(' ')?;
            let slot: u16 = slot.parse().ok()?;
            let (host, port) = split_host_port(addr)?;
            Some(Redirect::Moved {
                slot: Slot::new(slot),
                host,
                port,
            })
        }
        "ASK" => {
            let (slot, addr) = message.split_once(' ')?;
            let slot: u16 = slot.parse().ok()?;
            let (host, port) = split_host_port(addr)?;
            Some(Redirect::Ask {
                slot: Slot::new(slot),
                host,
                port,
            })
        }
        "REDIRECT" => {
            let (host, port) = split_host_port(message)?;
            Some(Redirect::Redirect { host, port })
        }
        _ => None,
    }
}

fn split_host_port(addr: &str) -> Option<(String, u16)> {
    let (host, port) = addr.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_moved() {
        let redirect = parse("MOVED", "1234 B:6380").unwrap();
        assert_eq!(
            redirect,
            Redirect::Moved {
                slot: Slot::new(1234),
                host: "B".into(),
                port: 6380,
            }
        );
    }

    #[test]
    fn parses_ask() {
        let redirect = parse("ASK", "1234 127.0.0.1:6380").unwrap();
        assert_eq!(
            redirect,
            Redirect::Ask {
                slot: Slot::new(1234),
                host: "127.0.0.1".into(),
                port: 6380,
            }
        );
    }

    #[test]
    fn parses_redirect_without_slot() {
        let redirect = parse("REDIRECT", "B:6380").unwrap();
        assert_eq!(
            redirect,
            Redirect::Redirect {
                host: "B".into(),
                port: 6380,
            }
        );
    }

    #[test]
    fn unrelated_prefix_is_not_a_redirect() {
        assert_eq!(parse("NOAUTH", "authentication required"), None);
    }
}
