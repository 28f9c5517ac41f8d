//! The on-disk configuration format: a line-oriented grammar of a handful
//! of directives, validated up front so the engine never has to reject a
//! malformed setting after it has started.

use crate::error::ConfigError;
use crate::neighbor::{Neighbor, NeighborSet};
use crate::RouterId;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

const MIN_ROUTER_ID: u32 = 1;
const MAX_ROUTER_ID: u32 = 64000;
const MIN_PORT: u32 = 1024;
const MAX_PORT: u32 = 64000;
const MIN_LINK_COST: u32 = 1;
const MAX_LINK_COST: u32 = 15;

/// A fully validated configuration, ready to hand to the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub instance_id: RouterId,
    pub input_ports: Vec<u16>,
    pub neighbors: NeighborSet,
    pub route_timeout: Duration,
    pub periodic_update_time: Duration,
    pub garbage_time: Duration,
}

impl Config {
    /// Reads and validates the configuration file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut instance_id: Option<RouterId> = None;
        let mut input_ports: Vec<u16> = Vec::new();
        let mut neighbors = NeighborSet::new();
        let mut output_ports_seen: HashSet<u16> = HashSet::new();
        let mut route_timeout = Duration::from_secs(180);
        let mut periodic_update_time = Duration::from_secs(30);
        let mut garbage_time = Duration::from_secs(120);

        let mut inputs_set = false;
        let mut outputs_set = false;

        for raw_line in text.lines() {
            let line = strip_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }

            let (keyword, rest) = match line.split_once(char::is_whitespace) {
                Some((k, r)) => (k, r.trim()),
                None => (line, ""),
            };

            match keyword {
                "router-id" => {
                    if instance_id.is_some() {
                        return Err(ConfigError::DuplicateDirective { directive: "router-id" });
                    }
                    instance_id = Some(parse_router_id(rest)?);
                }
                "input-ports" => {
                    if inputs_set {
                        return Err(ConfigError::DuplicateDirective { directive: "input-ports" });
                    }
                    for token in rest.split(',') {
                        let port = parse_port(token.trim(), &input_ports, &output_ports_seen)?;
                        input_ports.push(port);
                    }
                    inputs_set = true;
                }
                "outputs" => {
                    if outputs_set {
                        return Err(ConfigError::DuplicateDirective { directive: "outputs" });
                    }
                    let mut this_directive_ports = Vec::new();
                    for token in rest.split(',') {
                        let token = token.trim();
                        if token.is_empty() {
                            continue;
                        }
                        let (port, cost, peer_id) =
                            parse_link(token, &input_ports, &output_ports_seen, &this_directive_ports)?;
                        this_directive_ports.push(port);
                        output_ports_seen.insert(port);
                        neighbors.insert(Neighbor { peer_id, port, link_cost: cost });
                    }
                    outputs_set = true;
                }
                "route-timeout" => {
                    route_timeout = Duration::from_secs(parse_positive_seconds(rest, "route-timeout")?);
                }
                "periodic-update-time" => {
                    periodic_update_time =
                        Duration::from_secs(parse_positive_seconds(rest, "periodic-update-time")?);
                }
                "garbage-time" => {
                    garbage_time = Duration::from_secs(parse_positive_seconds(rest, "garbage-time")?);
                }
                other => return Err(ConfigError::UnknownDirective(other.to_string())),
            }
        }

        let instance_id = instance_id.ok_or(ConfigError::MissingDirective("router-id"))?;
        if !inputs_set {
            return Err(ConfigError::MissingDirective("input-ports"));
        }
        if !outputs_set {
            return Err(ConfigError::MissingDirective("outputs"));
        }
        if input_ports.is_empty() {
            return Err(ConfigError::NoInputPorts);
        }

        Ok(Config {
            instance_id,
            input_ports,
            neighbors,
            route_timeout,
            periodic_update_time,
            garbage_time,
        })
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_router_id(token: &str) -> Result<RouterId, ConfigError> {
    let value: u32 = token
        .parse()
        .map_err(|_| ConfigError::InvalidRouterId(token.to_string()))?;
    if (MIN_ROUTER_ID..=MAX_ROUTER_ID).contains(&value) {
        Ok(value as RouterId)
    } else {
        Err(ConfigError::InvalidRouterId(token.to_string()))
    }
}

fn parse_port(token: &str, input_ports: &[u16], output_ports: &HashSet<u16>) -> Result<u16, ConfigError> {
    let value: u32 = token.parse().map_err(|_| ConfigError::InvalidPort(token.to_string()))?;
    if !(MIN_PORT..=MAX_PORT).contains(&value) {
        return Err(ConfigError::InvalidPort(token.to_string()));
    }
    let port = value as u16;
    if input_ports.contains(&port) || output_ports.contains(&port) {
        return Err(ConfigError::InvalidPort(token.to_string()));
    }
    Ok(port)
}

fn parse_link(
    token: &str,
    input_ports: &[u16],
    output_ports: &HashSet<u16>,
    this_directive_ports: &[u16],
) -> Result<(u16, u8, RouterId), ConfigError> {
    let mut parts = token.split('-');
    let (Some(port_s), Some(cost_s), Some(id_s), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ConfigError::InvalidLink(token.to_string()));
    };

    let port_value: u32 = port_s.parse().map_err(|_| ConfigError::InvalidLink(token.to_string()))?;
    if !(MIN_PORT..=MAX_PORT).contains(&port_value) {
        return Err(ConfigError::InvalidLink(token.to_string()));
    }
    let port = port_value as u16;
    if input_ports.contains(&port) || output_ports.contains(&port) || this_directive_ports.contains(&port) {
        return Err(ConfigError::InvalidLink(token.to_string()));
    }

    let cost_value: u32 = cost_s
        .parse()
        .map_err(|_| ConfigError::InvalidLinkCost(cost_s.to_string()))?;
    if !(MIN_LINK_COST..=MAX_LINK_COST).contains(&cost_value) {
        return Err(ConfigError::InvalidLinkCost(cost_s.to_string()));
    }

    let peer_id = parse_router_id(id_s)?;

    Ok((port, cost_value as u8, peer_id))
}

fn parse_positive_seconds(token: &str, directive: &'static str) -> Result<u64, ConfigError> {
    let value: u64 = token.parse().map_err(|_| ConfigError::InvalidTimeout(token.to_string()))?;
    if value == 0 {
        return Err(ConfigError::InvalidTimeout(token.to_string()));
    }
    let _ = directive;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_valid_config() {
        let text = "\
            # comment line\n\
            router-id 1\n\
            input-ports 6110\n\
            outputs 6201-1-2, 6301-1-3\n\
        ";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.instance_id, 1);
        assert_eq!(config.input_ports, vec![6110]);
        assert_eq!(config.neighbors.link_cost(2), Some(1));
        assert_eq!(config.neighbors.link_cost(3), Some(1));
        assert_eq!(config.route_timeout, Duration::from_secs(180));
        assert_eq!(config.periodic_update_time, Duration::from_secs(30));
        assert_eq!(config.garbage_time, Duration::from_secs(120));
    }

    #[test]
    fn honors_overridden_timers() {
        let text = "\
            router-id 1\n\
            input-ports 6110,6111\n\
            outputs 6201-1-2\n\
            route-timeout 10\n\
            periodic-update-time 5\n\
            garbage-time 8\n\
        ";
        let config = Config::parse(text).unwrap();
        assert_eq!(config.route_timeout, Duration::from_secs(10));
        assert_eq!(config.periodic_update_time, Duration::from_secs(5));
        assert_eq!(config.garbage_time, Duration::from_secs(8));
    }

    #[test]
    fn rejects_missing_required_directive() {
        let text = "router-id 1\ninput-ports 6110\n";
        assert!(matches!(
            Config::parse(text),
            Err(ConfigError::MissingDirective("outputs"))
        ));
    }

    #[test]
    fn rejects_unknown_directive() {
        let text = "router-id 1\ninput-ports 6110\noutputs 6201-1-2\nfoo-bar 1\n";
        assert!(matches!(Config::parse(text), Err(ConfigError::UnknownDirective(_))));
    }

    #[test]
    fn rejects_out_of_range_router_id() {
        let text = "router-id 70000\ninput-ports 6110\noutputs 6201-1-2\n";
        assert!(matches!(Config::parse(text), Err(ConfigError::InvalidRouterId(_))));
    }

    #[test]
    fn rejects_duplicate_input_port_reused_as_output() {
        let text = "router-id 1\ninput-ports 6110\noutputs 6110-1-2\n";
        assert!(matches!(Config::parse(text), Err(ConfigError::InvalidLink(_))));
    }

    #[test]
    fn rejects_malformed_link_spec() {
        let text = "router-id 1\ninput-ports 6110\noutputs 6201-1\n";
        assert!(matches!(Config::parse(text), Err(ConfigError::InvalidLink(_))));
    }
}
