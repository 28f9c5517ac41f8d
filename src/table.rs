//! The forwarding table: one [`Route`] per destination router-id, updated
//! under Bellman-Ford with hop-count metric, poisoned reverse, and the
//! authority rule.

use crate::codec::{WireEntry, INFINITY};
use crate::RouterId;
use fxhash::FxHashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// A single row of the forwarding table.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub cost: u8,
    pub next_hop: RouterId,
    pub last_refresh: Instant,
    pub changed: bool,
}

/// The router's forwarding table, keyed by destination router-id.
///
/// Owned exclusively by the event loop; the codec only ever reads a
/// snapshot of it.
#[derive(Debug, Clone)]
pub struct RouteTable {
    instance_id: RouterId,
    routes: FxHashMap<RouterId, Route>,
}

impl RouteTable {
    /// Creates a table containing only the self-route (`cost = 0`,
    /// `next_hop = instance_id`), as required at startup.
    pub fn new(instance_id: RouterId, now: Instant) -> Self {
        let mut routes = FxHashMap::default();
        routes.insert(
            instance_id,
            Route {
                cost: 0,
                next_hop: instance_id,
                last_refresh: now,
                changed: false,
            },
        );
        Self { instance_id, routes }
    }

    pub fn instance_id(&self) -> RouterId {
        self.instance_id
    }

    pub fn get(&self, dest: RouterId) -> Option<&Route> {
        self.routes.get(&dest)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Applies the route-update rule (authority rule, poisoned-reverse-aware
    /// cost comparison) for every `(destination, advertised_cost)` pair
    /// received from `sender` over a link of cost `link_cost`.
    ///
    /// Returns `true` if this update makes a *triggered* update newly
    /// necessary: specifically, when a route's authority pushes its cost to
    /// infinity. Other mutations still mark the affected row `changed`, so
    /// they ride along on the next broadcast (periodic or triggered),
    /// matching the conservative damping of the reference implementation.
    pub fn apply_update(
        &mut self,
        sender: RouterId,
        link_cost: u8,
        advertised: &[(RouterId, u8)],
        now: Instant,
    ) -> bool {
        let mut triggered = false;
        for &(dest, adv_cost) in advertised {
            if dest == self.instance_id {
                continue;
            }
            let candidate = (u16::from(adv_cost) + u16::from(link_cost)).min(u16::from(INFINITY)) as u8;

            match self.routes.get_mut(&dest) {
                None => {
                    if candidate < INFINITY {
                        self.routes.insert(
                            dest,
                            Route {
                                cost: candidate,
                                next_hop: sender,
                                last_refresh: now,
                                changed: true,
                            },
                        );
                    }
                }
                Some(row) => {
                    let is_authority = row.next_hop == sender;
                    if is_authority {
                        if candidate != row.cost {
                            row.cost = candidate;
                            row.last_refresh = now;
                            row.changed = true;
                            if candidate == INFINITY {
                                triggered = true;
                            }
                        } else if row.cost < INFINITY {
                            row.last_refresh = now;
                        }
                    } else if candidate < row.cost {
                        row.next_hop = sender;
                        row.cost = candidate;
                        row.last_refresh = now;
                        row.changed = true;
                    }
                }
            }
        }
        triggered
    }

    /// Ages every non-self row: rows older than `timeout` are poisoned to
    /// infinity (marked `changed`); rows older than `timeout + garbage` are
    /// removed outright. Returns `true` if any row was newly poisoned,
    /// signalling that a triggered update is due.
    pub fn sweep(&mut self, timeout: Duration, garbage: Duration, now: Instant) -> bool {
        let mut triggered = false;
        let mut expired = Vec::new();

        for (&dest, row) in self.routes.iter_mut() {
            if dest == self.instance_id {
                continue;
            }
            let age = now.saturating_duration_since(row.last_refresh);
            if age > timeout && row.cost < INFINITY {
                row.cost = INFINITY;
                row.changed = true;
                triggered = true;
            }
            if age > timeout + garbage {
                expired.push(dest);
            }
        }

        for dest in expired {
            self.routes.remove(&dest);
        }
        triggered
    }

    /// The wire entries to send towards `target_peer`, applying poisoned
    /// reverse. When `triggered_only` is set, only rows with `changed == true`
    /// are included; otherwise every row is included.
    pub fn entries_for(&self, target_peer: RouterId, triggered_only: bool) -> Vec<WireEntry> {
        self.routes
            .iter()
            .filter(|(_, row)| !triggered_only || row.changed)
            .map(|(&destination, row)| {
                let metric = if row.next_hop == target_peer && destination != target_peer {
                    INFINITY
                } else {
                    row.cost.min(INFINITY)
                };
                WireEntry { destination, metric }
            })
            .collect()
    }

    /// The destinations currently marked `changed`, independent of any peer.
    pub fn changed_destinations(&self) -> Vec<RouterId> {
        self.routes
            .iter()
            .filter(|(_, row)| row.changed)
            .map(|(&dest, _)| dest)
            .collect()
    }

    /// Clears `changed` on every row (after a full periodic broadcast).
    pub fn clear_all_changed(&mut self) {
        for row in self.routes.values_mut() {
            row.changed = false;
        }
    }

    /// Clears `changed` only on the given destinations (after a triggered
    /// broadcast that included exactly those rows).
    pub fn clear_changed(&mut self, destinations: &[RouterId]) {
        for dest in destinations {
            if let Some(row) = self.routes.get_mut(dest) {
                row.changed = false;
            }
        }
    }

    /// A read-only, destination-sorted snapshot for display purposes.
    pub fn snapshot(&self, now: Instant) -> TableSnapshot {
        let mut rows: Vec<_> = self
            .routes
            .iter()
            .map(|(&destination, row)| SnapshotRow {
                destination,
                next_hop: row.next_hop,
                cost: row.cost,
                age: now.saturating_duration_since(row.last_refresh),
            })
            .collect();
        rows.sort_by_key(|row| row.destination);
        TableSnapshot { rows }
    }
}

/// One rendered row of a [`TableSnapshot`].
#[derive(Debug, Clone, Copy)]
pub struct SnapshotRow {
    pub destination: RouterId,
    pub next_hop: RouterId,
    pub cost: u8,
    pub age: Duration,
}

/// A point-in-time, read-only view of the table suitable for console display.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    rows: Vec<SnapshotRow>,
}

impl TableSnapshot {
    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }
}

impl fmt::Display for TableSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>10} | {:>9} | {:>4} | {:>8}", "Address", "Next Hop", "Cost", "Age (s)")?;
        writeln!(f, "{}", "-".repeat(10 + 9 + 4 + 8 + 9))?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>10} | {:>9} | {:>4} | {:>8.2}",
                row.destination,
                row.next_hop,
                row.cost,
                row.age.as_secs_f64()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_has_only_self_route() {
        let now = Instant::now();
        let table = RouteTable::new(1, now);
        assert_eq!(table.len(), 1);
        let row = table.get(1).unwrap();
        assert_eq!(row.cost, 0);
        assert_eq!(row.next_hop, 1);
        assert!(!row.changed);
    }

    #[test]
    fn absent_route_is_installed_when_reachable() {
        let now = Instant::now();
        let mut table = RouteTable::new(1, now);
        let triggered = table.apply_update(2, 1, &[(3, 1)], now);
        assert!(!triggered);
        let row = table.get(3).unwrap();
        assert_eq!(row.cost, 2);
        assert_eq!(row.next_hop, 2);
        assert!(row.changed);
    }

    #[test]
    fn absent_route_is_ignored_when_unreachable() {
        let now = Instant::now();
        let mut table = RouteTable::new(1, now);
        table.apply_update(2, 1, &[(3, 16)], now);
        assert!(table.get(3).is_none());
    }

    #[test]
    fn non_authority_only_adopts_strictly_better_route() {
        let now = Instant::now();
        let mut table = RouteTable::new(1, now);
        table.apply_update(2, 1, &[(3, 1)], now); // via 2, cost 2
        // via 4, equal cost 2: must not displace the incumbent.
        table.apply_update(4, 1, &[(3, 1)], now);
        assert_eq!(table.get(3).unwrap().next_hop, 2);
        // via 4, strictly better cost 1 (link cost 0 is impossible, use a
        // cheaper advertised cost instead).
        table.apply_update(4, 1, &[(3, 0)], now);
        let row = table.get(3).unwrap();
        assert_eq!(row.next_hop, 4);
        assert_eq!(row.cost, 1);
    }

    #[test]
    fn authority_rule_accepts_worsening_update() {
        let now = Instant::now();
        let mut table = RouteTable::new(1, now);
        table.apply_update(2, 1, &[(4, 1)], now); // A -> D via B, cost 2
        assert_eq!(table.get(4).unwrap().cost, 2);

        // B (the authority) now advertises D at cost 10.
        table.apply_update(2, 1, &[(4, 10)], now);
        let row = table.get(4).unwrap();
        assert_eq!(row.cost, 11);
        assert_eq!(row.next_hop, 2);
    }

    #[test]
    fn authority_pushing_cost_to_infinity_triggers_update() {
        let now = Instant::now();
        let mut table = RouteTable::new(1, now);
        table.apply_update(2, 1, &[(4, 1)], now);
        let triggered = table.apply_update(2, 1, &[(4, 16)], now);
        assert!(triggered);
        assert_eq!(table.get(4).unwrap().cost, INFINITY);
    }

    #[test]
    fn authority_repeating_infinity_does_not_refresh_timer() {
        let t0 = Instant::now();
        let mut table = RouteTable::new(1, t0);
        table.apply_update(2, 1, &[(4, 16)], t0); // absent + candidate==16 -> ignored
        // Install first via a reachable advertisement, then push to infinity.
        table.apply_update(2, 1, &[(4, 1)], t0);
        table.apply_update(2, 1, &[(4, 16)], t0);
        let refresh_at_poison = table.get(4).unwrap().last_refresh;

        let t1 = t0 + Duration::from_secs(5);
        // Authority repeats the same (now-equal) cost of 16: must not refresh.
        table.apply_update(2, 1, &[(4, 16)], t1);
        assert_eq!(table.get(4).unwrap().last_refresh, refresh_at_poison);
    }

    #[test]
    fn poisoned_reverse_masks_route_back_towards_next_hop() {
        let now = Instant::now();
        let mut table = RouteTable::new(1, now);
        table.apply_update(3, 2, &[(4, 1)], now); // A's route to 4 goes via 3, cost 3

        let towards_3 = table.entries_for(3, false);
        let entry_4 = towards_3.iter().find(|e| e.destination == 4).unwrap();
        assert_eq!(entry_4.metric, INFINITY);

        let towards_other = table.entries_for(9, false);
        let entry_4 = towards_other.iter().find(|e| e.destination == 4).unwrap();
        assert_eq!(entry_4.metric, 3);
    }

    #[test]
    fn sweep_poisons_stale_routes_then_garbage_collects() {
        let t0 = Instant::now();
        let mut table = RouteTable::new(1, t0);
        table.apply_update(2, 1, &[(4, 1)], t0);

        let timeout = Duration::from_secs(180);
        let garbage = Duration::from_secs(120);

        // Not yet stale.
        assert!(!table.sweep(timeout, garbage, t0 + Duration::from_secs(90)));
        assert_eq!(table.get(4).unwrap().cost, 2);

        // Stale: poisoned to infinity, triggered update due.
        let triggered = table.sweep(timeout, garbage, t0 + Duration::from_secs(181));
        assert!(triggered);
        assert_eq!(table.get(4).unwrap().cost, INFINITY);

        // Still within garbage window: retained.
        assert!(!table.sweep(timeout, garbage, t0 + Duration::from_secs(250)));
        assert!(table.get(4).is_some());

        // Past garbage window: removed.
        table.sweep(timeout, garbage, t0 + Duration::from_secs(302));
        assert!(table.get(4).is_none());
    }

    #[test]
    fn self_route_is_exempt_from_sweep_and_updates() {
        let t0 = Instant::now();
        let mut table = RouteTable::new(1, t0);
        table.apply_update(2, 1, &[(1, 0)], t0 + Duration::from_secs(1));
        let row = table.get(1).unwrap();
        assert_eq!(row.cost, 0);
        assert_eq!(row.next_hop, 1);

        table.sweep(
            Duration::from_secs(1),
            Duration::from_secs(1),
            t0 + Duration::from_secs(1000),
        );
        assert!(table.get(1).is_some());
    }

    #[test]
    fn periodic_broadcast_clears_all_changed_flags() {
        let now = Instant::now();
        let mut table = RouteTable::new(1, now);
        table.apply_update(2, 1, &[(4, 1)], now);
        assert!(!table.changed_destinations().is_empty());
        table.clear_all_changed();
        assert!(table.changed_destinations().is_empty());
    }
}
