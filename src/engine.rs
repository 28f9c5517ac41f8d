//! The event loop: the reactor that multiplexes socket readiness and
//! timers, applies the route-update rule, and drives periodic and
//! triggered broadcasts.

use crate::codec::{self, RipPacket, WireEntry};
use crate::config::Config;
use crate::display;
use crate::error::EngineError;
use crate::socket::{SocketBank, MAX_DATAGRAM};
use crate::table::RouteTable;
use crate::RouterId;
use rand::Rng;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Readiness is polled at this cadence; small enough to service timers
/// promptly, large enough not to busy-spin.
const TICK: Duration = Duration::from_millis(50);

/// The full mutable state of a running router: table, neighbours, sockets,
/// and the periodic/triggered timers, all owned exclusively by the loop.
pub struct Engine {
    config: Config,
    table: RouteTable,
    sockets: SocketBank,
    periodic_remaining: Duration,
    triggered_damp_remaining: Duration,
    triggered_pending: bool,
    verbose: bool,
}

impl Engine {
    /// Binds the socket bank, installs the self-route, and sends the
    /// initial full periodic broadcast to every neighbour.
    pub async fn start(config: Config, verbose: bool) -> Result<Self, EngineError> {
        let sockets = SocketBank::bind(&config.input_ports).await?;
        let table = RouteTable::new(config.instance_id, Instant::now());
        let periodic_update_time = config.periodic_update_time;

        let mut engine = Self {
            config,
            table,
            sockets,
            periodic_remaining: periodic_update_time,
            triggered_damp_remaining: Duration::ZERO,
            triggered_pending: false,
            verbose,
        };

        engine.broadcast_periodic().await?;
        if engine.verbose {
            display::print_table(engine.table.instance_id(), &engine.table.snapshot(Instant::now()));
        }
        Ok(engine)
    }

    /// Runs the event loop forever; returns only on a fatal error.
    pub async fn run(mut self) -> Result<(), EngineError> {
        loop {
            self.run_iteration().await?;
        }
    }

    /// One pass of steps 1-7 of the event loop.
    async fn run_iteration(&mut self) -> Result<(), EngineError> {
        let t0 = Instant::now();
        let tick = TICK.min(self.periodic_remaining.max(Duration::from_millis(1)));
        sleep(tick).await;

        let mut received = Vec::new();
        let mut buf = [0u8; MAX_DATAGRAM];
        for (_, socket) in self.sockets.sockets() {
            match socket.try_recv_from(&mut buf) {
                Ok((len, _addr)) => received.push(buf[..len].to_vec()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(EngineError::Io(e)),
            }
        }
        for datagram in received {
            self.handle_datagram(&datagram, Instant::now());
        }

        let now = Instant::now();
        let sweep_triggered = self.table.sweep(self.config.route_timeout, self.config.garbage_time, now);
        if sweep_triggered {
            self.triggered_pending = true;
        }

        let elapsed = now.saturating_duration_since(t0);
        self.periodic_remaining = self.periodic_remaining.saturating_sub(elapsed);
        self.triggered_damp_remaining = self.triggered_damp_remaining.saturating_sub(elapsed);

        if self.periodic_remaining.is_zero() {
            self.broadcast_periodic().await?;
            self.periodic_remaining = jittered_period(self.config.periodic_update_time);
            self.table.clear_all_changed();
            self.triggered_pending = false;
            self.triggered_damp_remaining = damp_interval();
        } else if self.triggered_damp_remaining.is_zero() && self.triggered_pending {
            self.broadcast_triggered().await?;
            self.table.clear_all_changed();
            self.triggered_pending = false;
            self.triggered_damp_remaining = damp_interval();
        }

        if self.verbose {
            display::print_table(self.table.instance_id(), &self.table.snapshot(Instant::now()));
        }

        Ok(())
    }

    /// Applies a single decoded datagram to the route table, after
    /// validating decode success and neighbour membership.
    fn handle_datagram(&mut self, bytes: &[u8], now: Instant) {
        let packet = match codec::decode(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(error = %err, "dropping malformed datagram");
                return;
            }
        };

        let Some(link_cost) = self.config.neighbors.link_cost(packet.sender) else {
            tracing::warn!(sender = packet.sender, "dropping datagram from unknown sender");
            return;
        };

        let advertised: Vec<(RouterId, u8)> =
            packet.entries.iter().map(|e| (e.destination, e.metric)).collect();
        let triggered = self.table.apply_update(packet.sender, link_cost, &advertised, now);
        if triggered {
            self.triggered_pending = true;
            tracing::info!(sender = packet.sender, "authority pushed a route to infinity");
        }
    }

    /// Sends a full, non-triggered broadcast to every neighbour.
    async fn broadcast_periodic(&self) -> Result<(), EngineError> {
        for neighbor in self.config.neighbors.iter() {
            let entries = self.table.entries_for(neighbor.peer_id, false);
            self.send_packet(neighbor.port, entries).await?;
        }
        Ok(())
    }

    /// Sends a triggered broadcast (only `changed` rows) to neighbours that
    /// have something new to report.
    async fn broadcast_triggered(&self) -> Result<(), EngineError> {
        for neighbor in self.config.neighbors.iter() {
            let entries = self.table.entries_for(neighbor.peer_id, true);
            if entries.is_empty() {
                continue;
            }
            self.send_packet(neighbor.port, entries).await?;
        }
        Ok(())
    }

    async fn send_packet(&self, port: u16, entries: Vec<WireEntry>) -> Result<(), EngineError> {
        let packet = RipPacket { sender: self.table.instance_id(), entries };
        let bytes = packet.encode().map_err(EngineError::Encode)?;
        let target = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
        self.sockets
            .send_socket()
            .send_to(&bytes, target)
            .await
            .map_err(EngineError::Io)?;
        Ok(())
    }
}

fn jittered_period(period: Duration) -> Duration {
    let span = period.as_secs_f64() * 0.2;
    let jitter = rand::thread_rng().gen_range(-span..=span);
    Duration::from_secs_f64((period.as_secs_f64() + jitter).max(0.0))
}

fn damp_interval() -> Duration {
    Duration::from_secs_f64(rand::thread_rng().gen_range(1.0..=5.0))
}
