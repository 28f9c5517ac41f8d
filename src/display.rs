//! Console rendering of the forwarding table.

use crate::table::TableSnapshot;
use crate::RouterId;

/// Prints the forwarding table for `instance_id` to stdout.
///
/// Purely a read-only consumer of a [`TableSnapshot`]; never touches engine
/// state and performs no screen clearing.
pub fn print_table(instance_id: RouterId, snapshot: &TableSnapshot) {
    println!("Forwarding Table for {instance_id}");
    print!("{snapshot}");
}
