//! IPv4 range enumeration for scan seeding.

use anyhow::{Result, bail};
use ipnet::Ipv4Net;
use protocol::Task;

/// Upper bound on tasks produced from a single range.
pub const MAX_SCAN_TASKS: usize = 1 << 16;

/// Split `range` into subnets of prefix length `granularity`.
///
/// A range already as small as (or smaller than) the granularity yields
/// itself, so every range produces at least one subnet.
pub fn enumerate(range: Ipv4Net, granularity: u8) -> Result<Vec<Ipv4Net>> {
    if granularity > 32 {
        bail!("granularity /{granularity} is not a valid IPv4 prefix");
    }

    let range = range.trunc();
    if granularity <= range.prefix_len() {
        return Ok(vec![range]);
    }

    let count = 1usize << (granularity - range.prefix_len());
    if count > MAX_SCAN_TASKS {
        bail!("{range} at /{granularity} would produce {count} tasks (max {MAX_SCAN_TASKS})");
    }
    Ok(range.subnets(granularity)?.collect())
}

/// One task per subnet of `range`; each task's arguments end with its subnet.
pub fn scan_tasks(range: Ipv4Net, granularity: u8, command: &str, args: &str) -> Result<Vec<Task>> {
    let tasks = enumerate(range, granularity)?
        .into_iter()
        .map(|subnet| {
            let args = match args.trim() {
                "" => subnet.to_string(),
                args => format!("{args} {subnet}"),
            };
            Task::exec(command, args)
        })
        .collect();
    Ok(tasks)
}
