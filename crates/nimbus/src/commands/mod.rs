pub mod instances;
pub mod providers;
pub mod tags;

use colored::{ColoredString, Colorize};
use nimbus_cloud::InstanceStatus;

pub(crate) fn colored_status(status: InstanceStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        InstanceStatus::Active => label.green(),
        InstanceStatus::Requested | InstanceStatus::Building => label.yellow(),
        InstanceStatus::Terminated => label.red(),
        InstanceStatus::Unknown => label.dimmed(),
    }
}

pub(crate) fn rule(width: usize) {
    println!("{}", "─".repeat(width).dimmed());
}
