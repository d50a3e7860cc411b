//! Client side of org.freedesktop.systemd1.Manager
//!
//! Only the calls needed to run a transient scope:
//! - StartTransientUnit: create the scope and place PIDs in it
//! - StopUnit: tear a scope down again
//! - Subscribe: ask systemd to broadcast job signals to us
//! - JobRemoved: terminal notification for a queued job

use zbus::{
    proxy,
    zvariant::{ObjectPath, OwnedObjectPath, Value},
};

/// Unit property list as sent over the bus, signature `a(sv)`
pub type Properties<'a> = Vec<(&'a str, Value<'a>)>;

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
pub trait Manager {
    /// Create and start a transient unit. Returns the job object path.
    fn start_transient_unit(
        &self,
        name: &str,
        mode: &str,
        properties: &[(&str, Value<'_>)],
        aux: &[(&str, &[(&str, Value<'_>)])],
    ) -> zbus::Result<OwnedObjectPath>;

    /// Stop a unit by name. Returns the job object path.
    fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    /// Enable signal emission for this client
    fn subscribe(&self) -> zbus::Result<()>;

    /// Emitted when a job completes
    #[zbus(signal)]
    fn job_removed(&self, id: u32, job: ObjectPath<'_>, unit: &str, result: &str)
        -> zbus::Result<()>;
}
