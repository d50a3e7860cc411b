//! Stop a scope unit

use scopedeleg::{BootstrapError, Bus, ScopeRegistrar};

pub async fn stop(name: &str, bus: Bus) -> Result<(), BootstrapError> {
    let registrar = ScopeRegistrar::connect(bus).await?;
    registrar.stop(name).await?;

    println!("● {} - stopping", name);
    Ok(())
}
