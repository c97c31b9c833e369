use super::rule;
use anyhow::anyhow;
use colored::Colorize;
use nimbus_cloud::ProviderRegistry;

pub fn handle_providers(registry: &ProviderRegistry) -> anyhow::Result<()> {
    println!("{}", "Providers".bold());
    println!();
    println!(
        "{:<16} {:<24} {}",
        "KEY".bold(),
        "NAME".bold(),
        "LOCATIONS".bold()
    );
    rule(60);

    for info in registry.providers() {
        println!(
            "{:<16} {:<24} {}",
            info.provider.cyan(),
            info.name,
            info.locations.len()
        );
    }
    Ok(())
}

pub fn handle_locations(registry: &ProviderRegistry, provider: &str) -> anyhow::Result<()> {
    let info = registry
        .provider(provider)
        .ok_or_else(|| anyhow!("Provider '{}' not found", provider))?;

    println!("{} {}", "Locations of".bold(), info.name.cyan().bold());
    println!();
    if info.locations.is_empty() {
        println!("{}", "(no locations)".dimmed());
        return Ok(());
    }

    println!(
        "{:<20} {:<32} {}",
        "ID".bold(),
        "DESCRIPTION".bold(),
        "PARENT".bold()
    );
    rule(70);
    for location in &info.locations {
        println!(
            "{:<20} {:<32} {}",
            location.id.cyan(),
            location.description,
            location.parent.as_deref().unwrap_or("-").dimmed()
        );
    }
    Ok(())
}

pub fn handle_sizes(
    registry: &ProviderRegistry,
    provider: &str,
    location: &str,
) -> anyhow::Result<()> {
    let sizes = registry
        .sizes(provider, location)
        .ok_or_else(|| anyhow!("Location '{}' not found on provider '{}'", location, provider))?;

    println!(
        "{} {}/{}",
        "Sizes in".bold(),
        provider.cyan(),
        location.cyan()
    );
    println!();
    println!(
        "{:<20} {:>6} {:>10} {:>10} {:>8}",
        "NAME".bold(),
        "CORES".bold(),
        "MEMORY".bold(),
        "DISK".bold(),
        "COST".bold()
    );
    rule(58);
    for size in sizes {
        println!(
            "{:<20} {:>6} {:>10} {:>10} {:>8.2}",
            size.name.cyan(),
            size.cores,
            size.memory_display(),
            size.disk_display(),
            size.cost()
        );
    }
    Ok(())
}
