use super::{colored_status, rule};
use anyhow::{anyhow, bail};
use colored::Colorize;
use futures_util::TryStreamExt;
use nimbus_cloud::{
    DestructionStatus, Instance, InstanceCreationFailedResponse, InstanceCreationRequest,
    ProviderRegistry,
};

/// Arguments of `nimbus create`
#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub provider: String,
    pub location: Option<String>,
    pub size: String,
    pub name: String,
    pub roles: Vec<String>,
}

pub async fn handle_list(registry: &ProviderRegistry, json: bool) -> anyhow::Result<()> {
    let instances: Vec<Instance> = registry.list_all().try_collect().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&instances)?);
        return Ok(());
    }

    if instances.is_empty() {
        println!("{}", "No instances".dimmed());
        return Ok(());
    }

    println!(
        "{:<14} {:<16} {:<12} {:<11} {:<10} {:<14} {}",
        "ID".bold(),
        "NAME".bold(),
        "SIZE".bold(),
        "STATUS".bold(),
        "PROVIDER".bold(),
        "LOCATION".bold(),
        "HOSTNAME".bold()
    );
    rule(100);
    for instance in &instances {
        println!(
            "{:<14} {:<16} {:<12} {:<11} {:<10} {:<14} {}",
            instance.id.cyan(),
            instance.name,
            instance.size,
            colored_status(instance.status),
            instance.provider.as_deref().unwrap_or("-"),
            instance.location.as_deref().unwrap_or("-"),
            instance.hostname.as_deref().unwrap_or("-").dimmed()
        );
    }
    println!();
    println!("{} instance(s)", instances.len());
    Ok(())
}

pub async fn handle_show(registry: &ProviderRegistry, id: &str, json: bool) -> anyhow::Result<()> {
    let instance = registry
        .find_first(id)
        .await?
        .ok_or_else(|| anyhow!("Instance '{}' not found", id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&instance)?);
    } else {
        print_instance(&instance);
    }
    Ok(())
}

pub async fn handle_create(registry: &ProviderRegistry, args: CreateArgs) -> anyhow::Result<()> {
    let location = match args.location {
        Some(location) => location,
        None => registry
            .connector(&args.provider)
            .and_then(|c| c.default_location())
            .map(str::to_string)
            .unwrap_or_default(),
    };
    let request = InstanceCreationRequest::new(&args.provider, location, &args.size, &args.name)
        .with_roles(args.roles);

    println!(
        "{} {} on {}...",
        "Creating".green().bold(),
        request.size.cyan(),
        request.provider.cyan()
    );

    match registry.create(&request).await {
        Ok(instance) => {
            println!("{} {}", "✓".green(), "Instance created".green().bold());
            println!();
            print_instance(&instance);
            Ok(())
        }
        Err(err) => match err.creation_error() {
            Some(reason) => {
                let response = InstanceCreationFailedResponse {
                    requested_instance: request,
                    error: reason,
                };
                eprintln!("{} {}", "✗".red(), reason.message().red().bold());
                eprintln!("{}", serde_json::to_string_pretty(&response)?);
                bail!("{}", err)
            }
            None => Err(err.into()),
        },
    }
}

pub async fn handle_destroy(registry: &ProviderRegistry, id: &str) -> anyhow::Result<()> {
    match registry.destroy_first(id).await? {
        DestructionStatus::Destroyed => {
            println!("{} {} {}", "✓".green(), "Destroyed".green().bold(), id.cyan());
            Ok(())
        }
        DestructionStatus::NotFound => bail!("Instance '{}' not found", id),
    }
}

fn print_instance(instance: &Instance) {
    println!("  {:<10} {}", "ID".bold(), instance.id.cyan());
    println!("  {:<10} {}", "Name".bold(), instance.name);
    println!("  {:<10} {}", "Size".bold(), instance.size);
    println!("  {:<10} {}", "Status".bold(), colored_status(instance.status));
    println!(
        "  {:<10} {}",
        "Provider".bold(),
        instance.provider.as_deref().unwrap_or("-")
    );
    println!(
        "  {:<10} {}",
        "Location".bold(),
        instance.location.as_deref().unwrap_or("-")
    );
    println!(
        "  {:<10} {}",
        "Hostname".bold(),
        instance.hostname.as_deref().unwrap_or("-")
    );
    if instance.tags.is_empty() {
        println!("  {:<10} {}", "Tags".bold(), "-".dimmed());
    } else {
        let tags: Vec<&str> = instance.tags.iter().map(String::as_str).collect();
        println!("  {:<10} {}", "Tags".bold(), tags.join(", "));
    }
}
