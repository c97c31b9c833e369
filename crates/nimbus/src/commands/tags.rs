use anyhow::bail;
use colored::Colorize;
use nimbus_cloud::{ProviderRegistry, TagUpdateStatus};

pub async fn handle_add(registry: &ProviderRegistry, id: &str, tag: &str) -> anyhow::Result<()> {
    match registry.add_tag(id, tag).await? {
        TagUpdateStatus::Updated => {
            println!("{} Tagged {} with {}", "✓".green(), id.cyan(), tag.bold());
            Ok(())
        }
        TagUpdateStatus::NotFound => bail!("Instance '{}' has no inventory record", id),
    }
}

pub async fn handle_remove(registry: &ProviderRegistry, id: &str, tag: &str) -> anyhow::Result<()> {
    match registry.delete_tag(id, tag).await? {
        TagUpdateStatus::Updated => {
            println!("{} Removed {} from {}", "✓".green(), tag.bold(), id.cyan());
            Ok(())
        }
        TagUpdateStatus::NotFound => bail!("Instance '{}' has no inventory record", id),
    }
}
