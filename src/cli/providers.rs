use anyhow::Result;

use crate::output;
use crate::provider::ProviderRegistry;

pub fn list() {
    let registry = ProviderRegistry::with_defaults();
    output::header("Registered providers");
    for name in registry.names() {
        println!("  {}", name);
    }
}

pub async fn validate(name: &str, token: &str) -> Result<()> {
    let registry = ProviderRegistry::with_defaults();
    let driver = registry.get(name, token)?;

    driver.validate_credentials().await?;
    output::success(&format!("Credentials valid for {}", driver.display_name()));

    let regions = driver.get_regions().await;
    let sizes = driver.get_sizes().await;

    output::info(&format!("supports_ssh: {}", driver.supports_ssh()));
    output::info(&format!("supports_byos: {}", driver.supports_byos()));
    output::info(&format!("regions: {}", regions.join(", ")));
    output::info(&format!("sizes: {}", sizes.join(", ")));

    Ok(())
}
