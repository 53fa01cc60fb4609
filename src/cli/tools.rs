//! `aiops tools` - capability catalogue

use std::process::ExitCode;

/// Run the tools command
pub fn run() -> anyhow::Result<ExitCode> {
    let Some(config) = super::load()? else {
        return Ok(ExitCode::FAILURE);
    };
    let registry = super::build_registry(&config)?;

    println!("🔧 {} capabilities\n", registry.len());
    for descriptor in registry.catalogue().descriptors() {
        println!("  {:<20} {}", descriptor.name, descriptor.description);
        if let Some(properties) = descriptor.input_schema["properties"].as_object() {
            let required: Vec<&str> = descriptor.input_schema["required"]
                .as_array()
                .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
                .unwrap_or_default();
            for name in properties.keys() {
                let marker = if required.contains(&name.as_str()) {
                    " (required)"
                } else {
                    ""
                };
                println!("  {:<20}   - {}{}", "", name, marker);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
