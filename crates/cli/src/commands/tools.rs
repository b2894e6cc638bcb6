//! `toolgate tools`: the tools a set of groups may use.

use anyhow::Context;
use toolgate_config::AppConfig;
use toolgate_core::User;

use super::run_tool::build_registry;

pub fn run(groups: Vec<String>) -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load config")?;
    let (registry, _) = build_registry(&config)?;
    let user = User::new("cli").with_groups(groups);

    let visible = registry.schemas_for(&user);
    println!(
        "{} of {} tools available to groups [{}]\n",
        visible.len(),
        registry.len(),
        user.group_memberships
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    for schema in visible {
        let groups = if schema.access_groups.is_empty() {
            "public".to_string()
        } else {
            schema.access_groups.join(", ")
        };
        println!("  {:<12} {}  ({groups})", schema.name, schema.description);
        if let Some(required) = schema.parameters["required"].as_array() {
            let required: Vec<_> = required.iter().filter_map(|v| v.as_str()).collect();
            if !required.is_empty() {
                println!("  {:<12} required: {}", "", required.join(", "));
            }
        }
    }
    Ok(())
}
