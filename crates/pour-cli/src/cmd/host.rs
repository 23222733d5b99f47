use anyhow::Result;

use super::install::describe_class;
use super::{Context, load_recipe};
use pour_core::adapter::PlatformClass;

/// Print the Host Platform Descriptor
pub fn host(ctx: &Context) -> Result<()> {
    println!("{}", ctx.host);
    println!("  os:   {}", ctx.host.os);
    println!("  arch: {}", ctx.host.arch);

    let recipe = load_recipe(None)?;
    if let Some(spec) = &recipe.fallbacks {
        let class = PlatformClass::classify(&ctx.host.os, spec);
        println!("  {} fallbacks: {}", recipe.package.name, describe_class(&class));
    }
    Ok(())
}
