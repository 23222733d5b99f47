use anyhow::Result;
use pour_core::Reporter;
use pour_schema::PackageName;

use super::Context;

/// Remove every installed version of a package
pub fn uninstall(ctx: &Context, name: &str) -> Result<()> {
    let name = PackageName::new(name);
    let removed = pour_core::install::uninstall(&ctx.layout, &name)?;
    ctx.reporter
        .success(&format!("Removed {name} ({removed} version(s))"));
    Ok(())
}
