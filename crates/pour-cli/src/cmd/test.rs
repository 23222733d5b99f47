use std::path::Path;

use anyhow::{Result, bail};
use pour_core::Reporter;
use pour_core::receipt;
use pour_core::smoke::SmokeTest;

use super::{Context, load_recipe};

/// Re-run the smoke test against the active install
pub fn test(ctx: &Context, recipe_path: Option<&Path>) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let name = &recipe.package.name;

    let Some(installed) = receipt::active_receipt(&ctx.layout, name)? else {
        bail!("{name} is not installed. Run 'pour install' first.");
    };
    let Some(spec) = &recipe.test else {
        ctx.reporter.warning(&format!("Recipe for {name} defines no smoke test"));
        return Ok(());
    };

    ctx.reporter.step(name, &installed.version, "testing");
    let executable = ctx.layout.bin_dir().join(recipe.test_executable());
    let reports = SmokeTest::new(spec, executable, ctx.config.smoke_timeout())
        .run(&installed.version)?;

    if let Some(first) = reports.first() {
        print!("{}", first.stdout);
    }
    ctx.reporter.done(name, &installed.version, "smoke test passed", None);
    Ok(())
}
