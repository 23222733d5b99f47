use std::path::Path;

use anyhow::Result;
use pour_core::Reporter;
use pour_core::adapter::PlatformClass;
use pour_core::install::{InstallOptions, Installer};
use pour_core::npm::NpmInstaller;

use super::{Context, load_recipe};

/// Install a package from its recipe
pub async fn install(
    ctx: &Context,
    recipe_path: Option<&Path>,
    skip_test: bool,
    dry_run: bool,
) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let pkg = &recipe.package;

    if dry_run {
        // An absent npm is reported, not fatal, so a plan can be shown anywhere.
        let npm = NpmInstaller::new(ctx.config.npm_program(), ctx.layout.npm_cache_dir());
        let installer = Installer::new(&ctx.layout, &ctx.host, &npm, &ctx.reporter)?;
        let plan = installer.plan(&recipe);

        println!("Would install {} {} for {}", pkg.name, pkg.version, ctx.host);
        println!("  source:       {}", pkg.url);
        println!("  target:       {}", plan.target.display());
        if plan.replaces_existing {
            println!("                (replaces the existing install of this version)");
        }
        println!("  links into:   {}", ctx.layout.bin_dir().display());
        if !plan.dependencies.is_empty() {
            println!("  requires:     {}", plan.dependencies.join(", "));
        }
        if let (Some(dir), Some(class)) = (&plan.fallback_dir, &plan.class) {
            println!("  fallbacks:    {}", dir.display());
            println!("                {}", describe_class(class));
        }
        if let Err(e) = installer.check_dependencies(&recipe) {
            ctx.reporter.warning(&e.to_string());
        }
        return Ok(());
    }

    ctx.reporter.section(&format!("Installing {} {}", pkg.name, pkg.version));
    let npm = NpmInstaller::locate(ctx.config.npm_program(), ctx.layout.npm_cache_dir())?;
    let receipt = Installer::new(&ctx.layout, &ctx.host, &npm, &ctx.reporter)?
        .with_smoke_timeout(ctx.config.smoke_timeout())
        .install(&recipe, InstallOptions { skip_test })
        .await?;

    for link in &receipt.links {
        ctx.reporter.info(&format!(
            "{} -> {}",
            ctx.layout.bin_dir().join(&link.name).display(),
            link.target.display()
        ));
    }
    Ok(())
}

pub(crate) fn describe_class(class: &PlatformClass) -> String {
    match class {
        PlatformClass::NeedsHelper(helper) => format!(
            "replaced by '{}' from package '{}'",
            helper.binary, helper.package
        ),
        PlatformClass::NativeFacilities => "emptied (host provides the facility)".to_string(),
        PlatformClass::Unsupported => "emptied (no policy for this OS)".to_string(),
    }
}
