use std::path::Path;

use anyhow::{Context as _, Result};
use pour_core::Reporter;
use pour_core::adapter::{PlatformAdapter, PlatformClass};

use super::install::describe_class;
use super::{Context, load_recipe};

/// Run platform adaptation on an existing npm prefix
pub fn adapt(ctx: &Context, libexec: &Path, recipe_path: Option<&Path>) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let libexec = std::path::absolute(libexec)
        .with_context(|| format!("Invalid path {}", libexec.display()))?;

    if let Some(spec) = &recipe.fallbacks {
        let class = PlatformClass::classify(&ctx.host.os, spec);
        ctx.reporter
            .info(&format!("{}: vendored fallbacks {}", ctx.host, describe_class(&class)));
    }

    let report = PlatformAdapter::new(&ctx.host, &ctx.layout).adapt(&recipe, &libexec, &libexec)?;

    if let Some(fallback) = &report.fallback {
        println!(
            "fallbacks: removed {} file(s) from {}",
            fallback.removed,
            fallback.dir.display()
        );
        if let Some(link) = &fallback.helper_link {
            println!("fallbacks: linked {}", link.display());
        }
    }
    for thinned in &report.thinned {
        println!(
            "thinned: {} ({} -> {} bytes, {})",
            thinned.path.display(),
            thinned.size_before,
            thinned.size_after,
            thinned.arch
        );
    }
    ctx.reporter.success(&format!("Adapted {} for {}", libexec.display(), ctx.host));
    Ok(())
}
