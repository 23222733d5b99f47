use std::io::{Write, stdout};

use anyhow::Result;
use crossterm::QueueableCommand;
use crossterm::style::{Print, ResetColor, SetForegroundColor};
use pour_core::receipt::list_installed;

use super::Context;
use crate::ui::Theme;

/// List installed packages
pub fn list(ctx: &Context) -> Result<()> {
    let receipts = list_installed(&ctx.layout)?;
    if receipts.is_empty() {
        println!();
        println!("  No packages installed.");
        println!("  Run 'pour install' to get started.");
        return Ok(());
    }

    let theme = Theme::default();
    let mut out = stdout();
    for r in &receipts {
        let links: Vec<&str> = r.links.iter().map(|l| l.name.as_str()).collect();
        out.queue(SetForegroundColor(theme.colors.package_name))?
            .queue(Print(format!("{:<20}", r.name.as_str())))?
            .queue(SetForegroundColor(theme.colors.version))?
            .queue(Print(format!("{:<12}", r.version.as_str())))?
            .queue(SetForegroundColor(theme.colors.secondary))?
            .queue(Print(format!(
                "{}  {}  {}\n",
                r.installed_at.format("%Y-%m-%d"),
                r.host,
                links.join(", ")
            )))?
            .queue(ResetColor)?;
    }
    out.flush()?;
    Ok(())
}
