use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use console::Style;
use elastix_core::workspace::workspace_root;
use elastix_core::ExecutableLocator;

#[derive(Args)]
pub struct LocateArgs {
    /// elastix install directory or binary (overrides ELASTIX_PATH)
    #[arg(long)]
    pub elastix_path: Option<PathBuf>,

    /// Also list every directory that is searched
    #[arg(long)]
    pub all: bool,
}

pub fn run(args: &LocateArgs) -> Result<()> {
    let label = Style::new().dim();
    let path = Style::new().underlined();

    let mut locator = ExecutableLocator::from_env();
    if args.elastix_path.is_some() {
        locator = locator.with_override(args.elastix_path.clone());
    }

    if args.all {
        println!("Search order:");
        for dir in locator.candidate_dirs() {
            println!("  {}", dir.display());
        }
        println!();
    }

    let exes = locator
        .locate()
        .context("elastix is not installed or could not be found")?;
    println!(
        "  {:<14}{}",
        label.apply_to("elastix"),
        path.apply_to(exes.elastix.display())
    );
    println!(
        "  {:<14}{}",
        label.apply_to("transformix"),
        path.apply_to(exes.transformix.display())
    );
    println!(
        "  {:<14}{}",
        label.apply_to("Workspaces"),
        path.apply_to(workspace_root().display())
    );
    Ok(())
}
