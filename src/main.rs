use anyhow::Result;

fn main() -> Result<()> {
    nina_watch::cli::cli()
}
