use anyhow::Result;
use vergen::EmitBuilder;

// Commit SHA and build date for the CLI --version string
fn main() -> Result<()> {
    EmitBuilder::builder()
        .build_date()
        .git_sha(true)
        .emit()?;
    Ok(())
}
