use std::error::Error;
use vergen_gitcl::{Emitter, GitclBuilder};

/// Emits the git describe string used in the CLI version.
/// # Errors
/// * if `git` is not available or the source tree is not a git checkout (e.g. a packaged tarball)
fn emit_git_describe() -> Result<(), Box<dyn Error>> {
    let gitcl = GitclBuilder::default()
        .describe(false, true, Some("NoTagShouldMatchThisPattern"))
        .build()?;

    Emitter::default()
        .fail_on_error()
        .add_instructions(&gitcl)?
        .emit()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    if emit_git_describe().is_err() {
        // packaged builds can provide their own description
        let git_desc = option_env!("SEQUIN_QC_GIT_DESCRIBE")
            .unwrap_or("unknown");
        println!("cargo:rustc-env=VERGEN_GIT_DESCRIBE={git_desc}");
    }

    println!("cargo:rerun-if-changed=Cargo.toml");
    println!("cargo:rerun-if-changed=src");
    println!("cargo:rerun-if-env-changed=SEQUIN_QC_GIT_DESCRIBE");
    Ok(())
}
