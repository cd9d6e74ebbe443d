//! Build orchestration: restore-or-build, dependency recursion, sandboxed
//! execution, and post-build lockdown.
//!
//! ## Environment contract
//!
//! The build subprocess inherits the caller's environment with exactly two
//! overrides:
//!
//! | Variable | Value |
//! |---|---|
//! | `PREFIX` | The configured install prefix |
//! | `PATH` | `<prefix>/bin` prepended to the inherited `PATH` |
//!
//! No other sanitization is performed; the build command is trusted.

use std::fs::{self, File};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

use tracing::{debug, info, instrument};

use crate::cache::{self, enumerate_outputs, Manifest};
use crate::codebase::Codebase;
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::fs_util::{copy_tree_preserving_modes, freeze_tree};
use crate::stager::Stager;
use crate::types::CodebaseName;

/// Build `name` inside `ctx`, restoring from cache when possible.
///
/// After `name` finishes, if a `postbuild` sibling directory exists under
/// the monorepository root, it is built too (with its own outputs exempt
/// from manifest/CAS recording, so it always re-runs). This hook only fires
/// for the codebase the caller directly requested, not for its
/// dependencies.
#[instrument(skip(ctx, stager), fields(codebase = %name))]
pub fn build(ctx: &BuildContext, name: &CodebaseName, stager: &dyn Stager) -> Result<()> {
    build_one(ctx, name, stager, false)?;

    if ctx.has_postbuild() && name.as_str() != crate::types::POSTBUILD_CODEBASE {
        build_one(
            ctx,
            &CodebaseName::new(crate::types::POSTBUILD_CODEBASE),
            stager,
            true,
        )?;
    }

    Ok(())
}

/// Build a single codebase, recursing into its dependencies but never
/// triggering the `postbuild` hook itself. `skip_postbuild` controls only
/// whether this codebase's own outputs get recorded into the manifest/CAS.
fn build_one(
    ctx: &BuildContext,
    name: &CodebaseName,
    stager: &dyn Stager,
    skip_postbuild: bool,
) -> Result<()> {
    let hash = Codebase::resolve(ctx, name)?;

    if cache::restore(&ctx.metadata_prefix, name.as_str(), &hash)? {
        info!(codebase = %name, %hash, "restored from cache");
        return Ok(());
    }
    info!(codebase = %name, %hash, "cache miss, building");

    build_dependencies(ctx, name, stager)?;

    let (out_log, err_log) = open_log_files(ctx, name)?;

    let tmp_parent = tempfile::tempdir()?;
    let source_root = ctx.codebase_root(name);
    let work_dir = tmp_parent.path().join(name.as_str());
    fs::create_dir_all(&work_dir)?;
    copy_tree_preserving_modes(&source_root, &work_dir)?;
    debug!(codebase = %name, work_dir = %work_dir.display(), "copied source tree");

    stage_input_files(ctx, name, &work_dir, stager)?;

    run_build_command(ctx, name, &work_dir, &out_log, &err_log)?;

    freeze_tree(&ctx.prefix)?;
    debug!(codebase = %name, "froze prefix");

    if !skip_postbuild {
        record_and_populate(ctx, name, &hash)?;
    }

    Ok(())
}

fn build_dependencies(ctx: &BuildContext, name: &CodebaseName, stager: &dyn Stager) -> Result<()> {
    // The codebase's own metadata was loaded during fingerprinting; reload
    // it here rather than threading it through, since it's cheap and keeps
    // this function's signature simple.
    let root = ctx.codebase_root(name);
    let metadata = crate::metadata::Metadata::load(&root, name)?;
    for dep in &metadata.dependencies {
        let dep_name = CodebaseName::new(dep.clone());
        build_one(ctx, &dep_name, stager, false)?;
    }
    Ok(())
}

fn open_log_files(ctx: &BuildContext, name: &CodebaseName) -> Result<(File, File)> {
    fs::create_dir_all(&ctx.metadata_prefix)?;
    let out_path = ctx.metadata_prefix.join(format!("{name}.out"));
    let err_path = ctx.metadata_prefix.join(format!("{name}.err"));
    let out = File::create(out_path)?;
    let err = File::create(err_path)?;
    Ok((out, err))
}

fn stage_input_files(
    ctx: &BuildContext,
    name: &CodebaseName,
    work_dir: &Path,
    stager: &dyn Stager,
) -> Result<()> {
    let root = ctx.codebase_root(name);
    let metadata = crate::metadata::Metadata::load(&root, name)?;
    if metadata.input_files.is_empty() {
        return Ok(());
    }

    let input_dir = work_dir.join("input_files");
    fs::create_dir_all(&input_dir)?;
    let names: Vec<String> = metadata
        .input_files
        .iter()
        .map(|f| f.name.clone())
        .collect();
    stager
        .stage(&input_dir, &names)
        .map_err(|source| BuildError::StagerFailure {
            codebase: name.to_string(),
            source,
        })?;
    debug!(codebase = %name, count = names.len(), "staged input files");
    Ok(())
}

/// Select the build command by probing, in order, for an executable `build`
/// script and then a `Makefile`.
fn select_build_command(work_dir: &Path) -> Option<(&'static str, Vec<String>)> {
    let build_script = work_dir.join("build");
    if build_script.is_file() {
        let is_executable = fs::metadata(&build_script)
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false);
        if is_executable {
            return Some(("./build", Vec::new()));
        }
    }
    if work_dir.join("Makefile").is_file() {
        return Some(("make", Vec::new()));
    }
    None
}

fn run_build_command(
    ctx: &BuildContext,
    name: &CodebaseName,
    work_dir: &Path,
    out_log: &File,
    err_log: &File,
) -> Result<()> {
    let (program, args) =
        select_build_command(work_dir).ok_or_else(|| BuildError::NoBuildRecipe {
            codebase: name.to_string(),
        })?;

    let path_prefix = ctx.prefix.join("bin");
    let existing_path = std::env::var_os("PATH").unwrap_or_default();
    let new_path = std::env::join_paths(
        std::iter::once(path_prefix).chain(std::env::split_paths(&existing_path)),
    )
    .expect("joining PATH entries cannot fail");

    let mut command = Command::new(program);
    command
        .args(&args)
        .current_dir(work_dir)
        .env("PREFIX", &ctx.prefix)
        .env("PATH", new_path)
        .stdout(out_log.try_clone()?)
        .stderr(err_log.try_clone()?);

    info!(codebase = %name, command = program, "running build command");
    let status = command.status()?;

    if !status.success() {
        let stderr_log = ctx.metadata_prefix.join(format!("{name}.err"));
        return Err(BuildError::BuildCommandFailed {
            codebase: name.to_string(),
            status: status.to_string(),
            stderr_log,
        });
    }
    Ok(())
}

fn record_and_populate(ctx: &BuildContext, name: &CodebaseName, hash: &str) -> Result<()> {
    let (files, symbolic_links) = enumerate_outputs(&ctx.prefix)?;
    let manifest = Manifest {
        code_base: name.to_string(),
        prefix: ctx.prefix.clone(),
        hash: hash.to_string(),
        files,
        symbolic_links,
    };
    manifest.record(&ctx.metadata_prefix)?;
    manifest.populate_cas(&ctx.metadata_prefix)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stager::LocalStager;
    use std::os::unix::fs::PermissionsExt as _;

    fn write_codebase_with_build_script(root: &Path, name: &str, script: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("metadata.yaml"), "dependencies: []\n").unwrap();
        let build_path = dir.join("build");
        fs::write(&build_path, script).unwrap();
        fs::set_permissions(&build_path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn write_codebase_with_makefile(root: &Path, name: &str, makefile: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("metadata.yaml"), "dependencies: []\n").unwrap();
        fs::write(dir.join("Makefile"), makefile).unwrap();
    }

    #[test]
    fn fresh_build_installs_and_freezes_output() {
        let tmp = tempfile::tempdir().unwrap();
        let mono = tmp.path().join("monorepository");
        write_codebase_with_build_script(
            &mono,
            "alpha",
            "#!/bin/sh\nmkdir -p \"$PREFIX/share\"\nprintf hello > \"$PREFIX/share/alpha.txt\"\n",
        );

        let ctx = BuildContext::new(
            mono.clone(),
            CodebaseName::new("alpha"),
            mono.join("prefix"),
            mono.join("metadata_prefix"),
        );

        let stager = LocalStager::new(mono.join("inputs"));
        build(&ctx, &CodebaseName::new("alpha"), &stager).unwrap();

        let output = mono.join("prefix/share/alpha.txt");
        assert_eq!(fs::read_to_string(&output).unwrap(), "hello");
        let mode = fs::metadata(&output).unwrap().permissions().mode() & 0o222;
        assert_eq!(mode, 0);

        let manifest_files: Vec<_> = fs::read_dir(&ctx.metadata_prefix)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_string_lossy()
                    .starts_with("artifacts-alpha-")
            })
            .collect();
        assert_eq!(manifest_files.len(), 1);
    }

    #[test]
    fn falls_back_to_makefile_when_no_build_script_present() {
        let tmp = tempfile::tempdir().unwrap();
        let mono = tmp.path().join("monorepository");
        write_codebase_with_makefile(
            &mono,
            "alpha",
            "all:\n\tmkdir -p \"$(PREFIX)/bin\"\n\tprintf '#!/bin/sh\\n' > \"$(PREFIX)/bin/tool\"\n\tchmod +x \"$(PREFIX)/bin/tool\"\n",
        );

        let ctx = BuildContext::new(
            mono.clone(),
            CodebaseName::new("alpha"),
            mono.join("prefix"),
            mono.join("metadata_prefix"),
        );
        let stager = LocalStager::new(mono.join("inputs"));
        build(&ctx, &CodebaseName::new("alpha"), &stager).unwrap();

        let tool = mono.join("prefix/bin/tool");
        assert!(tool.exists());
        let mode = fs::metadata(&tool).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "tool should remain executable");
        assert_eq!(mode & 0o222, 0, "tool should not be writable after freezing");
    }

    #[test]
    fn missing_build_recipe_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mono = tmp.path().join("monorepository");
        let dir = mono.join("alpha");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("metadata.yaml"), "dependencies: []\n").unwrap();

        let ctx = BuildContext::new(
            mono.clone(),
            CodebaseName::new("alpha"),
            mono.join("prefix"),
            mono.join("metadata_prefix"),
        );
        let stager = LocalStager::new(mono.join("inputs"));
        let err = build(&ctx, &CodebaseName::new("alpha"), &stager).unwrap_err();
        assert!(matches!(err, BuildError::NoBuildRecipe { .. }));
    }

    #[test]
    fn second_build_restores_from_cache_without_rerunning_script() {
        let tmp = tempfile::tempdir().unwrap();
        let mono = tmp.path().join("monorepository");
        write_codebase_with_build_script(
            &mono,
            "alpha",
            "#!/bin/sh\nmkdir -p \"$PREFIX/share\"\nprintf hello > \"$PREFIX/share/alpha.txt\"\necho ran >> \"$PWD/ran_marker\"\n",
        );

        let ctx = BuildContext::new(
            mono.clone(),
            CodebaseName::new("alpha"),
            mono.join("prefix"),
            mono.join("metadata_prefix"),
        );
        let stager = LocalStager::new(mono.join("inputs"));

        build(&ctx, &CodebaseName::new("alpha"), &stager).unwrap();
        fs::remove_dir_all(&ctx.prefix).unwrap();

        let out_log = ctx.metadata_prefix.join("alpha.out");
        let before = fs::metadata(&out_log).unwrap().modified().unwrap();

        let ctx2 = BuildContext::new(
            mono.clone(),
            CodebaseName::new("alpha"),
            mono.join("prefix"),
            mono.join("metadata_prefix"),
        );
        build(&ctx2, &CodebaseName::new("alpha"), &stager).unwrap();

        let after = fs::metadata(&out_log).unwrap().modified().unwrap();
        assert_eq!(before, after);
        assert!(mono.join("prefix/share/alpha.txt").exists());
    }
}
