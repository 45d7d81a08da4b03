//! Process-backed toolchain.
//!
//! Shells out to a C/C++ compiler driver and an archiver:
//!
//! ```text
//! compile  cc -c <src> -I<dir>... <mode flags> -o <out>/obj/<pkg>/<name>/<stem>-<hash>.o
//! archive  ar rcs <out>/lib/<pkg>/lib<name>.a <objects>
//! link     cc <objects> <libraries> <mode flags> -o <out>/bin/<pkg>/<name>
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::rule::TargetKind;
use crate::rule::split_name;

use super::Toolchain;
use super::types::{BuildMode, CompileRequest, Diagnostic, LinkRequest};

/// Toolchain that runs external compiler and archiver processes.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
  out_dir: PathBuf,
  cc: String,
  ar: String,
}

impl CommandToolchain {
  /// Toolchain writing outputs under `out_dir`, using `cc` and `ar`.
  pub fn new(out_dir: impl Into<PathBuf>) -> Self {
    Self {
      out_dir: out_dir.into(),
      cc: "cc".to_string(),
      ar: "ar".to_string(),
    }
  }

  pub fn with_cc(mut self, cc: impl Into<String>) -> Self {
    self.cc = cc.into();
    self
  }

  pub fn with_ar(mut self, ar: impl Into<String>) -> Self {
    self.ar = ar.into();
    self
  }

  pub fn out_dir(&self) -> &Path {
    &self.out_dir
  }

  /// Output path and argument list for a compile.
  pub fn compile_command(&self, request: &CompileRequest) -> (PathBuf, Vec<OsString>) {
    let object = self
      .out_dir
      .join("obj")
      .join(target_dir(&request.target))
      .join(request.object_name());

    let mut args: Vec<OsString> = vec!["-c".into(), request.source.clone().into_os_string()];
    for dir in &request.include_paths {
      let mut flag = OsString::from("-I");
      flag.push(dir);
      args.push(flag);
    }
    args.extend(mode_flags(request.mode).iter().map(OsString::from));
    args.push("-o".into());
    args.push(object.clone().into_os_string());

    (object, args)
  }

  /// Program, output path and argument list for an archive or link.
  pub fn link_command(&self, request: &LinkRequest) -> (String, PathBuf, Vec<OsString>) {
    let (package, name) = split_target(&request.target);

    match request.kind {
      TargetKind::Library => {
        let artifact = self.out_dir.join("lib").join(package).join(format!("lib{}.a", name));
        let mut args: Vec<OsString> = vec!["rcs".into(), artifact.clone().into_os_string()];
        args.extend(request.objects.iter().map(|p| p.clone().into_os_string()));
        (self.ar.clone(), artifact, args)
      }
      TargetKind::Binary => {
        let artifact = self.out_dir.join("bin").join(package).join(name);
        let mut args: Vec<OsString> = request.objects.iter().map(|p| p.clone().into_os_string()).collect();
        // Dependents must precede their dependencies for single-pass linkers.
        args.extend(request.libraries.iter().rev().map(|p| p.clone().into_os_string()));
        if request.mode == BuildMode::Profile {
          args.push("-pg".into());
        }
        args.push("-o".into());
        args.push(artifact.clone().into_os_string());
        (self.cc.clone(), artifact, args)
      }
    }
  }
}

impl Toolchain for CommandToolchain {
  async fn compile(&self, request: CompileRequest) -> Result<PathBuf, Diagnostic> {
    let (object, args) = self.compile_command(&request);
    run(&self.cc, &args, &object).await?;
    Ok(object)
  }

  async fn link(&self, request: LinkRequest) -> Result<PathBuf, Diagnostic> {
    let (program, artifact, args) = self.link_command(&request);
    if request.kind == TargetKind::Library {
      // ar appends to an existing archive; start from a clean one.
      match tokio::fs::remove_file(&artifact).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Diagnostic::new(format!("failed to remove {}: {}", artifact.display(), e))),
      }
    }
    run(&program, &args, &artifact).await?;
    Ok(artifact)
  }
}

fn mode_flags(mode: BuildMode) -> &'static [&'static str] {
  match mode {
    BuildMode::Check => &["-g", "-O0"],
    BuildMode::Debug => &["-g", "-O0", "-DDEBUG"],
    BuildMode::Fast => &["-O2", "-DNDEBUG"],
    BuildMode::Profile => &["-O2", "-pg", "-DNDEBUG"],
  }
}

fn split_target(target: &str) -> (&str, &str) {
  split_name(target).unwrap_or(("", target))
}

fn target_dir(target: &str) -> PathBuf {
  let (package, name) = split_target(target);
  Path::new(package).join(name)
}

async fn run(program: &str, args: &[OsString], output: &Path) -> Result<(), Diagnostic> {
  if let Some(parent) = output.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .map_err(|e| Diagnostic::new(format!("failed to create {}: {}", parent.display(), e)))?;
  }

  debug!(program = %program, args = ?args, "spawning toolchain process");

  let result = Command::new(program)
    .args(args)
    .output()
    .await
    .map_err(|e| Diagnostic::new(format!("failed to run {}: {}", program, e)))?;

  if !result.status.success() {
    let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "toolchain stderr");
    }

    let message = if stderr.is_empty() {
      format!("{} exited with {}", program, result.status)
    } else {
      stderr
    };
    return Err(Diagnostic::new(message).with_exit_code(result.status.code()));
  }

  Ok(())
}
