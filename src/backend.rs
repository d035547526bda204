use crate::error::{FatalError, ToolError};
use crate::toolchain::{self, Input, Toolchain};
use crate::types::BackendKind;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info};

/// Name of the executable every backend links, inside the scratch directory.
pub const EXE_NAME: &str = "a.out";

/// Turns the compiler's output into something runnable.
///
/// One value exists per selected backend; it is built once, with its runtime
/// already assembled, and then reused for every test.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Assembles and links `program_text`, returning the executable. The file is
    /// removed when the returned handle is dropped.
    fn assemble_and_link(&self, program_text: &str) -> Result<TempPath, ToolError>;

    /// Command prefix the executable must be started through, empty for host binaries.
    fn launcher(&self) -> Result<Vec<OsString>, ToolError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectFormat {
    Elf,
    MachO,
}

impl ObjectFormat {
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            ObjectFormat::MachO
        } else {
            ObjectFormat::Elf
        }
    }

    /// The `nasm -f` output format.
    pub fn nasm_format(self, x64: bool) -> &'static str {
        match (self, x64) {
            (ObjectFormat::Elf, false) => "elf32",
            (ObjectFormat::Elf, true) => "elf64",
            (ObjectFormat::MachO, false) => "macho32",
            (ObjectFormat::MachO, true) => "macho64",
        }
    }
}

fn scratch_file(dir: &Path, prefix: &str, suffix: &str) -> Result<NamedTempFile, ToolError> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| ToolError::io(format!("creating a temporary file in {}", dir.display()), e))
}

fn write_source(dir: &Path, prefix: &str, text: &str) -> Result<NamedTempFile, ToolError> {
    let mut file = scratch_file(dir, prefix, ".s")?;
    let path = file.path().to_path_buf();
    file.write_all(text.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| ToolError::io(format!("writing {}", path.display()), e))?;
    Ok(file)
}

fn runtime_source(lib_dir: &Path, name: &'static str) -> Result<PathBuf, FatalError> {
    let path = lib_dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(FatalError::MissingRuntime(name))
    }
}

/// State every backend shares: tool names, the scratch directory and the assembled runtime.
#[derive(Debug, Clone)]
struct LinkContext {
    toolchain: Toolchain,
    scratch: PathBuf,
    runtime: PathBuf,
}

impl LinkContext {
    fn exe(&self) -> Result<TempPath, ToolError> {
        let path = self.scratch.join(EXE_NAME);
        TempPath::try_from_path(&path)
            .map_err(|e| ToolError::io(format!("claiming {}", path.display()), e))
    }

    fn tool(&self, program: &str, args: &[&OsStr], input: Input<'_>) -> Result<(), ToolError> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        toolchain::run_checked(&mut cmd, program, input, self.toolchain.timeout()).map(|_| ())
    }
}

/// LLVM IR, assembled to bitcode and linked against `runtime.bc`.
#[derive(Debug, Clone)]
pub struct BitcodeBackend {
    ctx: LinkContext,
}

impl BitcodeBackend {
    pub const RUNTIME_SOURCE: &'static str = "runtime.ll";

    pub fn prepare(toolchain: &Toolchain, lib_dir: &Path, scratch: &Path) -> Result<Self, FatalError> {
        let source = runtime_source(lib_dir, Self::RUNTIME_SOURCE)?;
        let runtime = scratch.join("runtime.bc");
        let mut cmd = Command::new(&toolchain.llvm_as);
        cmd.arg(&source).arg("-o").arg(&runtime);
        toolchain::run_checked(&mut cmd, &toolchain.llvm_as, Input::Empty, toolchain.timeout())
            .map_err(FatalError::RuntimeAssembly)?;
        Ok(BitcodeBackend {
            ctx: LinkContext {
                toolchain: toolchain.clone(),
                scratch: scratch.to_path_buf(),
                runtime,
            },
        })
    }
}

impl Backend for BitcodeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Bitcode
    }

    fn assemble_and_link(&self, program_text: &str) -> Result<TempPath, ToolError> {
        let tc = &self.ctx.toolchain;
        let bitcode = scratch_file(&self.ctx.scratch, "test_llvm_", ".bc")?;
        let linked = scratch_file(&self.ctx.scratch, "test_llvm_main_", ".bc")?;
        let exe = self.ctx.exe()?;

        self.ctx.tool(
            &tc.llvm_as,
            &[OsStr::new("-o"), bitcode.path().as_os_str()],
            Input::Bytes(program_text.as_bytes()),
        )?;
        self.ctx.tool(
            &tc.llvm_link,
            &[
                bitcode.path().as_os_str(),
                self.ctx.runtime.as_os_str(),
                OsStr::new("-o"),
                linked.path().as_os_str(),
            ],
            Input::Empty,
        )?;
        self.ctx.tool(
            &tc.clang,
            &[linked.path().as_os_str(), OsStr::new("-o"), exe.as_os_str()],
            Input::Empty,
        )?;
        Ok(exe)
    }
}

/// NASM assembly for 32- or 64-bit x86, linked against `runtimex86.o` or `runtimex64.o`.
#[derive(Debug, Clone)]
pub struct X86Backend {
    ctx: LinkContext,
    x64: bool,
    format: ObjectFormat,
}

impl X86Backend {
    pub const RUNTIME_SOURCE: &'static str = "runtime.s";

    pub fn prepare(
        toolchain: &Toolchain,
        lib_dir: &Path,
        scratch: &Path,
        x64: bool,
        format: ObjectFormat,
    ) -> Result<Self, FatalError> {
        let source = runtime_source(lib_dir, Self::RUNTIME_SOURCE)?;
        let runtime = scratch.join(format!("runtime{}.o", if x64 { "x64" } else { "x86" }));
        let mut cmd = Command::new(&toolchain.nasm);
        cmd.arg("-f")
            .arg(format.nasm_format(x64))
            .arg(&source)
            .arg("-o")
            .arg(&runtime);
        toolchain::run_checked(&mut cmd, &toolchain.nasm, Input::Empty, toolchain.timeout())
            .map_err(FatalError::RuntimeAssembly)?;
        Ok(X86Backend {
            ctx: LinkContext {
                toolchain: toolchain.clone(),
                scratch: scratch.to_path_buf(),
                runtime,
            },
            x64,
            format,
        })
    }
}

impl Backend for X86Backend {
    fn kind(&self) -> BackendKind {
        if self.x64 { BackendKind::X64 } else { BackendKind::X86 }
    }

    fn assemble_and_link(&self, program_text: &str) -> Result<TempPath, ToolError> {
        let tc = &self.ctx.toolchain;
        let source = write_source(&self.ctx.scratch, "test_x86_", program_text)?;
        let object = scratch_file(&self.ctx.scratch, "test_x86_", ".o")?;
        let exe = self.ctx.exe()?;

        self.ctx.tool(
            &tc.nasm,
            &[
                OsStr::new("-f"),
                OsStr::new(self.format.nasm_format(self.x64)),
                source.path().as_os_str(),
                OsStr::new("-o"),
                object.path().as_os_str(),
            ],
            Input::Empty,
        )?;

        let mut args: Vec<&OsStr> = Vec::new();
        if !self.x64 {
            args.push(OsStr::new("-m32"));
        }
        args.extend([
            object.path().as_os_str(),
            self.ctx.runtime.as_os_str(),
            OsStr::new("-o"),
            exe.as_os_str(),
        ]);
        self.ctx.tool(&tc.clang, &args, Input::Empty)?;
        Ok(exe)
    }
}

/// RISC-V assembly, cross-built with a GCC toolchain and run under an emulator.
#[derive(Debug, Clone)]
pub struct RiscVBackend {
    ctx: LinkContext,
}

impl RiscVBackend {
    pub const RUNTIME_SOURCE: &'static str = "runtime-riscv.s";

    pub fn prepare(toolchain: &Toolchain, lib_dir: &Path, scratch: &Path) -> Result<Self, FatalError> {
        let source = runtime_source(lib_dir, Self::RUNTIME_SOURCE)?;
        let runtime = scratch.join("runtime-riscv.o");
        let mut cmd = Command::new(&toolchain.riscv_gcc);
        cmd.arg("-c").arg(&source).arg("-o").arg(&runtime);
        toolchain::run_checked(&mut cmd, &toolchain.riscv_gcc, Input::Empty, toolchain.timeout())
            .map_err(FatalError::RuntimeAssembly)?;
        Ok(RiscVBackend {
            ctx: LinkContext {
                toolchain: toolchain.clone(),
                scratch: scratch.to_path_buf(),
                runtime,
            },
        })
    }
}

impl Backend for RiscVBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RiscV
    }

    fn assemble_and_link(&self, program_text: &str) -> Result<TempPath, ToolError> {
        let gcc = &self.ctx.toolchain.riscv_gcc;
        let source = write_source(&self.ctx.scratch, "test_riscv_", program_text)?;
        let object = scratch_file(&self.ctx.scratch, "test_riscv_", ".o")?;
        let exe = self.ctx.exe()?;

        self.ctx.tool(
            gcc,
            &[
                OsStr::new("-c"),
                source.path().as_os_str(),
                OsStr::new("-o"),
                object.path().as_os_str(),
            ],
            Input::Empty,
        )?;
        self.ctx.tool(
            gcc,
            &[
                object.path().as_os_str(),
                self.ctx.runtime.as_os_str(),
                OsStr::new("-o"),
                exe.as_os_str(),
            ],
            Input::Empty,
        )?;
        Ok(exe)
    }

    fn launcher(&self) -> Result<Vec<OsString>, ToolError> {
        let tc = &self.ctx.toolchain;
        let resolve = |tool: &str| {
            which::which(tool).map_err(|_| ToolError::Missing {
                tool: tool.to_string(),
            })
        };
        let emulator = resolve(&tc.emulator)?;
        let kernel = resolve(&tc.proxy_kernel)?;
        debug!("running under {} {}", emulator.display(), kernel.display());
        Ok(vec![emulator.into_os_string(), kernel.into_os_string()])
    }
}

/// Assembles the runtime for `kind` and returns its backend, or `None` for type checking.
pub fn prepare(
    kind: BackendKind,
    toolchain: &Toolchain,
    lib_dir: &Path,
    scratch: &Path,
) -> Result<Option<Box<dyn Backend>>, FatalError> {
    if kind.links() {
        info!("assembling the {kind} runtime");
    }
    let backend: Box<dyn Backend> = match kind {
        BackendKind::None => return Ok(None),
        BackendKind::Bitcode => Box::new(BitcodeBackend::prepare(toolchain, lib_dir, scratch)?),
        BackendKind::X86 => Box::new(X86Backend::prepare(
            toolchain,
            lib_dir,
            scratch,
            false,
            ObjectFormat::host(),
        )?),
        BackendKind::X64 => Box::new(X86Backend::prepare(
            toolchain,
            lib_dir,
            scratch,
            true,
            ObjectFormat::host(),
        )?),
        BackendKind::RiscV => Box::new(RiscVBackend::prepare(toolchain, lib_dir, scratch)?),
    };
    Ok(Some(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn frame_selector_matches_width_and_format() {
        assert_eq!(ObjectFormat::Elf.nasm_format(false), "elf32");
        assert_eq!(ObjectFormat::Elf.nasm_format(true), "elf64");
        assert_eq!(ObjectFormat::MachO.nasm_format(false), "macho32");
        assert_eq!(ObjectFormat::MachO.nasm_format(true), "macho64");
    }

    #[test]
    fn missing_runtime_source_is_fatal() {
        let lib = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let err = prepare(BackendKind::RiscV, &Toolchain::default(), lib.path(), scratch.path())
            .err()
            .unwrap();
        assert!(matches!(err, FatalError::MissingRuntime("runtime-riscv.s")));
    }

    #[test]
    fn type_checking_has_no_backend() {
        let dir = tempdir().unwrap();
        let backend = prepare(BackendKind::None, &Toolchain::default(), dir.path(), dir.path()).unwrap();
        assert!(backend.is_none());
    }

    fn context(scratch: &Path, toolchain: Toolchain) -> LinkContext {
        LinkContext {
            toolchain,
            scratch: scratch.to_path_buf(),
            runtime: scratch.join("runtime.o"),
        }
    }

    #[test]
    fn executable_handle_owns_a_out() {
        let scratch = tempdir().unwrap();
        let exe = context(scratch.path(), Toolchain::default()).exe().unwrap();
        assert_eq!(&*exe, scratch.path().join(EXE_NAME).as_path());
        std::fs::write(&exe, "").unwrap();
        drop(exe);
        assert!(!scratch.path().join(EXE_NAME).exists());
    }

    #[test]
    fn missing_emulator_is_a_tool_error() {
        let scratch = tempdir().unwrap();
        let toolchain = Toolchain {
            emulator: "no-such-spike-4711".into(),
            ..Toolchain::default()
        };
        let backend = RiscVBackend {
            ctx: context(scratch.path(), toolchain),
        };
        let err = backend.launcher().unwrap_err();
        assert!(matches!(err, ToolError::Missing { ref tool } if tool == "no-such-spike-4711"));
    }

    #[test]
    fn failed_assembly_leaves_no_temporaries() {
        let scratch = tempdir().unwrap();
        let backend = X86Backend {
            ctx: LinkContext {
                toolchain: Toolchain {
                    nasm: "definitely-not-nasm-4711".into(),
                    ..Toolchain::default()
                },
                scratch: scratch.path().to_path_buf(),
                runtime: scratch.path().join("runtimex64.o"),
            },
            x64: true,
            format: ObjectFormat::Elf,
        };
        let err = backend.assemble_and_link("section .text\n").unwrap_err();
        assert!(matches!(err, ToolError::Launch { .. }));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
