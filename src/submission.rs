use crate::error::{FatalError, ToolError};
use crate::toolchain::{self, Input, Toolchain};
use crate::types::BackendKind;
use crate::workspace::Workspace;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use tracing::info;

static ARCHIVE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^part(A|B|C)-[1-9][0-9]*\.(tgz|tar\.(gz|bz2|xz))$").unwrap()
});

const REQUIRED_DIRS: [&str; 3] = ["doc", "lib", "src"];
const BUILD_FILE: &str = "Makefile";

pub fn check_archive_name(file_name: &str) -> Result<(), FatalError> {
    if ARCHIVE_NAME.is_match(file_name) {
        Ok(())
    } else {
        Err(FatalError::BadArchiveName(file_name.to_string()))
    }
}

/// A student submission, either a directory or an archive unpacked into a workspace.
#[derive(Debug)]
pub struct Submission {
    root: PathBuf,
    _unpacked: Option<Workspace>,
}

impl Submission {
    pub fn open(path: &Path, toolchain: &Toolchain, keep: bool) -> Result<Self, FatalError> {
        if !path.exists() {
            return Err(FatalError::SubmissionNotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Ok(Submission {
                root: path.to_path_buf(),
                _unpacked: None,
            });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        check_archive_name(&file_name)?;

        let ws = Workspace::create("testing_", keep)?;
        info!("unpacking {} to {}", file_name, ws.path().display());
        let mut cmd = Command::new(&toolchain.tar);
        cmd.arg("-xf").arg(path).arg("-C").arg(ws.path());
        match toolchain::run_checked(&mut cmd, &toolchain.tar, Input::Empty, toolchain.timeout()) {
            Ok(_) => {}
            Err(ToolError::Failed { stderr, .. }) => return Err(FatalError::Unpack(stderr)),
            Err(e) => return Err(e.into()),
        }
        Ok(Submission {
            root: ws.path().to_path_buf(),
            _unpacked: Some(ws),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.root.join("lib")
    }

    pub fn compiler_path(&self, prefix: &str, kind: BackendKind) -> PathBuf {
        self.root.join(kind.executable_name(prefix))
    }

    /// The submission must carry `doc/`, `lib/`, `src/` and a `Makefile`.
    pub fn check_contents(&self) -> Result<(), FatalError> {
        for dir in REQUIRED_DIRS {
            if !self.root.join(dir).is_dir() {
                return Err(FatalError::MissingDirectory(dir));
            }
        }
        if !self.root.join(BUILD_FILE).is_file() {
            return Err(FatalError::MissingBuildFile);
        }
        Ok(())
    }

    pub fn build(&self, toolchain: &Toolchain) -> Result<(), FatalError> {
        info!("running {} in {}", toolchain.make, self.root.display());
        let mut cmd = Command::new(&toolchain.make);
        cmd.arg("-C").arg(&self.root);
        match toolchain::run_checked(&mut cmd, &toolchain.make, Input::Empty, toolchain.build_timeout()) {
            Ok(_) => Ok(()),
            Err(ToolError::Failed { stderr, .. }) => Err(FatalError::Build(stderr)),
            Err(e) => Err(e.into()),
        }
    }

    /// Checks that the build produced one executable per backend, or the plain
    /// `<prefix>` when only type checking.
    pub fn check_executables(&self, prefix: &str, backends: &[BackendKind]) -> Result<(), FatalError> {
        let kinds: &[BackendKind] = if backends.is_empty() {
            &[BackendKind::None]
        } else {
            backends
        };
        for kind in kinds {
            let name = kind.executable_name(prefix);
            let path = self.root.join(&name);
            if !path.is_file() {
                return Err(FatalError::MissingExecutable(name));
            }
            if !is_executable(&path) {
                return Err(FatalError::NotExecutable(name));
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn archive_names() {
        for ok in ["partA-1.tgz", "partB-12.tar.gz", "partC-3.tar.bz2", "partA-100.tar.xz"] {
            assert!(check_archive_name(ok).is_ok(), "{ok}");
        }
        for bad in [
            "partD-1.tgz",
            "partA-0.tgz",
            "partA-01.tgz",
            "partA-1.zip",
            "parta-1.tgz",
            "xpartA-1.tgz",
            "partA-1.tar",
        ] {
            assert!(check_archive_name(bad).is_err(), "{bad}");
        }
    }

    fn layout(root: &Path) {
        for d in REQUIRED_DIRS {
            fs::create_dir(root.join(d)).unwrap();
        }
        fs::write(root.join(BUILD_FILE), "all:\n").unwrap();
    }

    #[test]
    fn contents_report_first_missing_item() {
        let dir = tempdir().unwrap();
        let sub = Submission::open(dir.path(), &Toolchain::default(), false).unwrap();
        assert!(matches!(sub.check_contents(), Err(FatalError::MissingDirectory("doc"))));
        layout(dir.path());
        fs::remove_file(dir.path().join(BUILD_FILE)).unwrap();
        assert!(matches!(sub.check_contents(), Err(FatalError::MissingBuildFile)));
        fs::write(dir.path().join(BUILD_FILE), "all:\n").unwrap();
        assert!(sub.check_contents().is_ok());
    }

    #[test]
    fn missing_path_is_fatal() {
        let dir = tempdir().unwrap();
        let err = Submission::open(&dir.path().join("nope"), &Toolchain::default(), false).unwrap_err();
        assert!(matches!(err, FatalError::SubmissionNotFound(_)));
    }

    #[test]
    fn badly_named_archive_is_rejected() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("submission.zip");
        fs::write(&archive, b"").unwrap();
        let err = Submission::open(&archive, &Toolchain::default(), false).unwrap_err();
        assert!(matches!(err, FatalError::BadArchiveName(_)));
    }

    #[cfg(unix)]
    #[test]
    fn well_named_archive_is_unpacked_and_removed() {
        let dir = tempdir().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir(&tree).unwrap();
        layout(&tree);
        let archive = dir.path().join("partA-1.tgz");
        let status = Command::new("tar")
            .arg("-czf")
            .arg(&archive)
            .arg("-C")
            .arg(&tree)
            .arg(".")
            .status()
            .unwrap();
        assert!(status.success());

        let sub = Submission::open(&archive, &Toolchain::default(), false).unwrap();
        let root = sub.root().to_path_buf();
        assert_ne!(root, tree);
        assert!(sub.check_contents().is_ok());
        drop(sub);
        assert!(!root.exists());
    }

    #[cfg(unix)]
    #[test]
    fn corrupt_archive_fails_to_unpack() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("partB-2.tar.gz");
        fs::write(&archive, b"this is not gzip data").unwrap();
        let err = Submission::open(&archive, &Toolchain::default(), false).unwrap_err();
        assert!(matches!(err, FatalError::Unpack(ref stderr) if !stderr.is_empty()));
    }

    #[cfg(unix)]
    #[test]
    fn executables_follow_backend_suffixes() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let sub = Submission::open(dir.path(), &Toolchain::default(), false).unwrap();
        let backends = [BackendKind::Bitcode, BackendKind::X64];

        assert!(matches!(
            sub.check_executables("jlc", &backends),
            Err(FatalError::MissingExecutable(ref n)) if n == "jlc"
        ));
        fs::write(dir.path().join("jlc"), "").unwrap();
        fs::set_permissions(dir.path().join("jlc"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(dir.path().join("jlc_x64"), "").unwrap();
        fs::set_permissions(dir.path().join("jlc_x64"), fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(
            sub.check_executables("jlc", &backends),
            Err(FatalError::NotExecutable(ref n)) if n == "jlc_x64"
        ));
        fs::set_permissions(dir.path().join("jlc_x64"), fs::Permissions::from_mode(0o755)).unwrap();
        assert!(sub.check_executables("jlc", &backends).is_ok());
        assert!(sub.check_executables("jlc", &[]).is_ok());
    }
}
