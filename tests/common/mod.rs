// Shared test helpers for integration tests
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use subtest_runner::config::{DirectoryContext, EnvMap, Settings};
use tempfile::{TempDir, tempdir};

/// Stand-in for the compiler under test: copies the source into a shell
/// script named by `-o`, or prints a diagnostic and fails when the source
/// contains `COMPILE_ERROR`.
const FAKE_COMPILER: &str = r#"#!/bin/sh
out=""
src=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *.chpl) src="$1"; shift ;;
    *) shift ;;
  esac
done
if grep -q COMPILE_ERROR "$src"; then
  echo "$src:1: error: deliberate failure"
  exit 1
fi
[ -n "$out" ] || out=$(basename "$src" .chpl)
{ echo '#!/bin/sh'; cat "$src"; } > "$out"
chmod +x "$out"
"#;

/// Evaluates a predicate file by printing its non-comment lines.
const FAKE_TEST_ENV: &str = "#!/bin/sh\ngrep -v '^#' \"$1\"\n";

const FAKE_TIMEDEXEC: &str = "#!/bin/sh\nshift\nexec sh -c \"$1\"\n";

/// Accepts the log when it contains a `time:` key.
const FAKE_PERF_STATS: &str = "#!/bin/sh\necho \"computing stats for $1\"\ngrep -q 'time:' \"$4\"\n";

/// A throwaway test tree: `<root>/bin/chpl`, `<root>/util/test/*` and the
/// directory under test at `<root>/suite`.
pub struct Suite {
    pub root: TempDir,
    pub dir: PathBuf,
    pub compiler: PathBuf,
    pub util: PathBuf,
}

pub fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).expect("Failed to write script");
    let mut perms = fs::metadata(path).expect("Failed to stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to chmod script");
}

impl Suite {
    pub fn new() -> Self {
        let root = tempdir().expect("Failed to create temporary directory");
        let bin = root.path().join("bin");
        let util = root.path().join("util");
        let dir = root.path().join("suite");
        for d in [&bin, &util.join("test"), &dir] {
            fs::create_dir_all(d).expect("Failed to create fixture directory");
        }
        let compiler = bin.join("chpl");
        write_executable(&compiler, FAKE_COMPILER);
        write_executable(&util.join("test").join("testEnv"), FAKE_TEST_ENV);
        write_executable(&util.join("test").join("timedexec"), FAKE_TIMEDEXEC);
        write_executable(&util.join("test").join("computePerfStats"), FAKE_PERF_STATS);
        Self {
            root,
            dir,
            compiler,
            util,
        }
    }

    /// Writes a file into the directory under test.
    pub fn file(&self, name: &str, content: &str) -> &Self {
        fs::write(self.dir.join(name), content).expect("Failed to write fixture file");
        self
    }

    pub fn script(&self, name: &str, content: &str) -> &Self {
        write_executable(&self.dir.join(name), content);
        self
    }

    pub fn exists(&self, name: &str) -> bool {
        self.dir.join(name).exists()
    }

    /// Environment the harness sees: polling timeouts, fixed machine and
    /// platform names, and the fixture's helper directory.
    pub fn env(&self, extra: &[(&str, &str)]) -> EnvMap {
        let mut env = EnvMap::new();
        env.insert("PATH".into(), std::env::var("PATH").unwrap_or_default());
        env.insert("CHPL_TEST_UTIL_DIR".into(), self.util.display().to_string());
        env.insert("CHPL_TEST_ROOT_DIR".into(), self.root.path().display().to_string());
        env.insert("CHPL_TEST_TIMEOUT_MODE".into(), "poll".into());
        env.insert("CHPL_TEST_MACHINE".into(), "testhost".into());
        env.insert("CHPL_TARGET_PLATFORM".into(), "linux64".into());
        for (k, v) in extra {
            env.insert(k.to_string(), v.to_string());
        }
        env
    }

    /// Builds the directory context after all fixture files are in place.
    pub async fn context(&self, extra: &[(&str, &str)]) -> DirectoryContext {
        let env = self.env(extra);
        let settings = Settings::load(&env).expect("Failed to load settings");
        DirectoryContext::build(&self.compiler, &self.dir, settings, env)
            .await
            .expect("Failed to build directory context")
    }
}
