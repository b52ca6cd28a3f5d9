//! Temporary host layout for end-to-end flows.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::PublishConfig;
use crate::context::PublishContext;
use crate::testing::doubles::{CountingReloader, FakeMountBackend, RecordingAclBackend};

/// Server identity used by [`TestHost`].
pub const SERVER_USER: &str = "www-data";

/// A throwaway root with `home/u`, `var/www/html` and `run/webpub`, plus a
/// [`PublishContext`] wired to in-memory doubles.
///
/// The root is canonicalized so paths compare equal to what the resolver
/// produces (on some systems the temp dir itself is behind a symlink).
pub struct TestHost {
    pub context: PublishContext,
    pub mounts: FakeMountBackend,
    pub acl: RecordingAclBackend,
    pub reloads: CountingReloader,
    root: PathBuf,
    // Dropped last: removes the whole tree
    _temp: TempDir,
}

impl TestHost {
    /// Host whose invoking user has home `home/u`.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Host where the invoking user's home could not be resolved.
    pub fn without_home() -> Self {
        Self::build(false)
    }

    fn build(with_home: bool) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp
            .path()
            .canonicalize()
            .expect("Failed to canonicalize temp dir");

        let home = root.join("home/u");
        let docroot = root.join("var/www/html");
        fs::create_dir_all(&home).expect("Failed to create home");
        fs::create_dir_all(&docroot).expect("Failed to create docroot");

        let config = PublishConfig {
            docroot,
            state_dir: root.join("run/webpub"),
            server_user: SERVER_USER.to_string(),
            kill_grace_secs: 0,
            ..PublishConfig::default()
        };

        let mounts = FakeMountBackend::new();
        let acl = RecordingAclBackend::new();
        let reloads = CountingReloader::new();
        let context = PublishContext::with_backends(
            config,
            with_home.then_some(home),
            Box::new(mounts.clone()),
            Box::new(acl.clone()),
            Box::new(reloads.clone()),
        );

        Self {
            context,
            mounts,
            acl,
            reloads,
            root,
            _temp: temp,
        }
    }

    /// Canonical root of the temporary tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The invoking user's home directory (exists even for [`without_home`](Self::without_home)).
    pub fn home(&self) -> PathBuf {
        self.root.join("home/u")
    }

    pub fn docroot(&self) -> &Path {
        &self.context.config.docroot
    }

    pub fn state_dir(&self) -> &Path {
        &self.context.config.state_dir
    }

    /// Create `home/u/<relative>` with an `index.html` and return its path.
    pub fn make_source(&self, relative: &str) -> PathBuf {
        let source = self.home().join(relative);
        fs::create_dir_all(&source).expect("Failed to create source");
        fs::write(source.join("index.html"), "<h1>hello</h1>").expect("Failed to write index.html");
        source
    }
}

impl Default for TestHost {
    fn default() -> Self {
        Self::new()
    }
}
