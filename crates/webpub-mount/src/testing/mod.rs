//! Testing utilities for publish and recovery flows.
//!
//! Nothing here touches the real mount table, ACLs or process table, so
//! every flow can be exercised without root. It includes:
//!
//! - **Doubles**: in-memory implementations of each collaborator trait
//! - **Host**: a temporary docroot/home/state layout wired into a [`PublishContext`]
//! - **Assertions**: checks that a host is back to its pre-publish state
//!
//! # Usage
//!
//! ```ignore
//! use webpub_mount::testing::{TestHost, assert_unpublished};
//! use webpub_mount::PublishSession;
//!
//! #[test]
//! fn test_publish_and_teardown() {
//!     let host = TestHost::new();
//!     let source = host.make_source("site");
//!     let mut session = PublishSession::new(&host.context);
//!     session.establish(&source, None).unwrap();
//!     session.teardown();
//!     assert_unpublished(&host, "site");
//! }
//! ```
//!
//! [`PublishContext`]: crate::PublishContext

pub mod assertions;
pub mod doubles;
pub mod host;

pub use assertions::{assert_published, assert_unpublished};
pub use doubles::{
    CountingReloader, FakeMountBackend, FakeProcessTable, RecordingAclBackend, ScriptedOperator,
};
pub use host::{SERVER_USER, TestHost};
