//! End-to-end publish lifecycle against in-memory collaborators.

use std::fs;

use webpub_mount::testing::{SERVER_USER, TestHost, assert_published, assert_unpublished};
use webpub_mount::{Access, PublishError, PublishSession, SessionState};

#[test]
fn test_publish_without_alias_uses_directory_name() {
    let host = TestHost::new();
    let source = host.make_source("site");
    let mut session = PublishSession::new(&host.context);

    session.establish(&source, None).unwrap();

    assert_eq!(session.destination(), Some(host.docroot().join("site").as_path()));
    assert_eq!(session.url().as_deref(), Some("http://localhost/site"));
    assert_published(&host, "site");

    session.serve(|| {});
    assert_unpublished(&host, "site");
}

#[test]
fn test_publish_grants_read_on_source_and_traverse_up_to_home() {
    let host = TestHost::new();
    let source = host.make_source("projects/site");
    let mut session = PublishSession::new(&host.context);

    session.establish(&source, Some("demo")).unwrap();

    assert_eq!(
        host.acl.access_of(&source, SERVER_USER),
        Some((Access::ReadTraverse, true))
    );
    assert_eq!(
        host.acl.access_of(&host.home().join("projects"), SERVER_USER),
        Some((Access::Traverse, false))
    );
    assert_eq!(
        host.acl.access_of(&host.home(), SERVER_USER),
        Some((Access::Traverse, false))
    );
    // the walk stops at home
    assert_eq!(host.acl.access_of(&host.root().join("home"), SERVER_USER), None);
}

#[test]
fn test_publish_without_home_walks_to_root() {
    let host = TestHost::without_home();
    let source = host.make_source("site");
    let mut session = PublishSession::new(&host.context);

    session.establish(&source, None).unwrap();

    assert!(host.acl.access_of(std::path::Path::new("/"), SERVER_USER).is_some());
    session.teardown();
    assert!(host.acl.is_empty());
}

#[test]
fn test_relative_source_is_resolved() {
    let host = TestHost::new();
    let source = host.make_source("site");
    let dotted = source.join("..").join("site").join(".");
    let mut session = PublishSession::new(&host.context);

    session.establish(&dotted, None).unwrap();

    assert_eq!(session.source(), Some(source.as_path()));
    assert_eq!(session.alias(), Some("site"));
}

#[test]
fn test_concurrent_publish_of_same_name_does_not_collide() {
    let host = TestHost::new();
    let first_source = host.make_source("a/site");
    let second_source = host.make_source("b/site");

    let mut first = PublishSession::new(&host.context);
    first.establish(&first_source, None).unwrap();
    let mut second = PublishSession::new(&host.context);
    second.establish(&second_source, None).unwrap();

    let second_alias = second.alias().unwrap().to_string();
    assert_ne!(second_alias, "site");
    assert!(second_alias.starts_with("site-"));
    assert_published(&host, "site");
    assert_published(&host, &second_alias);

    // ending one publish leaves the other intact
    second.teardown();
    assert!(!host.mounts.is_mounted(&host.docroot().join(&second_alias)));
    assert!(host.mounts.is_mounted(&host.docroot().join("site")));
    assert_eq!(host.context.records.read("site").unwrap(), Some(first_source));
}

#[test]
fn test_ending_one_publish_keeps_sibling_reachable() {
    let host = TestHost::new();
    let first_source = host.make_source("a");
    let second_source = host.make_source("b");

    let mut first = PublishSession::new(&host.context);
    first.establish(&first_source, None).unwrap();
    let mut second = PublishSession::new(&host.context);
    second.establish(&second_source, None).unwrap();

    first.teardown();

    assert_eq!(host.acl.access_of(&first_source, SERVER_USER), None);
    assert!(
        host.acl.access_of(&host.home(), SERVER_USER).is_some(),
        "server lost traverse on the shared home"
    );
    assert_published(&host, "b");

    second.teardown();
    assert_unpublished(&host, "a");
    assert_unpublished(&host, "b");
}

#[test]
fn test_existing_docroot_entry_forces_suffix() {
    let host = TestHost::new();
    let source = host.make_source("site");
    fs::write(host.docroot().join("site"), "not ours").unwrap();
    let mut session = PublishSession::new(&host.context);

    session.establish(&source, None).unwrap();

    assert!(session.alias().unwrap().starts_with("site-"));
    session.teardown();
    assert_eq!(fs::read_to_string(host.docroot().join("site")).unwrap(), "not ours");
}

#[test]
fn test_invalid_alias_is_usage_error_without_side_effects() {
    let host = TestHost::new();
    let source = host.make_source("site");
    let mut session = PublishSession::new(&host.context);

    let err = session.establish(&source, Some("../escape")).unwrap_err();

    assert!(matches!(err, PublishError::InvalidAlias { .. }));
    assert!(err.is_usage());
    assert!(host.acl.is_empty());
    assert_eq!(host.mounts.mount_count(), 0);
}

#[test]
fn test_mount_failure_reverses_grant() {
    let host = TestHost::new();
    let source = host.make_source("site");
    host.mounts.fail_binds(true);
    let mut session = PublishSession::new(&host.context);

    let err = session.establish(&source, None).unwrap_err();

    assert!(matches!(err, PublishError::Resource(_)));
    assert!(!err.is_usage());
    assert_unpublished(&host, "site");
    assert_eq!(host.reloads.count(), 0);
}

#[test]
fn test_failed_unmount_leaves_content_in_place() {
    let host = TestHost::new();
    let source = host.make_source("site");
    let mut session = PublishSession::new(&host.context);
    session.establish(&source, None).unwrap();
    host.mounts.fail_unmounts(true);

    let report = session.teardown();

    assert!(report.left_mounted());
    assert_eq!(session.state(), SessionState::Done);
    // the rest of the teardown still ran
    assert!(host.acl.is_empty());
    assert_eq!(host.context.records.read("site").unwrap(), None);
    assert!(source.join("index.html").exists());
}

#[test]
fn test_teardown_after_external_cleanup_is_quiet() {
    let host = TestHost::new();
    let source = host.make_source("site");
    let mut session = PublishSession::new(&host.context);
    session.establish(&source, None).unwrap();

    // someone ran `clean` from another shell
    host.context.grants.revoke(&source, host.context.home());
    host.context.mounts.unmount(&host.docroot().join("site"));
    host.context.records.delete("site").unwrap();

    let report = session.teardown();
    assert_eq!(report.failures(), 0);
    assert_unpublished(&host, "site");
}
